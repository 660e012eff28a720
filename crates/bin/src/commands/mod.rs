pub mod hash_message;
pub mod inspect;
pub mod keygen;
pub mod verify;

use vouch::state::{AuthorizationState, DecodeOptions};

use crate::cli::DecodeArgs;

impl From<&DecodeArgs> for DecodeOptions {
    fn from(args: &DecodeArgs) -> Self {
        DecodeOptions {
            schema_version: args.schema_version,
            expected_owner: args.expected_owner,
        }
    }
}

/// Decode base64 state text with the CLI's decode settings.
pub fn decode_state(text: &str, args: &DecodeArgs) -> vouch::Result<AuthorizationState> {
    AuthorizationState::from_base64(text, &DecodeOptions::from(args))
}

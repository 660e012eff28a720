//! Key generation command.

use vouch::auth::PrivateKey;

use crate::cli::KeygenArgs;
use crate::output::{OutputFormat, print_fields};

/// Run the keygen command
pub fn run(args: &KeygenArgs, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    let key = PrivateKey::generate(args.scheme.into());
    let public_key = key.public_key();
    tracing::debug!(signer = %key.signer_id(), scheme = %key.scheme(), "Generated key");

    match format {
        OutputFormat::Human => print_fields(&[
            ("Signer", key.signer_id().to_string()),
            ("Public key", public_key.to_prefixed_string()),
            ("Private key", key.to_prefixed_string().to_string()),
        ]),
        OutputFormat::Json => {
            let value = serde_json::json!({
                "signer": key.signer_id(),
                "public_key": public_key,
                "private_key": key.to_prefixed_string().as_str(),
            });
            println!("{}", serde_json::to_string(&value)?);
        }
    }
    Ok(())
}

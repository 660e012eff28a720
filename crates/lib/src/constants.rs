//! Constants used throughout the Vouch library.
//!
//! Wire-format tags and domain separators. Changing any of these breaks every
//! previously serialized state or issued signature.

/// Magic prefix of a serialized authorization state.
pub const STATE_MAGIC: &[u8; 3] = b"VCH";

/// Current schema version of the authorization state format.
pub const SCHEMA_VERSION: u8 = 1;

/// Magic prefix of a plaintext session key bundle.
pub const BUNDLE_MAGIC: &[u8; 3] = b"VSK";

/// Current version of the session key bundle format.
pub const BUNDLE_VERSION: u8 = 1;

/// Domain separator hashed into every validator identifier.
pub const IDENTIFIER_DOMAIN: &[u8] = b"vouch/validator/v1";

/// Domain separator for the digest an owner signs to enable a session key.
pub const ENABLE_DOMAIN: &[u8] = b"vouch/enable/v1";

/// Prefix used when hashing plain messages (EIP-191 personal messages).
pub const MESSAGE_PREFIX: &str = "\x19Ethereum Signed Message:\n";

//! Signers, keys and signature verification.
//!
//! This module holds everything needed to produce and check a single party's
//! signature over a digest. Combining several parties is the job of
//! [`crate::multisig`].

pub mod crypto;
pub mod errors;
pub mod signer;
pub mod types;

// Re-export main types for easier access
pub use crypto::{PrivateKey, PublicKey, SignatureScheme, recover_signer, verify_digest};
pub use errors::AuthError;
pub use signer::{AddressOnlySigner, LocalSigner, RemoteSigner, Signer, SigningService};
pub use types::{Address, Digest, SignerId, keccak256};

/// EIP-191 digest of a personal message. See [`Digest::of_message`].
pub fn hash_message(message: impl AsRef<[u8]>) -> Digest {
    Digest::of_message(message)
}

//! Signer capability.
//!
//! A [`Signer`] is anything that can produce a signature over a 32-byte digest
//! under a stable identity. Three flavours exist:
//!
//! - [`LocalSigner`] holds the private key in memory.
//! - [`RemoteSigner`] delegates to a [`SigningService`] such as a KMS or HSM and
//!   checks every signature it gets back.
//! - [`AddressOnlySigner`] only knows the address. It can stand in for a party
//!   whose approvals arrive out of band, but never signs.

use std::sync::Arc;

use tracing::debug;

use super::crypto::{PrivateKey, PublicKey, SignatureScheme, verify_digest};
use super::errors::AuthError;
use super::types::{Digest, SignerId};

/// Capability to sign digests under a fixed identity.
///
/// Implementations must be safe to share between threads; a single signer is
/// typically referenced by several validators.
pub trait Signer: Send + Sync + std::fmt::Debug {
    /// Identity signatures from this signer recover to.
    fn signer_id(&self) -> SignerId;

    /// Sign a digest.
    fn sign_digest(&self, digest: &Digest) -> Result<Vec<u8>, AuthError>;

    /// Whether this signer can produce signatures at all.
    fn can_sign(&self) -> bool {
        true
    }
}

/// A signer holding its private key in process memory.
#[derive(Debug)]
pub struct LocalSigner {
    key: PrivateKey,
    id: SignerId,
}

impl LocalSigner {
    /// Wrap an existing private key.
    pub fn new(key: PrivateKey) -> Self {
        let id = key.signer_id();
        Self { key, id }
    }

    /// Generate a fresh key of the given scheme.
    pub fn generate(scheme: SignatureScheme) -> Self {
        Self::new(PrivateKey::generate(scheme))
    }

    /// Public half of the held key.
    pub fn public_key(&self) -> PublicKey {
        self.key.public_key()
    }

    /// Borrow the held key.
    pub fn private_key(&self) -> &PrivateKey {
        &self.key
    }
}

impl Signer for LocalSigner {
    fn signer_id(&self) -> SignerId {
        self.id
    }

    fn sign_digest(&self, digest: &Digest) -> Result<Vec<u8>, AuthError> {
        debug!(signer = %self.id, digest = %digest, "Signing digest locally");
        self.key.sign_digest(digest)
    }
}

/// External service able to sign on behalf of a signer, such as a KMS.
pub trait SigningService: Send + Sync + std::fmt::Debug {
    /// Produce a signature over `digest` for the key identified by `signer`.
    fn sign(
        &self,
        signer: &SignerId,
        digest: &Digest,
    ) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>>;
}

/// A signer whose key lives behind a [`SigningService`].
///
/// Signatures returned by the service are verified before being handed out, so
/// a misbehaving service surfaces as an error rather than an unusable signature.
#[derive(Debug, Clone)]
pub struct RemoteSigner {
    id: SignerId,
    service: Arc<dyn SigningService>,
}

impl RemoteSigner {
    pub fn new(id: SignerId, service: Arc<dyn SigningService>) -> Self {
        Self { id, service }
    }
}

impl Signer for RemoteSigner {
    fn signer_id(&self) -> SignerId {
        self.id
    }

    fn sign_digest(&self, digest: &Digest) -> Result<Vec<u8>, AuthError> {
        debug!(signer = %self.id, digest = %digest, "Requesting remote signature");
        let signature =
            self.service
                .sign(&self.id, digest)
                .map_err(|e| AuthError::SigningFailed {
                    signer: self.id,
                    reason: e.to_string(),
                })?;
        verify_digest(&self.id, digest, &signature)?;
        Ok(signature)
    }
}

/// Identity-only signer. Useful for declaring multisig members whose
/// signatures are collected elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressOnlySigner {
    id: SignerId,
}

impl AddressOnlySigner {
    pub fn new(id: SignerId) -> Self {
        Self { id }
    }
}

impl Signer for AddressOnlySigner {
    fn signer_id(&self) -> SignerId {
        self.id
    }

    fn sign_digest(&self, _digest: &Digest) -> Result<Vec<u8>, AuthError> {
        Err(AuthError::SigningUnavailable { signer: self.id })
    }

    fn can_sign(&self) -> bool {
        false
    }
}

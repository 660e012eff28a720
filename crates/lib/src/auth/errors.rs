//! Authentication error types for the Vouch library.
//!
//! Covers signing, signature verification, multi-party approval and validator
//! lifecycle failures. Every variant that concerns a particular party carries
//! that party's identity so callers can report it.

use thiserror::Error as ThisError;

use super::types::SignerId;
use crate::Error;
use crate::validator::{Lifecycle, OnChainId, ValidatorKind};

/// Errors that can occur during signing and approval operations.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Existing variants will not be removed in minor versions
/// - Field additions/changes require a major version bump
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum AuthError {
    /// Not enough approval weight has been collected for the requested digest.
    #[error("Insufficient approvals: weight {approved_weight} of threshold {threshold}")]
    InsufficientApprovals {
        /// Weight collected so far for the requested digest
        approved_weight: u64,
        /// Weight required
        threshold: u32,
    },

    /// An approval targeted a digest other than the one under approval.
    #[error("Digest mismatch: approval for {found}, pending round is {}", display_digest(.expected))]
    DigestMismatch {
        /// Digest of the open round, if any
        expected: Option<super::types::Digest>,
        /// Digest the approval was made for
        found: super::types::Digest,
    },

    /// No approval round is open.
    #[error("No approval round is open")]
    NoOpenRound,

    /// The signer is not part of the multisig configuration.
    #[error("Unknown signer: {signer}")]
    UnknownSigner {
        /// Identity of the unrecognised signer
        signer: SignerId,
    },

    /// A signature does not verify for the claimed signer.
    #[error("Invalid signature from {signer}")]
    InvalidSignature {
        /// Identity the signature claimed to come from
        signer: SignerId,
    },

    /// A signature or signature bundle is structurally malformed.
    #[error("Malformed signature: {reason}")]
    MalformedSignature {
        /// Description of the structural problem
        reason: String,
    },

    /// Encoding was requested before the threshold was met.
    #[error("Approvals unsatisfied: weight {approved_weight} of threshold {threshold}")]
    Unsatisfied {
        /// Weight collected so far
        approved_weight: u64,
        /// Weight required
        threshold: u32,
    },

    /// The validator has been uninstalled on-chain. Terminal.
    #[error("Validator {validator} has been revoked")]
    Revoked {
        /// Identifier of the revoked validator
        validator: OnChainId,
    },

    /// The validator exists but has not completed its enable approval.
    #[error("Validator {validator} is not active ({state})")]
    NotActive {
        /// Identifier of the validator
        validator: OnChainId,
        /// Lifecycle state it is currently in
        state: Lifecycle,
    },

    /// An enable signature did not verify against the owner validator.
    #[error("Enable signature rejected by owner {owner}")]
    InvalidEnableSignature {
        /// Identifier of the owner validator
        owner: OnChainId,
    },

    /// A lifecycle operation was attempted from the wrong state.
    #[error("Cannot {operation} validator {validator} while {state}")]
    InvalidTransition {
        /// Identifier of the validator
        validator: OnChainId,
        /// The attempted operation
        operation: &'static str,
        /// State the validator is in
        state: Lifecycle,
    },

    /// The signer only knows its address and cannot produce signatures.
    #[error("Signing unavailable for {signer}")]
    SigningUnavailable {
        /// Identity of the signer
        signer: SignerId,
    },

    /// The signer failed to produce a signature.
    #[error("Signing failed for {signer}: {reason}")]
    SigningFailed {
        /// Identity of the signer
        signer: SignerId,
        /// Description of the failure
        reason: String,
    },

    /// Invalid key format or parsing error.
    #[error("Invalid key format: {reason}")]
    InvalidKeyFormat {
        /// Description of why the key format is invalid
        reason: String,
    },

    /// Key parsing failed due to cryptographic library error.
    #[error("Key parsing failed: {reason}")]
    KeyParsingFailed {
        /// Description of the parsing failure
        reason: String,
    },

    /// A fixed-width value (address, digest, selector...) could not be decoded.
    #[error("Invalid {what}: {reason}")]
    InvalidEncoding {
        /// Which kind of value was being decoded
        what: &'static str,
        /// Description of the problem
        reason: String,
    },

    /// A weighted multisig configuration violates its invariants.
    #[error("Invalid multisig configuration: {reason}")]
    InvalidMultisigConfig {
        /// Description of the violated invariant
        reason: String,
    },

    /// Only validators with unrestricted authority may own a session key.
    #[error("A {kind} validator cannot approve session keys")]
    OwnerNotSudo {
        /// Kind of the rejected owner
        kind: ValidatorKind,
    },

    /// A session key does not match the identity recorded in its state.
    #[error("Session key mismatch: state expects {expected}, key is {found}")]
    SessionKeyMismatch {
        /// Session signer recorded in the state
        expected: SignerId,
        /// Identity of the supplied key
        found: SignerId,
    },
}

fn display_digest(digest: &Option<super::types::Digest>) -> String {
    match digest {
        Some(digest) => digest.to_string(),
        None => "none".to_string(),
    }
}

impl AuthError {
    /// Check if this error indicates invalid signature.
    pub fn is_invalid_signature(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidSignature { .. }
                | AuthError::MalformedSignature { .. }
                | AuthError::InvalidEnableSignature { .. }
        )
    }

    /// Check if this error indicates the approval threshold was not reached.
    pub fn is_insufficient_approvals(&self) -> bool {
        matches!(
            self,
            AuthError::InsufficientApprovals { .. } | AuthError::Unsatisfied { .. }
        )
    }

    /// Check if this error indicates an approval for the wrong digest.
    pub fn is_digest_mismatch(&self) -> bool {
        matches!(self, AuthError::DigestMismatch { .. })
    }

    /// Check if this error is terminal (validator revoked).
    pub fn is_revoked(&self) -> bool {
        matches!(self, AuthError::Revoked { .. })
    }

    /// Check if this error indicates the validator is not yet usable.
    pub fn is_not_active(&self) -> bool {
        matches!(self, AuthError::NotActive { .. })
    }

    /// Check if this error came from a signer being unable to sign.
    pub fn is_signing_error(&self) -> bool {
        matches!(
            self,
            AuthError::SigningUnavailable { .. } | AuthError::SigningFailed { .. }
        )
    }

    /// Check if this error indicates a configuration problem.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidKeyFormat { .. }
                | AuthError::KeyParsingFailed { .. }
                | AuthError::InvalidEncoding { .. }
                | AuthError::InvalidMultisigConfig { .. }
                | AuthError::OwnerNotSudo { .. }
                | AuthError::SessionKeyMismatch { .. }
        )
    }

    /// Get the signer identity this error is about, if any.
    pub fn signer(&self) -> Option<&SignerId> {
        match self {
            AuthError::UnknownSigner { signer }
            | AuthError::InvalidSignature { signer }
            | AuthError::SigningUnavailable { signer }
            | AuthError::SigningFailed { signer, .. } => Some(signer),
            _ => None,
        }
    }
}

impl From<AuthError> for Error {
    fn from(err: AuthError) -> Self {
        Error::Auth(err)
    }
}

//! Errors raised while encoding, decoding or sealing persisted state.

use thiserror::Error as ThisError;

use crate::Error;
use crate::validator::OnChainId;

/// Errors that can occur while handling serialized authorization state.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum StateError {
    /// Bytes are not a well-formed state, or the state breaks an invariant.
    #[error("Malformed state: {reason}")]
    MalformedState {
        /// Description of the problem
        reason: String,
    },

    /// The state names a validator kind this build does not know.
    #[error("Unknown validator kind: {kind}")]
    UnknownValidatorKind {
        /// The unrecognised tag
        kind: String,
    },

    /// The state names a policy kind this build does not know.
    #[error("Unknown policy kind at #{index}: {kind}")]
    UnknownPolicyKind {
        /// Position of the policy in its set
        index: usize,
        /// The unrecognised tag
        kind: String,
    },

    /// The state was written with a different schema version.
    #[error("Schema version mismatch: expected {expected}, found {found}")]
    SchemaVersionMismatch {
        /// Version the decoder accepts
        expected: u8,
        /// Version found in the bytes
        found: u8,
    },

    /// The state's owner is not the one the caller expected.
    #[error("Owner mismatch: expected {expected}, found {}", display_owner(.found))]
    OwnerMismatch {
        /// Owner identifier the caller required
        expected: OnChainId,
        /// Owner identifier recorded in the state
        found: Option<OnChainId>,
    },

    /// Sealing a session key bundle failed.
    #[error("Failed to seal bundle: {reason}")]
    SealFailed {
        /// Description of the failure
        reason: String,
    },

    /// Unsealing failed: wrong passphrase or corrupted ciphertext.
    #[error("Failed to unseal bundle: wrong passphrase or corrupted data")]
    UnsealFailed,
}

fn display_owner(owner: &Option<OnChainId>) -> String {
    match owner {
        Some(owner) => owner.to_string(),
        None => "no owner".to_string(),
    }
}

impl StateError {
    pub(crate) fn malformed(reason: impl std::fmt::Display) -> Self {
        StateError::MalformedState {
            reason: reason.to_string(),
        }
    }

    /// Check if the bytes could not be understood at all.
    pub fn is_malformed(&self) -> bool {
        matches!(self, StateError::MalformedState { .. })
    }

    /// Check if decoding failed because of a kind or version this build does
    /// not support.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            StateError::UnknownValidatorKind { .. }
                | StateError::UnknownPolicyKind { .. }
                | StateError::SchemaVersionMismatch { .. }
        )
    }

    /// Check if this error came from sealing or unsealing.
    pub fn is_seal_error(&self) -> bool {
        matches!(
            self,
            StateError::SealFailed { .. } | StateError::UnsealFailed
        )
    }
}

impl From<StateError> for Error {
    fn from(err: StateError) -> Self {
        Error::State(err)
    }
}

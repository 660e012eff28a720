//! Policy error types.

use thiserror::Error as ThisError;

use super::{Allowance, DenyReason, PolicyKind};
use crate::Error;

/// Errors raised while validating or enforcing policies.
///
/// Denials always name the index and kind of the policy that failed, so a
/// caller can tell which of several restrictions blocked an action.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum PolicyError {
    /// A policy denied the intent.
    #[error("Policy #{index} ({kind}) denied: {reason}")]
    PolicyViolation {
        /// Kind of the denying policy
        kind: PolicyKind,
        /// Position of the denying policy in its set
        index: usize,
        /// What the policy objected to
        reason: DenyReason,
    },

    /// A gas or value allowance would be exceeded.
    #[error(
        "Policy #{index} (gas_limit) denied: {resource} {spent} spent + {requested} requested exceeds allowance {allowance}"
    )]
    AllowanceExceeded {
        /// Position of the gas policy in its set
        index: usize,
        /// Which allowance ran out
        resource: Allowance,
        /// Amount already consumed
        spent: u128,
        /// Amount requested by the intent or batch
        requested: u128,
        /// Total allowance
        allowance: u128,
    },

    /// A rate limit is exhausted for the current window.
    #[error(
        "Policy #{index} (rate_limit) denied: {count} uses per {interval}s exhausted, retry in {retry_after}s"
    )]
    RateLimited {
        /// Position of the rate policy in its set
        index: usize,
        /// Uses allowed per window
        count: u32,
        /// Window length in seconds
        interval: u64,
        /// Seconds until another use is allowed
        retry_after: u64,
    },

    /// Policies need an intent to evaluate, and none was given.
    #[error("Permission-scoped authorization requires an intent")]
    MissingIntent,

    /// Unrestricted authority cannot be handed to a session key.
    #[error("Policy #{index} (sudo) cannot be delegated to a session key")]
    SudoNotDelegable {
        /// Position of the sudo policy in its set
        index: usize,
    },

    /// A session key must carry at least one restriction.
    #[error("Session keys require at least one policy")]
    EmptyPolicySet,

    /// A policy's parameters are inconsistent.
    #[error("Policy #{index} ({kind}) is invalid: {reason}")]
    InvalidPolicy {
        /// Kind of the invalid policy
        kind: PolicyKind,
        /// Position of the invalid policy in its set
        index: usize,
        /// Description of the problem
        reason: String,
    },
}

impl PolicyError {
    /// Build the error for a denial by the policy at `index`.
    pub fn denied(kind: PolicyKind, index: usize, reason: DenyReason) -> Self {
        match reason {
            DenyReason::AllowanceExceeded {
                resource,
                spent,
                requested,
                allowance,
            } => PolicyError::AllowanceExceeded {
                index,
                resource,
                spent,
                requested,
                allowance,
            },
            DenyReason::RateLimited {
                count,
                interval,
                retry_after,
            } => PolicyError::RateLimited {
                index,
                count,
                interval,
                retry_after,
            },
            reason => PolicyError::PolicyViolation {
                kind,
                index,
                reason,
            },
        }
    }

    /// Check if this error is a denial of an intent.
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            PolicyError::PolicyViolation { .. }
                | PolicyError::AllowanceExceeded { .. }
                | PolicyError::RateLimited { .. }
                | PolicyError::MissingIntent
        )
    }

    /// Check if this error is a rate-limit denial.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, PolicyError::RateLimited { .. })
    }

    /// Check if this error is a gas allowance denial.
    pub fn is_allowance_exceeded(&self) -> bool {
        matches!(self, PolicyError::AllowanceExceeded { .. })
    }

    /// Check if this error rejects a policy set for delegation.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            PolicyError::SudoNotDelegable { .. }
                | PolicyError::EmptyPolicySet
                | PolicyError::InvalidPolicy { .. }
        )
    }

    /// Index of the policy this error is about.
    pub fn index(&self) -> Option<usize> {
        match self {
            PolicyError::PolicyViolation { index, .. }
            | PolicyError::AllowanceExceeded { index, .. }
            | PolicyError::RateLimited { index, .. }
            | PolicyError::SudoNotDelegable { index }
            | PolicyError::InvalidPolicy { index, .. } => Some(*index),
            PolicyError::MissingIntent | PolicyError::EmptyPolicySet => None,
        }
    }

    /// Kind of the policy this error is about.
    pub fn kind(&self) -> Option<PolicyKind> {
        match self {
            PolicyError::PolicyViolation { kind, .. } | PolicyError::InvalidPolicy { kind, .. } => {
                Some(*kind)
            }
            PolicyError::AllowanceExceeded { .. } => Some(PolicyKind::GasLimit),
            PolicyError::RateLimited { .. } => Some(PolicyKind::RateLimit),
            PolicyError::SudoNotDelegable { .. } => Some(PolicyKind::Sudo),
            PolicyError::MissingIntent | PolicyError::EmptyPolicySet => None,
        }
    }
}

impl From<PolicyError> for Error {
    fn from(err: PolicyError) -> Self {
        Error::Policy(err)
    }
}

//!
//! Vouch: pluggable authorization and multi-party approval for smart-contract accounts.
//!
//! This library decides *whether* an operation on an account may be signed, and
//! produces the signature when it may. Building operations, talking to relays and
//! registering validators on-chain are left to the caller.
//!
//! ## Core Concepts
//!
//! * **Signers (`auth::Signer`)**: Independent identities that sign 32-byte digests. Keys
//!   may be held locally, behind a remote service, or only known by address.
//! * **Validators (`validator::Validator`)**: A closed set of signing schemes addressed by an
//!   on-chain identifier:
//!     * **SingleSigner**: one key, signs directly.
//!     * **WeightedMultisig**: independent parties approve a digest until the weight
//!       threshold is reached (`multisig::ApprovalAggregator`).
//!     * **PermissionScoped**: a delegated session key whose every use is checked against a
//!       `policy::PolicySet` and which only becomes usable once the owner approves it.
//! * **Policies (`policy::Policy`)**: Declarative predicates (call, gas, rate, time and
//!   caller restrictions) combined with strict AND semantics.
//! * **Authorization state (`state::AuthorizationState`)**: The versioned, serializable
//!   recipe for reconstructing a configured validator.
//! * **Session keys (`session::SessionKeyManager`)**: Creates, approves, seals and hands off
//!   permission-scoped session keys.

pub mod auth;
pub mod clock;
pub mod constants;
pub(crate) mod encoding;
pub mod multisig;
pub mod policy;
pub mod session;
pub mod state;
pub mod validator;

pub use clock::{Clock, SystemClock};
#[cfg(any(test, feature = "testing"))]
pub use clock::FixedClock;

/// Result type used throughout the Vouch library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the Vouch library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured signing and approval errors from the auth and multisig modules
    #[error(transparent)]
    Auth(auth::AuthError),

    /// Structured policy errors from the policy module
    #[error(transparent)]
    Policy(policy::PolicyError),

    /// Structured serialization-state errors from the state and session modules
    #[error(transparent)]
    State(state::StateError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Auth(_) => "auth",
            Error::Policy(_) => "policy",
            Error::State(_) => "state",
            Error::Serialize(_) => "serialize",
        }
    }

    /// Check if this error is terminal and must never be retried.
    pub fn is_terminal(&self) -> bool {
        match self {
            Error::Auth(auth_err) => auth_err.is_revoked(),
            _ => false,
        }
    }

    /// Check if this error is a policy denial of a delegated action.
    pub fn is_policy_denial(&self) -> bool {
        match self {
            Error::Policy(policy_err) => policy_err.is_denial(),
            _ => false,
        }
    }

    /// Check if this error is signature- or approval-related.
    pub fn is_authentication_error(&self) -> bool {
        matches!(self, Error::Auth(_))
    }

    /// Check if this error was raised while decoding or encoding persisted state.
    pub fn is_state_error(&self) -> bool {
        matches!(self, Error::State(_) | Error::Serialize(_))
    }
}

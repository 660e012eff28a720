//! Validators: the signing schemes an account accepts.
//!
//! The set of schemes is closed. Each [`Validator`] has a pure-data
//! [`ValidatorConfig`] from which its [`OnChainId`] is derived, so the same
//! configuration always maps to the same on-chain identifier.
//!
//! ```text
//! OnChainId = kind (1 byte) ‖ sha256("vouch/validator/v1" ‖ canonical JSON of config)[12..32]
//! ```

mod permission;
mod single;
mod weighted;

pub use permission::{InMemoryRegistry, Lifecycle, PermissionScopedValidator, ValidatorRegistry};
pub use single::SingleSignerValidator;
pub use weighted::WeightedMultisigValidator;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::Result;
use crate::auth::{AuthError, Digest, SignerId, verify_digest};
use crate::constants::{ENABLE_DOMAIN, IDENTIFIER_DOMAIN};
use crate::encoding::fixed_bytes;
use crate::multisig::WeightedMultisigConfig;
use crate::policy::{Intent, PolicySet};

fixed_bytes!(
    /// Identifier under which a validator is installed on-chain.
    OnChainId,
    21,
    "validator identifier"
);

/// Closed set of validator kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorKind {
    SingleSigner,
    WeightedMultisig,
    PermissionScoped,
}

impl ValidatorKind {
    /// Every kind, in declaration order.
    pub const ALL: [ValidatorKind; 3] = [
        ValidatorKind::SingleSigner,
        ValidatorKind::WeightedMultisig,
        ValidatorKind::PermissionScoped,
    ];

    /// Serialized tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidatorKind::SingleSigner => "single_signer",
            ValidatorKind::WeightedMultisig => "weighted_multisig",
            ValidatorKind::PermissionScoped => "permission_scoped",
        }
    }

    /// Look up a kind by its serialized tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }

    /// Leading byte of identifiers of this kind.
    pub fn code(&self) -> u8 {
        match self {
            ValidatorKind::SingleSigner => 0x01,
            ValidatorKind::WeightedMultisig => 0x02,
            ValidatorKind::PermissionScoped => 0x03,
        }
    }

    /// Whether validators of this kind hold unrestricted authority and may
    /// therefore approve session keys.
    pub fn is_sudo(&self) -> bool {
        !matches!(self, ValidatorKind::PermissionScoped)
    }
}

impl std::fmt::Display for ValidatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl OnChainId {
    /// Kind encoded in the identifier's leading byte.
    pub fn kind(&self) -> Option<ValidatorKind> {
        ValidatorKind::ALL
            .into_iter()
            .find(|kind| kind.code() == self.0[0])
    }
}

/// Pure-data description of a validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidatorConfig {
    SingleSigner {
        signer: SignerId,
    },
    WeightedMultisig(WeightedMultisigConfig),
    PermissionScoped {
        /// The session key's identity
        signer: SignerId,
        policies: PolicySet,
    },
}

impl ValidatorConfig {
    pub fn kind(&self) -> ValidatorKind {
        match self {
            ValidatorConfig::SingleSigner { .. } => ValidatorKind::SingleSigner,
            ValidatorConfig::WeightedMultisig(_) => ValidatorKind::WeightedMultisig,
            ValidatorConfig::PermissionScoped { .. } => ValidatorKind::PermissionScoped,
        }
    }

    /// Deterministic on-chain identifier of this configuration.
    pub fn identifier(&self) -> OnChainId {
        let canonical =
            serde_json::to_vec(self).expect("validator configurations are always serializable");
        let mut hasher = Sha256::new();
        hasher.update(IDENTIFIER_DOMAIN);
        hasher.update(&canonical);
        let hash = hasher.finalize();

        let mut id = [0u8; 21];
        id[0] = self.kind().code();
        id[1..].copy_from_slice(&hash[12..]);
        OnChainId(id)
    }

    /// Policies of a permission-scoped validator.
    pub fn policies(&self) -> Option<&PolicySet> {
        match self {
            ValidatorConfig::PermissionScoped { policies, .. } => Some(policies),
            _ => None,
        }
    }

    /// Check a signature produced by a validator with this configuration.
    ///
    /// Pure signature check: it says nothing about lifecycle state or policy.
    pub fn verify(&self, digest: &Digest, signature: &[u8]) -> std::result::Result<(), AuthError> {
        match self {
            ValidatorConfig::SingleSigner { signer }
            | ValidatorConfig::PermissionScoped { signer, .. } => {
                verify_digest(signer, digest, signature)
            }
            ValidatorConfig::WeightedMultisig(config) => {
                config.verify(digest, signature).map(|_| ())
            }
        }
    }
}

/// Digest an owner signs to enable the validator with identifier `validator`.
pub fn enable_digest(validator: &OnChainId) -> Digest {
    let mut hasher = Sha256::new();
    hasher.update(ENABLE_DOMAIN);
    hasher.update(validator.as_bytes());
    Digest::new(hasher.finalize().into())
}

/// A configured validator able to authorize digests.
#[derive(Debug)]
pub enum Validator {
    SingleSigner(SingleSignerValidator),
    WeightedMultisig(WeightedMultisigValidator),
    PermissionScoped(PermissionScopedValidator),
}

impl Validator {
    pub fn kind(&self) -> ValidatorKind {
        match self {
            Validator::SingleSigner(_) => ValidatorKind::SingleSigner,
            Validator::WeightedMultisig(_) => ValidatorKind::WeightedMultisig,
            Validator::PermissionScoped(_) => ValidatorKind::PermissionScoped,
        }
    }

    /// Configuration this validator was built from.
    pub fn config(&self) -> ValidatorConfig {
        match self {
            Validator::SingleSigner(v) => v.config(),
            Validator::WeightedMultisig(v) => v.config(),
            Validator::PermissionScoped(v) => v.config(),
        }
    }

    pub fn identifier(&self) -> OnChainId {
        match self {
            Validator::PermissionScoped(v) => v.identifier(),
            _ => self.config().identifier(),
        }
    }

    /// Produce a signature for `digest`, or explain why not.
    ///
    /// `intent` is required by permission-scoped validators and ignored by the
    /// others.
    pub fn authorize(&self, digest: &Digest, intent: Option<&Intent>) -> Result<Vec<u8>> {
        match self {
            Validator::SingleSigner(v) => v.authorize(digest),
            Validator::WeightedMultisig(v) => v.authorize(digest),
            Validator::PermissionScoped(v) => v.authorize(digest, intent),
        }
    }

    /// Authorize an operation made of several calls. Only permission-scoped
    /// validators look at the calls.
    pub fn authorize_batch(&self, digest: &Digest, calls: &[Intent]) -> Result<Vec<u8>> {
        match self {
            Validator::SingleSigner(v) => v.authorize(digest),
            Validator::WeightedMultisig(v) => v.authorize(digest),
            Validator::PermissionScoped(v) => v.authorize_batch(digest, calls),
        }
    }

    /// Whether `signature` is valid for `digest` under this validator.
    pub fn verify(&self, digest: &Digest, signature: &[u8]) -> bool {
        self.config().verify(digest, signature).is_ok()
    }
}

impl From<SingleSignerValidator> for Validator {
    fn from(v: SingleSignerValidator) -> Self {
        Validator::SingleSigner(v)
    }
}

impl From<WeightedMultisigValidator> for Validator {
    fn from(v: WeightedMultisigValidator) -> Self {
        Validator::WeightedMultisig(v)
    }
}

impl From<PermissionScopedValidator> for Validator {
    fn from(v: PermissionScopedValidator) -> Self {
        Validator::PermissionScoped(v)
    }
}

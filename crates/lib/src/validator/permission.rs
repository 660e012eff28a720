//! Permission-scoped validators: session keys bound by policy.
//!
//! Lifecycle:
//!
//! ```text
//! Unbound ──bind_owner──▶ AwaitingEnableApproval ──attach_enable_signature──▶ Active
//!    │                            │                                             │
//!    └────────────────────────────┴──────────── revocation ─────────────────────┴──▶ Revoked
//! ```
//!
//! Only `Active` validators authorize. `Revoked` is terminal.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tracing::{debug, info, warn};

use super::{OnChainId, ValidatorConfig, enable_digest};
use crate::Result;
use crate::auth::{AuthError, Digest, Signer, SignerId};
use crate::clock::Clock;
use crate::policy::{Intent, PolicySet, PolicyUsage, UsageLedger};

/// Lifecycle state of a permission-scoped validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    /// Created, no owner yet
    Unbound,
    /// Owner bound, waiting for the owner's enable signature
    AwaitingEnableApproval,
    /// Enabled by the owner, may authorize
    Active,
    /// Uninstalled. Terminal
    Revoked,
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Lifecycle::Unbound => "unbound",
            Lifecycle::AwaitingEnableApproval => "awaiting enable approval",
            Lifecycle::Active => "active",
            Lifecycle::Revoked => "revoked",
        })
    }
}

/// On-chain view of which validators are installed.
pub trait ValidatorRegistry: Send + Sync + std::fmt::Debug {
    fn is_registered(&self, validator: &OnChainId) -> bool;
}

/// Registry kept in memory, for tests and for callers that mirror chain
/// events themselves.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    registered: RwLock<HashSet<OnChainId>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, validator: OnChainId) {
        self.registered
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(validator);
    }

    pub fn unregister(&self, validator: &OnChainId) {
        self.registered
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(validator);
    }
}

impl ValidatorRegistry for InMemoryRegistry {
    fn is_registered(&self, validator: &OnChainId) -> bool {
        self.registered
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(validator)
    }
}

#[derive(Debug)]
struct Status {
    lifecycle: Lifecycle,
    owner: Option<ValidatorConfig>,
    enable_signature: Option<Vec<u8>>,
}

/// A session key whose every use is checked against a [`PolicySet`].
///
/// The policy set may not contain `Sudo` and may not be empty.
#[derive(Debug)]
pub struct PermissionScopedValidator {
    signer: Arc<dyn Signer>,
    policies: PolicySet,
    identifier: OnChainId,
    ledger: UsageLedger,
    clock: Arc<dyn Clock>,
    registry: Option<Arc<dyn ValidatorRegistry>>,
    status: Mutex<Status>,
}

impl PermissionScopedValidator {
    /// Create an unbound validator for `signer` restricted by `policies`.
    pub fn new(
        signer: Arc<dyn Signer>,
        policies: PolicySet,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        policies.ensure_delegable()?;
        let identifier = ValidatorConfig::PermissionScoped {
            signer: signer.signer_id(),
            policies: policies.clone(),
        }
        .identifier();
        debug!(validator = %identifier, signer = %signer.signer_id(), "Created permission-scoped validator");
        Ok(Self {
            signer,
            policies,
            identifier,
            ledger: UsageLedger::new(),
            clock,
            registry: None,
            status: Mutex::new(Status {
                lifecycle: Lifecycle::Unbound,
                owner: None,
                enable_signature: None,
            }),
        })
    }

    /// Consult `registry` before every authorization; an unregistered
    /// identifier revokes the validator.
    pub fn with_registry(mut self, registry: Arc<dyn ValidatorRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Resume policy usage counters from a snapshot.
    pub fn with_usage(mut self, usage: Vec<PolicyUsage>) -> Self {
        self.ledger = UsageLedger::restore(usage);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn identifier(&self) -> OnChainId {
        self.identifier
    }

    pub fn signer_id(&self) -> SignerId {
        self.signer.signer_id()
    }

    pub fn policies(&self) -> &PolicySet {
        &self.policies
    }

    pub fn config(&self) -> ValidatorConfig {
        ValidatorConfig::PermissionScoped {
            signer: self.signer.signer_id(),
            policies: self.policies.clone(),
        }
    }

    /// Digest the owner must sign to enable this validator.
    pub fn enable_digest(&self) -> Digest {
        enable_digest(&self.identifier)
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lock().lifecycle
    }

    pub fn owner(&self) -> Option<ValidatorConfig> {
        self.lock().owner.clone()
    }

    pub fn enable_signature(&self) -> Option<Vec<u8>> {
        self.lock().enable_signature.clone()
    }

    /// Policy usage counters, for persistence.
    pub fn usage_snapshot(&self) -> Vec<PolicyUsage> {
        self.ledger.snapshot()
    }

    /// Record the owner that will enable this validator.
    ///
    /// The owner must have unrestricted authority, so another permission-scoped
    /// validator is rejected.
    pub fn bind_owner(&self, owner: ValidatorConfig) -> Result<()> {
        if !owner.kind().is_sudo() {
            return Err(AuthError::OwnerNotSudo { kind: owner.kind() }.into());
        }
        let mut status = self.lock();
        if status.lifecycle != Lifecycle::Unbound {
            return Err(self.invalid_transition("bind owner of", status.lifecycle));
        }
        info!(validator = %self.identifier, owner = %owner.identifier(), "Owner bound");
        status.owner = Some(owner);
        status.lifecycle = Lifecycle::AwaitingEnableApproval;
        Ok(())
    }

    /// Attach the owner's signature over [`enable_digest`](Self::enable_digest)
    /// and activate.
    pub fn attach_enable_signature(&self, signature: Vec<u8>) -> Result<()> {
        let mut status = self.lock();
        if status.lifecycle != Lifecycle::AwaitingEnableApproval {
            return Err(self.invalid_transition("enable", status.lifecycle));
        }
        let Some(owner) = status.owner.as_ref() else {
            return Err(self.invalid_transition("enable", status.lifecycle));
        };
        if owner.verify(&self.enable_digest(), &signature).is_err() {
            warn!(validator = %self.identifier, owner = %owner.identifier(), "Enable signature rejected");
            return Err(AuthError::InvalidEnableSignature {
                owner: owner.identifier(),
            }
            .into());
        }
        status.enable_signature = Some(signature);
        status.lifecycle = Lifecycle::Active;
        info!(validator = %self.identifier, "Permission-scoped validator active");
        Ok(())
    }

    /// Mark the validator as uninstalled. Idempotent and irreversible.
    pub fn observe_revocation(&self) {
        self.revoke(&mut self.lock());
    }

    fn revoke(&self, status: &mut Status) {
        if status.lifecycle != Lifecycle::Revoked {
            info!(validator = %self.identifier, previous = %status.lifecycle, "Validator revoked");
            status.lifecycle = Lifecycle::Revoked;
        }
    }

    fn invalid_transition(&self, operation: &'static str, state: Lifecycle) -> crate::Error {
        AuthError::InvalidTransition {
            validator: self.identifier,
            operation,
            state,
        }
        .into()
    }

    /// Check the intent against every policy and, if all allow, sign `digest`.
    ///
    /// Usage counters move before signing, so a signer failure still consumes
    /// the intent's share of any gas or rate limit. The lifecycle lock is held
    /// until the signature exists, so a revocation observed concurrently either
    /// precedes the check or follows the signature.
    pub fn authorize(&self, digest: &Digest, intent: Option<&Intent>) -> Result<Vec<u8>> {
        let calls = intent.map(std::slice::from_ref).unwrap_or_default();
        self.authorize_batch(digest, calls)
    }

    /// Like [`authorize`](Self::authorize) for an operation that makes several
    /// calls. Every call must be allowed; usage is committed once for the batch.
    pub fn authorize_batch(&self, digest: &Digest, calls: &[Intent]) -> Result<Vec<u8>> {
        let mut status = self.lock();
        if let Some(registry) = &self.registry {
            if !registry.is_registered(&self.identifier) {
                self.revoke(&mut status);
            }
        }

        match status.lifecycle {
            Lifecycle::Active => {}
            Lifecycle::Revoked => {
                return Err(AuthError::Revoked {
                    validator: self.identifier,
                }
                .into());
            }
            state => {
                return Err(AuthError::NotActive {
                    validator: self.identifier,
                    state,
                }
                .into());
            }
        }

        self.policies
            .enforce_batch(calls, self.clock.now_secs(), &self.ledger)?;

        debug!(
            validator = %self.identifier,
            digest = %digest,
            calls = calls.len(),
            "Intent permitted, signing"
        );
        Ok(self.signer.sign_digest(digest)?)
    }
}

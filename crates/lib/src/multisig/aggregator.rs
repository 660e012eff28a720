//! Collection of approvals for one digest at a time.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{Approval, WeightedMultisigConfig, encode_signatures};
use crate::auth::{AuthError, Digest, Signer, SignerId};

/// Approvals collected so far for the open round.
///
/// Holds at most one approval per signer, all for the same digest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPending", into = "RawPending")]
pub struct PendingApprovals {
    digest: Option<Digest>,
    approvals: BTreeMap<SignerId, Approval>,
}

#[derive(Serialize, Deserialize)]
struct RawPending {
    #[serde(default)]
    digest: Option<Digest>,
    #[serde(default)]
    approvals: Vec<Approval>,
}

impl From<PendingApprovals> for RawPending {
    fn from(pending: PendingApprovals) -> Self {
        Self {
            digest: pending.digest,
            approvals: pending.approvals.into_values().collect(),
        }
    }
}

impl TryFrom<RawPending> for PendingApprovals {
    type Error = AuthError;

    fn try_from(raw: RawPending) -> Result<Self, Self::Error> {
        let mut approvals = BTreeMap::new();
        for approval in raw.approvals {
            if raw.digest != Some(approval.digest) {
                return Err(AuthError::DigestMismatch {
                    expected: raw.digest,
                    found: approval.digest,
                });
            }
            let signer = approval.signer;
            if approvals.insert(signer, approval).is_some() {
                return Err(AuthError::MalformedSignature {
                    reason: format!("duplicate approval from {signer}"),
                });
            }
        }
        Ok(Self {
            digest: raw.digest,
            approvals,
        })
    }
}

impl PendingApprovals {
    /// Digest of the open round.
    pub fn digest(&self) -> Option<Digest> {
        self.digest
    }

    /// Collected approvals, ordered by signer.
    pub fn approvals(&self) -> impl Iterator<Item = &Approval> {
        self.approvals.values()
    }

    /// Number of collected approvals.
    pub fn len(&self) -> usize {
        self.approvals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.approvals.is_empty()
    }

    fn weight(&self, config: &WeightedMultisigConfig) -> u64 {
        self.approvals
            .keys()
            .filter_map(|signer| config.weight_of(signer))
            .map(u64::from)
            .sum()
    }
}

fn check_digest(expected: Option<Digest>, approval: &Approval) -> Result<(), AuthError> {
    if expected != Some(approval.digest) {
        debug!(
            signer = %approval.signer,
            expected = ?expected,
            found = %approval.digest,
            "Rejected approval for another digest"
        );
        return Err(AuthError::DigestMismatch {
            expected,
            found: approval.digest,
        });
    }
    Ok(())
}

/// Gathers approvals from independent signers until the weight threshold of a
/// [`WeightedMultisigConfig`] is reached.
///
/// One round is open at a time. [`begin_approval`](Self::begin_approval) opens a
/// round for a digest and discards anything collected for a previous one.
/// [`submit`](Self::submit) may be called concurrently from many threads; the
/// pending set is guarded by a mutex and every approval is verified before it is
/// stored.
///
/// # Example
///
/// ```
/// use vouch::auth::{Digest, LocalSigner, SignatureScheme, Signer};
/// use vouch::multisig::{Approval, ApprovalAggregator, WeightedMultisigConfig, WeightedSignerEntry};
///
/// let alice = LocalSigner::generate(SignatureScheme::Secp256k1);
/// let bob = LocalSigner::generate(SignatureScheme::Secp256k1);
/// let config = WeightedMultisigConfig::new(
///     100,
///     [
///         WeightedSignerEntry::new(alice.signer_id(), 50),
///         WeightedSignerEntry::new(bob.signer_id(), 50),
///     ],
/// )
/// .unwrap();
///
/// let aggregator = ApprovalAggregator::new(config);
/// let digest = Digest::keccak256(b"transfer");
/// aggregator.begin_approval(digest);
///
/// aggregator.submit(Approval::sign(&alice, digest).unwrap()).unwrap();
/// assert!(!aggregator.is_satisfied());
/// aggregator.submit(Approval::sign(&bob, digest).unwrap()).unwrap();
/// assert!(aggregator.is_satisfied());
///
/// let signature = aggregator.encode().unwrap();
/// assert!(aggregator.config().verify(&digest, &signature).is_ok());
/// ```
#[derive(Debug)]
pub struct ApprovalAggregator {
    config: WeightedMultisigConfig,
    pending: Mutex<PendingApprovals>,
}

impl ApprovalAggregator {
    /// Create an aggregator with no open round.
    pub fn new(config: WeightedMultisigConfig) -> Self {
        Self {
            config,
            pending: Mutex::new(PendingApprovals::default()),
        }
    }

    /// Rebuild an aggregator from a snapshot, re-verifying every approval.
    pub fn restore(
        config: WeightedMultisigConfig,
        pending: PendingApprovals,
    ) -> Result<Self, AuthError> {
        for approval in pending.approvals() {
            if pending.digest != Some(approval.digest) {
                return Err(AuthError::DigestMismatch {
                    expected: pending.digest,
                    found: approval.digest,
                });
            }
            if !config.contains(&approval.signer) {
                return Err(AuthError::UnknownSigner {
                    signer: approval.signer,
                });
            }
            approval.verify()?;
        }
        debug!(
            digest = ?pending.digest,
            approvals = pending.len(),
            "Restored approval aggregator"
        );
        Ok(Self {
            config,
            pending: Mutex::new(pending),
        })
    }

    /// The configuration approvals are checked against.
    pub fn config(&self) -> &WeightedMultisigConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, PendingApprovals> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a round for `digest`, discarding any approvals collected so far.
    pub fn begin_approval(&self, digest: Digest) {
        let mut pending = self.lock();
        if pending.digest.is_some_and(|d| d != digest) && !pending.is_empty() {
            debug!(
                previous = ?pending.digest,
                discarded = pending.len(),
                "Discarding approvals for superseded digest"
            );
        }
        pending.digest = Some(digest);
        pending.approvals.clear();
        debug!(digest = %digest, threshold = self.config.threshold(), "Approval round opened");
    }

    /// Add an approval to the open round.
    ///
    /// Resubmitting for the same signer replaces the earlier approval. Fails with
    /// [`AuthError::DigestMismatch`] when the approval is for another digest or no
    /// round is open, [`AuthError::UnknownSigner`] for non-members and
    /// [`AuthError::InvalidSignature`] when the signature does not verify.
    pub fn submit(&self, approval: Approval) -> Result<(), AuthError> {
        check_digest(self.pending_digest(), &approval)?;
        if !self.config.contains(&approval.signer) {
            warn!(signer = %approval.signer, "Rejected approval from unknown signer");
            return Err(AuthError::UnknownSigner {
                signer: approval.signer,
            });
        }
        // Verification runs outside the lock, so the digest is checked again on insert.
        if let Err(err) = approval.verify() {
            warn!(signer = %approval.signer, error = %err, "Rejected approval with bad signature");
            return Err(err);
        }

        let mut pending = self.lock();
        check_digest(pending.digest, &approval)?;
        let signer = approval.signer;
        let replaced = pending.approvals.insert(signer, approval).is_some();
        debug!(
            signer = %signer,
            replaced,
            weight = pending.weight(&self.config),
            threshold = self.config.threshold(),
            "Approval accepted"
        );
        Ok(())
    }

    /// Sign the open round's digest with `signer` and submit the result.
    ///
    /// Fails with [`AuthError::NoOpenRound`] before [`begin_approval`](Self::begin_approval).
    pub fn approve_with(&self, signer: &dyn Signer) -> Result<(), AuthError> {
        let digest = self.lock().digest.ok_or(AuthError::NoOpenRound)?;
        self.submit(Approval::sign(signer, digest)?)
    }

    /// Digest of the open round, if any.
    pub fn pending_digest(&self) -> Option<Digest> {
        self.lock().digest
    }

    /// Weight of the approvals collected so far.
    pub fn approved_weight(&self) -> u64 {
        self.lock().weight(&self.config)
    }

    /// Signers that have approved the open round, ascending.
    pub fn approvers(&self) -> Vec<SignerId> {
        self.lock().approvals.keys().copied().collect()
    }

    /// Whether the collected weight meets the threshold.
    pub fn is_satisfied(&self) -> bool {
        self.approved_weight() >= u64::from(self.config.threshold())
    }

    /// Encode the collected approvals. Fails with [`AuthError::Unsatisfied`]
    /// below threshold.
    ///
    /// Does not close the round, so repeated calls return identical bytes.
    pub fn encode(&self) -> Result<Vec<u8>, AuthError> {
        let pending = self.lock();
        self.encode_locked(&pending)
    }

    fn encode_locked(&self, pending: &PendingApprovals) -> Result<Vec<u8>, AuthError> {
        let approved_weight = pending.weight(&self.config);
        if approved_weight < u64::from(self.config.threshold()) {
            return Err(AuthError::Unsatisfied {
                approved_weight,
                threshold: self.config.threshold(),
            });
        }
        encode_signatures(pending.approvals())
    }

    /// Encode the approvals only if the open round is for `digest`.
    pub fn encode_for(&self, digest: &Digest) -> Result<Vec<u8>, AuthError> {
        let pending = self.lock();
        if pending.digest != Some(*digest) {
            return Err(AuthError::InsufficientApprovals {
                approved_weight: 0,
                threshold: self.config.threshold(),
            });
        }
        self.encode_locked(&pending).map_err(|err| match err {
            AuthError::Unsatisfied {
                approved_weight,
                threshold,
            } => AuthError::InsufficientApprovals {
                approved_weight,
                threshold,
            },
            other => other,
        })
    }

    /// Encode the approvals and close the round.
    pub fn finalize(&self) -> Result<Vec<u8>, AuthError> {
        let mut pending = self.lock();
        let encoded = self.encode_locked(&pending)?;
        info!(
            digest = ?pending.digest,
            approvers = pending.len(),
            "Approval round finalized"
        );
        *pending = PendingApprovals::default();
        Ok(encoded)
    }

    /// Copy of the open round, for persistence.
    pub fn snapshot(&self) -> PendingApprovals {
        self.lock().clone()
    }
}

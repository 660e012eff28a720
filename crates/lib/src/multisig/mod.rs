//! Weighted multi-party approval.
//!
//! A [`WeightedMultisigConfig`] names a set of signers, each with a positive
//! weight, and a threshold. A digest is approved once the signers that signed it
//! carry at least `threshold` weight between them.
//!
//! Approvals are combined into a single byte string the verifying contract
//! understands:
//!
//! ```text
//! entry   := signer (20 bytes) ‖ len (u16, big-endian) ‖ signature (len bytes)
//! encoded := entry*   ordered by signer, strictly ascending
//! ```
//!
//! Ordering by signer makes the encoding independent of arrival order and lets
//! the verifier reject duplicates with a single comparison per entry.

mod aggregator;

pub use aggregator::{ApprovalAggregator, PendingApprovals};

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::auth::{AuthError, Digest, Signer, SignerId, verify_digest};

/// Size of the per-entry header in an encoded signature bundle.
const ENTRY_HEADER_SIZE: usize = 20 + 2;

/// A multisig member and its voting weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WeightedSignerEntry {
    /// Identity of the member
    pub signer: SignerId,
    /// Voting weight, always greater than zero
    pub weight: u32,
}

impl WeightedSignerEntry {
    pub fn new(signer: SignerId, weight: u32) -> Self {
        Self { signer, weight }
    }
}

/// Validated weighted multisig configuration.
///
/// Invariants, enforced on construction and on deserialization:
/// - `threshold > 0`
/// - every weight `> 0`
/// - no signer appears twice
/// - `threshold <= sum(weights)`
///
/// Weights are summed as `u64`, so no combination of `u32` weights can overflow.
/// Members are kept sorted by signer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawMultisigConfig")]
pub struct WeightedMultisigConfig {
    threshold: u32,
    signers: Vec<WeightedSignerEntry>,
}

#[derive(Deserialize)]
struct RawMultisigConfig {
    threshold: u32,
    signers: Vec<WeightedSignerEntry>,
}

impl TryFrom<RawMultisigConfig> for WeightedMultisigConfig {
    type Error = AuthError;

    fn try_from(raw: RawMultisigConfig) -> Result<Self, Self::Error> {
        Self::new(raw.threshold, raw.signers)
    }
}

impl WeightedMultisigConfig {
    /// Build and validate a configuration.
    ///
    /// ```
    /// use vouch::auth::SignerId;
    /// use vouch::multisig::{WeightedMultisigConfig, WeightedSignerEntry};
    ///
    /// let a = SignerId::new([1; 20]);
    /// let b = SignerId::new([2; 20]);
    /// let config = WeightedMultisigConfig::new(
    ///     100,
    ///     [WeightedSignerEntry::new(a, 50), WeightedSignerEntry::new(b, 50)],
    /// )
    /// .unwrap();
    /// assert_eq!(config.total_weight(), 100);
    ///
    /// assert!(WeightedMultisigConfig::new(101, config.signers().to_vec()).is_err());
    /// ```
    pub fn new(
        threshold: u32,
        signers: impl IntoIterator<Item = WeightedSignerEntry>,
    ) -> Result<Self, AuthError> {
        let invalid = |reason: String| AuthError::InvalidMultisigConfig { reason };

        let mut signers: Vec<_> = signers.into_iter().collect();
        if threshold == 0 {
            return Err(invalid("threshold must be greater than zero".to_string()));
        }
        if signers.is_empty() {
            return Err(invalid("at least one signer is required".to_string()));
        }

        let mut seen = HashSet::with_capacity(signers.len());
        for entry in &signers {
            if entry.weight == 0 {
                return Err(invalid(format!("signer {} has zero weight", entry.signer)));
            }
            if !seen.insert(entry.signer) {
                return Err(invalid(format!("signer {} listed twice", entry.signer)));
            }
        }

        let total: u64 = signers.iter().map(|e| u64::from(e.weight)).sum();
        if u64::from(threshold) > total {
            return Err(invalid(format!(
                "threshold {threshold} exceeds total weight {total}"
            )));
        }

        signers.sort_by_key(|e| e.signer);
        Ok(Self { threshold, signers })
    }

    /// Weight required for approval.
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Members, sorted by signer.
    pub fn signers(&self) -> &[WeightedSignerEntry] {
        &self.signers
    }

    /// Weight of a member, or `None` if it is not a member.
    pub fn weight_of(&self, signer: &SignerId) -> Option<u32> {
        self.signers
            .binary_search_by_key(signer, |e| e.signer)
            .ok()
            .map(|i| self.signers[i].weight)
    }

    /// Whether `signer` is a member.
    pub fn contains(&self, signer: &SignerId) -> bool {
        self.weight_of(signer).is_some()
    }

    /// Sum of all member weights.
    pub fn total_weight(&self) -> u64 {
        self.signers.iter().map(|e| u64::from(e.weight)).sum()
    }

    /// Verify an encoded signature bundle over `digest`.
    ///
    /// Every entry must come from a member, verify for that member, and appear in
    /// strictly ascending signer order. Returns the approved weight.
    pub fn verify(&self, digest: &Digest, encoded: &[u8]) -> Result<u64, AuthError> {
        let entries = decode_signatures(encoded)?;
        let mut previous: Option<SignerId> = None;
        let mut weight = 0u64;

        for (signer, signature) in entries {
            if previous.is_some_and(|p| p >= signer) {
                return Err(AuthError::MalformedSignature {
                    reason: format!("signer {signer} is duplicated or out of order"),
                });
            }
            previous = Some(signer);

            let signer_weight = self
                .weight_of(&signer)
                .ok_or(AuthError::UnknownSigner { signer })?;
            verify_digest(&signer, digest, signature)?;
            weight += u64::from(signer_weight);
        }

        if weight < u64::from(self.threshold) {
            return Err(AuthError::InsufficientApprovals {
                approved_weight: weight,
                threshold: self.threshold,
            });
        }
        Ok(weight)
    }
}

/// A signer's signature over a specific digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    /// Who signed
    pub signer: SignerId,
    /// What was signed
    pub digest: Digest,
    /// The signature, in the signer scheme's encoding
    #[serde(with = "crate::encoding::hex_bytes")]
    pub signature: Vec<u8>,
}

impl Approval {
    pub fn new(signer: SignerId, digest: Digest, signature: Vec<u8>) -> Self {
        Self {
            signer,
            digest,
            signature,
        }
    }

    /// Ask `signer` to approve `digest`.
    pub fn sign(signer: &dyn Signer, digest: Digest) -> Result<Self, AuthError> {
        let signature = signer.sign_digest(&digest)?;
        Ok(Self::new(signer.signer_id(), digest, signature))
    }

    /// Check the signature against the claimed signer and digest.
    pub fn verify(&self) -> Result<(), AuthError> {
        verify_digest(&self.signer, &self.digest, &self.signature)
    }
}

/// Encode approvals into a signature bundle.
///
/// Approvals are sorted by signer; the caller is responsible for deduplication.
/// Fails with [`AuthError::MalformedSignature`] if a signature does not fit the
/// u16 length prefix.
pub fn encode_signatures<'a>(
    approvals: impl IntoIterator<Item = &'a Approval>,
) -> Result<Vec<u8>, AuthError> {
    let mut approvals: Vec<&Approval> = approvals.into_iter().collect();
    approvals.sort_by_key(|a| a.signer);

    let size = approvals
        .iter()
        .map(|a| ENTRY_HEADER_SIZE + a.signature.len())
        .sum();
    let mut out = Vec::with_capacity(size);
    for approval in approvals {
        let len = u16::try_from(approval.signature.len()).map_err(|_| {
            AuthError::MalformedSignature {
                reason: format!(
                    "signature from {} is {} bytes, longer than the {} byte entry limit",
                    approval.signer,
                    approval.signature.len(),
                    u16::MAX
                ),
            }
        })?;
        out.extend_from_slice(approval.signer.as_bytes());
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&approval.signature);
    }
    Ok(out)
}

/// Split a signature bundle into `(signer, signature)` entries without verifying them.
pub fn decode_signatures(mut encoded: &[u8]) -> Result<Vec<(SignerId, &[u8])>, AuthError> {
    let truncated = || AuthError::MalformedSignature {
        reason: "truncated signature bundle".to_string(),
    };

    let mut entries = Vec::new();
    while !encoded.is_empty() {
        if encoded.len() < ENTRY_HEADER_SIZE {
            return Err(truncated());
        }
        let (header, rest) = encoded.split_at(ENTRY_HEADER_SIZE);
        let signer = SignerId::from_slice(&header[..20])?;
        let len = u16::from_be_bytes([header[20], header[21]]) as usize;
        if rest.len() < len {
            return Err(truncated());
        }
        let (signature, rest) = rest.split_at(len);
        entries.push((signer, signature));
        encoded = rest;
    }
    Ok(entries)
}

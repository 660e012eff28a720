use std::sync::Arc;

use super::ValidatorConfig;
use crate::Result;
use crate::auth::Digest;
use crate::multisig::{ApprovalAggregator, WeightedMultisigConfig};

/// Threshold of weighted approvals from independent signers.
///
/// Authorization never contacts signers itself. Approvals are gathered through
/// the shared [`ApprovalAggregator`], and `authorize` only succeeds once they
/// meet the threshold for exactly the requested digest.
#[derive(Debug, Clone)]
pub struct WeightedMultisigValidator {
    aggregator: Arc<ApprovalAggregator>,
}

impl WeightedMultisigValidator {
    pub fn new(config: WeightedMultisigConfig) -> Self {
        Self::with_aggregator(Arc::new(ApprovalAggregator::new(config)))
    }

    /// Share an existing aggregator, e.g. one restored from persisted state.
    pub fn with_aggregator(aggregator: Arc<ApprovalAggregator>) -> Self {
        Self { aggregator }
    }

    pub fn aggregator(&self) -> &Arc<ApprovalAggregator> {
        &self.aggregator
    }

    pub fn config(&self) -> ValidatorConfig {
        ValidatorConfig::WeightedMultisig(self.aggregator.config().clone())
    }

    /// Encoded approvals for `digest`.
    ///
    /// Fails with `InsufficientApprovals` when the open round is for another
    /// digest or below threshold.
    pub fn authorize(&self, digest: &Digest) -> Result<Vec<u8>> {
        Ok(self.aggregator.encode_for(digest)?)
    }
}

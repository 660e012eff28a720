//! Per-key usage counters for stateful policies.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

/// Consumption recorded against one policy of a set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyUsage {
    /// Gas consumed by committed intents
    #[serde(default, with = "crate::encoding::dec_u128")]
    pub gas_spent: u128,
    /// Native value transferred by committed intents
    #[serde(
        default,
        with = "crate::encoding::dec_u128",
        skip_serializing_if = "is_zero"
    )]
    pub value_spent: u128,
    /// Start of the current fixed rate window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_start: Option<u64>,
    /// Timestamps of uses that may still count against a rate limit
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub uses: Vec<u64>,
}

fn is_zero(value: &u128) -> bool {
    *value == 0
}

/// Usage of every policy in a set, indexed like the set.
///
/// Evaluation and commitment happen under a single lock so concurrent
/// authorizations against the same key cannot both pass a limit that only has
/// room for one.
#[derive(Debug, Default)]
pub struct UsageLedger {
    usage: Mutex<Vec<PolicyUsage>>,
}

impl UsageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume from a snapshot taken with [`snapshot`](Self::snapshot).
    pub fn restore(snapshot: Vec<PolicyUsage>) -> Self {
        Self {
            usage: Mutex::new(snapshot),
        }
    }

    /// Copy of the current counters.
    pub fn snapshot(&self) -> Vec<PolicyUsage> {
        self.lock().clone()
    }

    /// Usage recorded for the policy at `index`.
    pub fn usage(&self, index: usize) -> PolicyUsage {
        self.lock().get(index).cloned().unwrap_or_default()
    }

    /// Lock the counters, sized for at least `len` policies.
    pub(super) fn lock_for(&self, len: usize) -> MutexGuard<'_, Vec<PolicyUsage>> {
        let mut usage = self.lock();
        if usage.len() < len {
            usage.resize(len, PolicyUsage::default());
        }
        usage
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PolicyUsage>> {
        self.usage.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

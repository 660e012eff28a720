//! Declarative restrictions on delegated keys.
//!
//! A [`PolicySet`] is an ordered list of [`Policy`] values combined with AND:
//! an [`Intent`] is authorized only if every policy allows it. The first denial,
//! in set order, is reported together with the index and kind of the policy that
//! produced it.
//!
//! Stateful policies (gas allowances, rate limits) keep their counters in a
//! [`UsageLedger`]. Counters only move when the whole set allows an intent.
//!
//! The set of policy kinds is closed. Serialized sets name each policy with a
//! `type` tag and decoding fails on tags it does not know.

mod call;
mod errors;
mod intent;
mod ledger;
mod limits;

pub use call::{ArgCondition, CallPermission, CallRestriction, Condition};
pub use errors::PolicyError;
pub use intent::{Intent, Selector, Word};
pub use ledger::{PolicyUsage, UsageLedger};
pub use limits::{
    Allowance, CallerRestriction, GasLimit, PaymasterRule, RateLimit, RateWindow, TimeWindow,
};

use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;
use tracing::{debug, warn};

use crate::auth::Address;
use crate::clock::format_timestamp;

/// Closed set of policy kinds, with their serialized tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Sudo,
    CallRestriction,
    GasLimit,
    RateLimit,
    TimeWindow,
    CallerRestriction,
}

impl PolicyKind {
    /// Every kind, in declaration order.
    pub const ALL: [PolicyKind; 6] = [
        PolicyKind::Sudo,
        PolicyKind::CallRestriction,
        PolicyKind::GasLimit,
        PolicyKind::RateLimit,
        PolicyKind::TimeWindow,
        PolicyKind::CallerRestriction,
    ];

    /// Serialized tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyKind::Sudo => "sudo",
            PolicyKind::CallRestriction => "call_restriction",
            PolicyKind::GasLimit => "gas_limit",
            PolicyKind::RateLimit => "rate_limit",
            PolicyKind::TimeWindow => "time_window",
            PolicyKind::CallerRestriction => "caller_restriction",
        }
    }

    /// Look up a kind by its serialized tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }
}

impl std::fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a policy refused an intent.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum DenyReason {
    #[error("call to {target} with selector {selector} is not permitted")]
    CallNotPermitted { target: Address, selector: Selector },

    #[error("value {value} exceeds limit {limit}")]
    ValueLimitExceeded { value: u128, limit: u128 },

    #[error("argument {index} is missing")]
    MissingArgument { index: u16 },

    #[error("argument {index} = {value} does not satisfy {condition}")]
    ArgumentRejected {
        index: u16,
        value: Word,
        condition: String,
    },

    #[error("{resource} {requested} on top of {spent} spent exceeds allowance {allowance}")]
    AllowanceExceeded {
        resource: Allowance,
        spent: u128,
        requested: u128,
        allowance: u128,
    },

    #[error("a paymaster is required")]
    PaymasterRequired,

    #[error("paymaster {} is not {allowed}", display_address(.paymaster))]
    PaymasterNotAllowed {
        paymaster: Option<Address>,
        allowed: Address,
    },

    #[error("paymaster {paymaster} given but sponsorship is forbidden")]
    PaymasterForbidden { paymaster: Address },

    #[error("{count} uses per {interval}s exhausted, retry in {retry_after}s")]
    RateLimited {
        count: u32,
        interval: u64,
        retry_after: u64,
    },

    #[error(
        "{} is outside [{}, {}]",
        display_time(.now),
        display_time(.valid_after),
        display_time(.valid_until)
    )]
    OutsideTimeWindow {
        now: u64,
        valid_after: u64,
        valid_until: u64,
    },

    #[error("caller {} is not allowed", display_address(.caller))]
    CallerNotAllowed { caller: Option<Address> },
}

fn display_time(secs: &u64) -> String {
    format_timestamp(*secs)
}

fn display_address(address: &Option<Address>) -> String {
    match address {
        Some(address) => address.to_string(),
        None => "(none)".to_string(),
    }
}

/// Outcome of evaluating one policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// A single restriction on a delegated key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Policy {
    /// Unrestricted authority. Never delegable to a session key.
    Sudo,
    CallRestriction(CallRestriction),
    GasLimit(GasLimit),
    RateLimit(RateLimit),
    TimeWindow(TimeWindow),
    CallerRestriction(CallerRestriction),
}

impl Policy {
    pub fn kind(&self) -> PolicyKind {
        match self {
            Policy::Sudo => PolicyKind::Sudo,
            Policy::CallRestriction(_) => PolicyKind::CallRestriction,
            Policy::GasLimit(_) => PolicyKind::GasLimit,
            Policy::RateLimit(_) => PolicyKind::RateLimit,
            Policy::TimeWindow(_) => PolicyKind::TimeWindow,
            Policy::CallerRestriction(_) => PolicyKind::CallerRestriction,
        }
    }

    /// Check the policy's own parameters.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Policy::Sudo | Policy::GasLimit(_) => Ok(()),
            Policy::CallRestriction(p) => p.validate(),
            Policy::RateLimit(p) => p.validate(),
            Policy::TimeWindow(p) => p.validate(),
            Policy::CallerRestriction(p) => p.validate(),
        }
    }

    /// Evaluate the policy at time `now` (Unix seconds) against its usage so far.
    ///
    /// Pure: usage is only updated by [`PolicySet::enforce`].
    pub fn evaluate(&self, intent: &Intent, now: u64, usage: &PolicyUsage) -> Decision {
        self.evaluate_batch(std::slice::from_ref(intent), now, usage)
    }

    /// Evaluate the calls of one operation together.
    ///
    /// Call and caller restrictions and the paymaster rule must allow every
    /// call. Allowances meter the batch total, a rate limit counts the batch as
    /// a single use.
    pub fn evaluate_batch(&self, calls: &[Intent], now: u64, usage: &PolicyUsage) -> Decision {
        match self {
            Policy::Sudo => Decision::Allow,
            Policy::CallRestriction(p) => each_call(calls, |call| p.evaluate(call)),
            Policy::GasLimit(p) => p.evaluate_calls(calls, usage),
            Policy::RateLimit(p) => p.evaluate(now, usage),
            Policy::TimeWindow(p) => p.evaluate(now),
            Policy::CallerRestriction(p) => each_call(calls, |call| p.evaluate(call)),
        }
    }

    fn record(&self, calls: &[Intent], now: u64, usage: &mut PolicyUsage) {
        match self {
            Policy::GasLimit(p) => p.record_calls(calls, usage),
            Policy::RateLimit(p) => p.record(now, usage),
            _ => {}
        }
    }
}

/// First denial among `calls`, in call order.
fn each_call(calls: &[Intent], evaluate: impl Fn(&Intent) -> Decision) -> Decision {
    calls
        .iter()
        .map(evaluate)
        .find(|decision| !decision.is_allow())
        .unwrap_or(Decision::Allow)
}

impl From<CallRestriction> for Policy {
    fn from(p: CallRestriction) -> Self {
        Policy::CallRestriction(p)
    }
}

impl From<GasLimit> for Policy {
    fn from(p: GasLimit) -> Self {
        Policy::GasLimit(p)
    }
}

impl From<RateLimit> for Policy {
    fn from(p: RateLimit) -> Self {
        Policy::RateLimit(p)
    }
}

impl From<TimeWindow> for Policy {
    fn from(p: TimeWindow) -> Self {
        Policy::TimeWindow(p)
    }
}

impl From<CallerRestriction> for Policy {
    fn from(p: CallerRestriction) -> Self {
        Policy::CallerRestriction(p)
    }
}

/// Ordered policies combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Policy>", into = "Vec<Policy>")]
pub struct PolicySet {
    policies: Vec<Policy>,
}

impl TryFrom<Vec<Policy>> for PolicySet {
    type Error = PolicyError;

    fn try_from(policies: Vec<Policy>) -> Result<Self, Self::Error> {
        Self::new(policies)
    }
}

impl From<PolicySet> for Vec<Policy> {
    fn from(set: PolicySet) -> Self {
        set.policies
    }
}

impl PolicySet {
    /// Validate and collect policies.
    ///
    /// An empty set is valid here; [`ensure_delegable`](Self::ensure_delegable)
    /// rejects it for session keys.
    pub fn new(policies: impl IntoIterator<Item = Policy>) -> Result<Self, PolicyError> {
        let policies: Vec<Policy> = policies.into_iter().collect();
        for (index, policy) in policies.iter().enumerate() {
            policy
                .validate()
                .map_err(|reason| PolicyError::InvalidPolicy {
                    kind: policy.kind(),
                    index,
                    reason,
                })?;
        }
        Ok(Self { policies })
    }

    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Whether the set grants unrestricted authority.
    pub fn is_sudo(&self) -> bool {
        self.policies.iter().any(|p| matches!(p, Policy::Sudo))
    }

    /// Check the set may be attached to a session key: non-empty and without sudo.
    pub fn ensure_delegable(&self) -> Result<(), PolicyError> {
        if self.policies.is_empty() {
            return Err(PolicyError::EmptyPolicySet);
        }
        if let Some(index) = self.policies.iter().position(|p| matches!(p, Policy::Sudo)) {
            return Err(PolicyError::SudoNotDelegable { index });
        }
        Ok(())
    }

    fn first_denial(
        &self,
        calls: &[Intent],
        now: u64,
        usage: &[PolicyUsage],
    ) -> Result<(), PolicyError> {
        let Some(first) = calls.first() else {
            return Err(PolicyError::MissingIntent);
        };
        for (index, policy) in self.policies.iter().enumerate() {
            if let Decision::Deny(reason) = policy.evaluate_batch(calls, now, &usage[index]) {
                warn!(
                    index,
                    kind = %policy.kind(),
                    target = %first.target,
                    selector = %first.selector,
                    calls = calls.len(),
                    reason = %reason,
                    "Policy denied intent"
                );
                return Err(PolicyError::denied(policy.kind(), index, reason));
            }
        }
        Ok(())
    }

    /// Evaluate every policy without recording usage.
    pub fn evaluate(
        &self,
        intent: &Intent,
        now: u64,
        ledger: &UsageLedger,
    ) -> Result<(), PolicyError> {
        self.evaluate_batch(std::slice::from_ref(intent), now, ledger)
    }

    /// Evaluate every policy against a batch of calls without recording usage.
    ///
    /// An empty batch is [`PolicyError::MissingIntent`].
    pub fn evaluate_batch(
        &self,
        calls: &[Intent],
        now: u64,
        ledger: &UsageLedger,
    ) -> Result<(), PolicyError> {
        let usage = ledger.lock_for(self.policies.len());
        self.first_denial(calls, now, &usage)
    }

    /// Evaluate every policy and, if all allow, record the intent's usage.
    ///
    /// Check and commit happen under one lock of the ledger.
    pub fn enforce(
        &self,
        intent: &Intent,
        now: u64,
        ledger: &UsageLedger,
    ) -> Result<(), PolicyError> {
        self.enforce_batch(std::slice::from_ref(intent), now, ledger)
    }

    /// Enforce the set on the calls of one operation.
    ///
    /// Either every call is allowed and usage is committed once for the whole
    /// batch, or nothing is recorded.
    pub fn enforce_batch(
        &self,
        calls: &[Intent],
        now: u64,
        ledger: &UsageLedger,
    ) -> Result<(), PolicyError> {
        let mut usage = ledger.lock_for(self.policies.len());
        self.first_denial(calls, now, &usage)?;
        for (index, policy) in self.policies.iter().enumerate() {
            policy.record(calls, now, &mut usage[index]);
        }
        debug!(
            policies = self.policies.len(),
            calls = calls.len(),
            "Intent allowed by policy set"
        );
        Ok(())
    }
}

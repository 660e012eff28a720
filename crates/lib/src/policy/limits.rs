//! Gas, rate, time and caller restrictions.
//!
//! Gas and rate limits are stateful: they read the key's [`PolicyUsage`] when
//! evaluating and update it when the intent is committed.

use serde::{Deserialize, Serialize};

use super::{Decision, DenyReason, Intent, PolicyUsage};
use crate::auth::Address;

/// How a gas policy treats paymasters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymasterRule {
    /// Sponsored or not, any paymaster
    #[default]
    Any,
    /// The operation must be sponsored by some paymaster
    Required,
    /// The operation must be sponsored by this paymaster
    Exactly(Address),
    /// The operation must not be sponsored
    Forbidden,
}

/// Resource metered by a [`GasLimit`] allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Allowance {
    Gas,
    /// Native value transferred
    Value,
}

impl std::fmt::Display for Allowance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Allowance::Gas => f.write_str("gas"),
            Allowance::Value => f.write_str("value"),
        }
    }
}

/// Cumulative gas and value allowances plus paymaster requirements.
///
/// Allowances meter the sum over every call of a batch; the paymaster rule
/// applies to each call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasLimit {
    /// Total gas all authorized intents may consume; unlimited when absent
    #[serde(
        default,
        with = "crate::encoding::opt_dec_u128",
        skip_serializing_if = "Option::is_none"
    )]
    pub allowance: Option<u128>,
    /// Total native value all authorized intents may transfer; unlimited when absent
    #[serde(
        default,
        with = "crate::encoding::opt_dec_u128",
        skip_serializing_if = "Option::is_none"
    )]
    pub value_allowance: Option<u128>,
    #[serde(default)]
    pub paymaster: PaymasterRule,
}

/// Sum of `amount` over `calls`, `None` on overflow.
fn total(calls: &[Intent], amount: impl Fn(&Intent) -> u128) -> Option<u128> {
    calls
        .iter()
        .try_fold(0u128, |sum, call| sum.checked_add(amount(call)))
}

fn check_allowance(
    resource: Allowance,
    spent: u128,
    requested: Option<u128>,
    allowance: u128,
) -> Decision {
    let within = requested
        .and_then(|requested| spent.checked_add(requested))
        .is_some_and(|sum| sum <= allowance);
    if within {
        return Decision::Allow;
    }
    Decision::Deny(DenyReason::AllowanceExceeded {
        resource,
        spent,
        requested: requested.unwrap_or(u128::MAX),
        allowance,
    })
}

impl GasLimit {
    pub fn new(allowance: u128) -> Self {
        Self {
            allowance: Some(allowance),
            value_allowance: None,
            paymaster: PaymasterRule::Any,
        }
    }

    pub fn with_value_allowance(mut self, value_allowance: u128) -> Self {
        self.value_allowance = Some(value_allowance);
        self
    }

    pub fn with_paymaster(mut self, paymaster: PaymasterRule) -> Self {
        self.paymaster = paymaster;
        self
    }

    fn check_paymaster(&self, intent: &Intent) -> Decision {
        match (self.paymaster, intent.paymaster) {
            (PaymasterRule::Required, None) => Decision::Deny(DenyReason::PaymasterRequired),
            (PaymasterRule::Exactly(allowed), paymaster) if paymaster != Some(allowed) => {
                Decision::Deny(DenyReason::PaymasterNotAllowed { paymaster, allowed })
            }
            (PaymasterRule::Forbidden, Some(paymaster)) => {
                Decision::Deny(DenyReason::PaymasterForbidden { paymaster })
            }
            _ => Decision::Allow,
        }
    }

    #[cfg(test)]
    fn evaluate(&self, intent: &Intent, usage: &PolicyUsage) -> Decision {
        self.evaluate_calls(std::slice::from_ref(intent), usage)
    }

    pub(super) fn evaluate_calls(&self, calls: &[Intent], usage: &PolicyUsage) -> Decision {
        if let Some(denied) = calls
            .iter()
            .map(|call| self.check_paymaster(call))
            .find(|decision| !decision.is_allow())
        {
            return denied;
        }

        if let Some(allowance) = self.allowance {
            let decision = check_allowance(
                Allowance::Gas,
                usage.gas_spent,
                total(calls, |call| call.gas),
                allowance,
            );
            if !decision.is_allow() {
                return decision;
            }
        }
        if let Some(allowance) = self.value_allowance {
            return check_allowance(
                Allowance::Value,
                usage.value_spent,
                total(calls, |call| call.value),
                allowance,
            );
        }
        Decision::Allow
    }

    pub(super) fn record_calls(&self, calls: &[Intent], usage: &mut PolicyUsage) {
        for call in calls {
            usage.gas_spent = usage.gas_spent.saturating_add(call.gas);
            usage.value_spent = usage.value_spent.saturating_add(call.value);
        }
    }
}

/// Window semantics of a rate limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateWindow {
    /// Windows of `interval` seconds, the first starting at the first use and
    /// each later one at the first use after the previous window closed
    #[default]
    Fixed,
    /// At most `count` uses in any `interval` seconds
    Sliding,
}

/// At most `count` uses per `interval` seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub count: u32,
    /// Window length in seconds
    pub interval: u64,
    #[serde(default)]
    pub window: RateWindow,
}

impl RateLimit {
    pub fn new(count: u32, interval: u64) -> Self {
        Self {
            count,
            interval,
            window: RateWindow::Fixed,
        }
    }

    pub fn sliding(count: u32, interval: u64) -> Self {
        Self {
            count,
            interval,
            window: RateWindow::Sliding,
        }
    }

    pub(super) fn validate(&self) -> Result<(), String> {
        if self.count == 0 {
            return Err("count must be greater than zero".to_string());
        }
        if self.interval == 0 {
            return Err("interval must be greater than zero".to_string());
        }
        Ok(())
    }

    fn window_end(&self, start: u64) -> u64 {
        start.saturating_add(self.interval)
    }

    pub(super) fn evaluate(&self, now: u64, usage: &PolicyUsage) -> Decision {
        let (used, reopens_at) = match self.window {
            RateWindow::Fixed => match usage.window_start {
                Some(start) if now < self.window_end(start) => {
                    (usage.uses.len(), self.window_end(start))
                }
                _ => (0, now),
            },
            RateWindow::Sliding => {
                let mut active = usage
                    .uses
                    .iter()
                    .copied()
                    .filter(|t| now < self.window_end(*t));
                let oldest = active.next();
                let used = oldest.map_or(0, |_| 1 + active.count());
                (used, oldest.map_or(now, |t| self.window_end(t)))
            }
        };

        if used >= self.count as usize {
            return Decision::Deny(DenyReason::RateLimited {
                count: self.count,
                interval: self.interval,
                retry_after: reopens_at.saturating_sub(now),
            });
        }
        Decision::Allow
    }

    pub(super) fn record(&self, now: u64, usage: &mut PolicyUsage) {
        match self.window {
            RateWindow::Fixed => {
                let open = usage
                    .window_start
                    .is_some_and(|start| now < self.window_end(start));
                if !open {
                    usage.window_start = Some(now);
                    usage.uses.clear();
                }
            }
            RateWindow::Sliding => {
                let interval = self.interval;
                usage.uses.retain(|t| now < t.saturating_add(interval));
            }
        }
        usage.uses.push(now);
    }
}

/// Validity period, inclusive at both ends, in Unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub valid_after: u64,
    pub valid_until: u64,
}

impl TimeWindow {
    pub fn new(valid_after: u64, valid_until: u64) -> Self {
        Self {
            valid_after,
            valid_until,
        }
    }

    pub(super) fn validate(&self) -> Result<(), String> {
        if self.valid_after > self.valid_until {
            return Err(format!(
                "valid_after {} is later than valid_until {}",
                self.valid_after, self.valid_until
            ));
        }
        Ok(())
    }

    pub(super) fn evaluate(&self, now: u64) -> Decision {
        if now < self.valid_after || now > self.valid_until {
            return Decision::Deny(DenyReason::OutsideTimeWindow {
                now,
                valid_after: self.valid_after,
                valid_until: self.valid_until,
            });
        }
        Decision::Allow
    }
}

/// Only the listed callers may use the key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerRestriction {
    pub allowed: Vec<Address>,
}

impl CallerRestriction {
    pub fn new(allowed: impl IntoIterator<Item = Address>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
        }
    }

    pub(super) fn validate(&self) -> Result<(), String> {
        if self.allowed.is_empty() {
            return Err("no callers are allowed".to_string());
        }
        Ok(())
    }

    pub(super) fn evaluate(&self, intent: &Intent) -> Decision {
        match intent.caller {
            Some(caller) if self.allowed.contains(&caller) => Decision::Allow,
            caller => Decision::Deny(DenyReason::CallerNotAllowed { caller }),
        }
    }
}

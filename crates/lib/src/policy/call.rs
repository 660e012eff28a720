//! Call restrictions: which contracts and functions a key may call, with what.

use serde::{Deserialize, Serialize};

use super::{Decision, DenyReason, Intent, Selector, Word};
use crate::auth::Address;

/// Comparison applied to one ABI argument.
///
/// All comparisons treat words as big-endian unsigned integers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Equal(Word),
    NotEqual(Word),
    GreaterThan(Word),
    GreaterThanOrEqual(Word),
    LessThan(Word),
    LessThanOrEqual(Word),
    /// Argument must equal one of the listed words
    OneOf(Vec<Word>),
}

impl Condition {
    /// Whether `arg` satisfies this condition.
    pub fn matches(&self, arg: &Word) -> bool {
        match self {
            Condition::Equal(expected) => arg == expected,
            Condition::NotEqual(expected) => arg != expected,
            Condition::GreaterThan(bound) => arg > bound,
            Condition::GreaterThanOrEqual(bound) => arg >= bound,
            Condition::LessThan(bound) => arg < bound,
            Condition::LessThanOrEqual(bound) => arg <= bound,
            Condition::OneOf(options) => options.contains(arg),
        }
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Condition::Equal(w) => write!(f, "== {w}"),
            Condition::NotEqual(w) => write!(f, "!= {w}"),
            Condition::GreaterThan(w) => write!(f, "> {w}"),
            Condition::GreaterThanOrEqual(w) => write!(f, ">= {w}"),
            Condition::LessThan(w) => write!(f, "< {w}"),
            Condition::LessThanOrEqual(w) => write!(f, "<= {w}"),
            Condition::OneOf(options) => write!(f, "one of {} values", options.len()),
        }
    }
}

/// A condition on the argument at `index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArgCondition {
    pub index: u16,
    pub condition: Condition,
}

impl ArgCondition {
    pub fn new(index: u16, condition: Condition) -> Self {
        Self { index, condition }
    }
}

/// One permitted `(target, selector)` pair and the limits on its use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallPermission {
    pub target: Address,
    pub selector: Selector,
    /// Largest native value the call may carry
    #[serde(default, with = "crate::encoding::dec_u128")]
    pub value_limit: u128,
    /// Conditions every one of which must hold
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<ArgCondition>,
}

impl CallPermission {
    /// Permit calling `selector` on `target` with no value and any arguments.
    pub fn new(target: Address, selector: Selector) -> Self {
        Self {
            target,
            selector,
            value_limit: 0,
            args: Vec::new(),
        }
    }

    pub fn with_value_limit(mut self, value_limit: u128) -> Self {
        self.value_limit = value_limit;
        self
    }

    pub fn with_arg(mut self, index: u16, condition: Condition) -> Self {
        self.args.push(ArgCondition::new(index, condition));
        self
    }

    fn check(&self, intent: &Intent) -> Decision {
        if intent.value > self.value_limit {
            return Decision::Deny(DenyReason::ValueLimitExceeded {
                value: intent.value,
                limit: self.value_limit,
            });
        }
        for rule in &self.args {
            let Some(arg) = intent.args.get(rule.index as usize) else {
                return Decision::Deny(DenyReason::MissingArgument { index: rule.index });
            };
            if !rule.condition.matches(arg) {
                return Decision::Deny(DenyReason::ArgumentRejected {
                    index: rule.index,
                    value: *arg,
                    condition: rule.condition.to_string(),
                });
            }
        }
        Decision::Allow
    }
}

/// Allow-list of calls. Anything not listed is denied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallRestriction {
    pub permissions: Vec<CallPermission>,
}

impl CallRestriction {
    pub fn new(permissions: impl IntoIterator<Item = CallPermission>) -> Self {
        Self {
            permissions: permissions.into_iter().collect(),
        }
    }

    pub(super) fn validate(&self) -> Result<(), String> {
        if self.permissions.is_empty() {
            return Err("no calls are permitted".to_string());
        }
        Ok(())
    }

    /// Allow if any permission for the intent's target and selector accepts it.
    ///
    /// When several permissions match but all reject, the first rejection is
    /// reported.
    pub fn evaluate(&self, intent: &Intent) -> Decision {
        let mut first_denial = None;
        for permission in self
            .permissions
            .iter()
            .filter(|p| p.target == intent.target && p.selector == intent.selector)
        {
            match permission.check(intent) {
                Decision::Allow => return Decision::Allow,
                Decision::Deny(reason) => {
                    first_denial.get_or_insert(reason);
                }
            }
        }
        Decision::Deny(first_denial.unwrap_or(DenyReason::CallNotPermitted {
            target: intent.target,
            selector: intent.selector,
        }))
    }
}

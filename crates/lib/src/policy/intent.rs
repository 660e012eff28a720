//! The action a delegated key asks to authorize.

use serde::{Deserialize, Serialize};

use crate::auth::{Address, keccak256};
use crate::encoding::fixed_bytes;

fixed_bytes!(
    /// 4-byte function selector.
    Selector,
    4,
    "selector"
);

fixed_bytes!(
    /// A 32-byte ABI word. Ordering is that of the big-endian unsigned integer.
    Word,
    32,
    "word"
);

impl Selector {
    /// Selector of a canonical function signature.
    ///
    /// ```
    /// use vouch::policy::Selector;
    ///
    /// let transfer = Selector::from_signature("transfer(address,uint256)");
    /// assert_eq!(transfer.to_string(), "0xa9059cbb");
    /// ```
    pub fn from_signature(signature: &str) -> Self {
        let hash = keccak256(signature.as_bytes());
        Self([hash[0], hash[1], hash[2], hash[3]])
    }
}

impl Word {
    /// Left-padded unsigned integer.
    pub fn from_u128(value: u128) -> Self {
        let mut word = [0u8; 32];
        word[16..].copy_from_slice(&value.to_be_bytes());
        Self(word)
    }

    /// Left-padded address.
    pub fn from_address(address: &Address) -> Self {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(address.as_bytes());
        Self(word)
    }

    /// Value as `u128`, if it fits.
    pub fn to_u128(&self) -> Option<u128> {
        if self.0[..16].iter().any(|b| *b != 0) {
            return None;
        }
        let mut low = [0u8; 16];
        low.copy_from_slice(&self.0[16..]);
        Some(u128::from_be_bytes(low))
    }
}

impl From<u128> for Word {
    fn from(value: u128) -> Self {
        Self::from_u128(value)
    }
}

impl From<Address> for Word {
    fn from(address: Address) -> Self {
        Self::from_address(&address)
    }
}

/// Structured description of an operation, decoded by the caller.
///
/// Policies never parse calldata themselves; they inspect this view of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    /// Contract being called
    pub target: Address,
    /// Function selector of the call
    pub selector: Selector,
    /// Native value attached to the call
    #[serde(default, with = "crate::encoding::dec_u128")]
    pub value: u128,
    /// ABI-decoded static arguments, one word each
    #[serde(default)]
    pub args: Vec<Word>,
    /// Account asking for the signature, for caller-restricted keys
    #[serde(default)]
    pub caller: Option<Address>,
    /// Paymaster sponsoring the operation, if any
    #[serde(default)]
    pub paymaster: Option<Address>,
    /// Gas the operation may consume
    #[serde(default, with = "crate::encoding::dec_u128")]
    pub gas: u128,
}

impl Intent {
    /// A call with no value, arguments, caller, paymaster or gas.
    pub fn call(target: Address, selector: Selector) -> Self {
        Self {
            target,
            selector,
            value: 0,
            args: Vec::new(),
            caller: None,
            paymaster: None,
            gas: 0,
        }
    }

    pub fn with_value(mut self, value: u128) -> Self {
        self.value = value;
        self
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = Word>) -> Self {
        self.args = args.into_iter().collect();
        self
    }

    pub fn with_caller(mut self, caller: Address) -> Self {
        self.caller = Some(caller);
        self
    }

    pub fn with_paymaster(mut self, paymaster: Address) -> Self {
        self.paymaster = Some(paymaster);
        self
    }

    pub fn with_gas(mut self, gas: u128) -> Self {
        self.gas = gas;
        self
    }
}

//! Identity and digest types.

use sha3::{Digest as _, Keccak256};

use crate::constants::MESSAGE_PREFIX;
use crate::encoding::fixed_bytes;

fixed_bytes!(
    /// A 20-byte account-style address.
    ///
    /// Signer identities are derived from public keys the way Ethereum addresses
    /// are: the last 20 bytes of the Keccak-256 hash of the key.
    Address,
    20,
    "address"
);

fixed_bytes!(
    /// A 32-byte message digest, the unit every signer signs.
    Digest,
    32,
    "digest"
);

/// Identity of a signer.
pub type SignerId = Address;

impl Address {
    /// Derive an address from arbitrary public key material.
    pub fn from_key_material(material: &[u8]) -> Self {
        let hash = keccak256(material);
        let mut address = [0u8; 20];
        address.copy_from_slice(&hash[12..]);
        Self(address)
    }
}

impl Digest {
    /// Keccak-256 digest of raw bytes.
    pub fn keccak256(data: impl AsRef<[u8]>) -> Self {
        Self(keccak256(data.as_ref()))
    }

    /// EIP-191 digest of a personal message.
    ///
    /// ```
    /// use vouch::auth::Digest;
    ///
    /// let digest = Digest::of_message(b"hello world");
    /// assert_eq!(
    ///     digest.to_string(),
    ///     "0xd9eba16ed0ecae432b71fe008c98cc872bb4cc214d3220a36f365326cf807d68"
    /// );
    /// ```
    pub fn of_message(message: impl AsRef<[u8]>) -> Self {
        let message = message.as_ref();
        let mut hasher = Keccak256::new();
        hasher.update(MESSAGE_PREFIX.as_bytes());
        hasher.update(message.len().to_string().as_bytes());
        hasher.update(message);
        Self(hasher.finalize().into())
    }
}

/// Keccak-256 hash.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

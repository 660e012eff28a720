//! Passphrase sealing for session key bundles.
//!
//! - Argon2id derives a 32-byte key from the passphrase and a random salt
//! - AES-256-GCM encrypts the bundle bytes under a random nonce
//!
//! Argon2 costs travel with the sealed bundle so they can be raised later
//! without breaking existing bundles.

use aes_gcm::{
    Aes256Gcm, KeyInit, Nonce,
    aead::{Aead, AeadCore, OsRng},
};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{SaltString, rand_core},
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

use crate::state::StateError;

/// Nonce length for AES-GCM (12 bytes standard)
pub const NONCE_LENGTH: usize = 12;

/// Derived key length for AES-256 (32 bytes)
pub const KEY_LENGTH: usize = 32;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealParams {
    /// Memory cost in KiB
    pub m_cost: u32,
    /// Number of passes
    pub t_cost: u32,
    /// Degree of parallelism
    pub p_cost: u32,
}

impl Default for SealParams {
    fn default() -> Self {
        Self {
            m_cost: Params::DEFAULT_M_COST,
            t_cost: Params::DEFAULT_T_COST,
            p_cost: Params::DEFAULT_P_COST,
        }
    }
}

impl SealParams {
    fn argon2(&self) -> Result<Argon2<'static>, String> {
        let params = Params::new(self.m_cost, self.t_cost, self.p_cost, Some(KEY_LENGTH))
            .map_err(|e| format!("Invalid Argon2 parameters: {e}"))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// A bundle encrypted under a passphrase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBundle {
    pub params: SealParams,
    /// Argon2 salt (base64, PHC alphabet)
    pub salt: String,
    #[serde(with = "crate::encoding::hex_bytes")]
    pub nonce: Vec<u8>,
    #[serde(with = "crate::encoding::hex_bytes")]
    pub ciphertext: Vec<u8>,
}

fn derive_key(
    passphrase: &str,
    salt: &str,
    params: &SealParams,
) -> Result<Zeroizing<[u8; KEY_LENGTH]>, String> {
    let mut key = Zeroizing::new([0u8; KEY_LENGTH]);
    params
        .argon2()?
        .hash_password_into(passphrase.as_bytes(), salt.as_bytes(), &mut key[..])
        .map_err(|e| format!("Key derivation failed: {e}"))?;
    Ok(key)
}

pub(super) fn seal(
    plaintext: &[u8],
    passphrase: &str,
    params: &SealParams,
) -> Result<SealedBundle, StateError> {
    let salt = SaltString::generate(&mut rand_core::OsRng);
    let key = derive_key(passphrase, salt.as_str(), params)
        .map_err(|reason| StateError::SealFailed { reason })?;

    let cipher =
        Aes256Gcm::new_from_slice(&key[..]).map_err(|e| StateError::SealFailed {
            reason: format!("Failed to create cipher: {e}"),
        })?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| StateError::SealFailed {
            reason: format!("Encryption failed: {e}"),
        })?;

    debug!(m_cost = params.m_cost, t_cost = params.t_cost, "Sealed session bundle");
    Ok(SealedBundle {
        params: *params,
        salt: salt.as_str().to_string(),
        nonce: nonce.to_vec(),
        ciphertext,
    })
}

pub(super) fn unseal(
    sealed: &SealedBundle,
    passphrase: &str,
) -> Result<Zeroizing<Vec<u8>>, StateError> {
    if sealed.nonce.len() != NONCE_LENGTH {
        return Err(StateError::UnsealFailed);
    }
    SaltString::from_b64(&sealed.salt).map_err(|_| StateError::UnsealFailed)?;

    let key = derive_key(passphrase, &sealed.salt, &sealed.params)
        .map_err(|_| StateError::UnsealFailed)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..]).map_err(|_| StateError::UnsealFailed)?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&sealed.nonce), sealed.ciphertext.as_ref())
        .map_err(|_| StateError::UnsealFailed)?;

    debug!("Unsealed session bundle");
    Ok(Zeroizing::new(plaintext))
}

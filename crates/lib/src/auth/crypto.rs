//! Cryptographic operations for Vouch signers
//!
//! The `PublicKey` and `PrivateKey` enums enable crypto-agility by dispatching to
//! algorithm-specific implementations. secp256k1 is the default scheme because
//! account contracts verify it natively; Ed25519 is supported for signers that
//! live outside the EVM world.
//!
//! Signatures are self-describing by length:
//!
//! | scheme    | bytes | layout                  | verification                   |
//! |-----------|-------|-------------------------|--------------------------------|
//! | secp256k1 | 65    | `r ‖ s ‖ v`, v ∈ {27,28} | recover address, compare       |
//! | ed25519   | 96    | `pubkey ‖ signature`    | derive address, verify strictly |

use base64ct::{Base64, Encoding};
use ed25519_dalek::Signer as _;
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::{ZeroizeOnDrop, Zeroizing};

use super::errors::AuthError;
use super::types::{Address, Digest, SignerId};

/// Size of Ed25519 public keys in bytes
pub const ED25519_PUBLIC_KEY_SIZE: usize = 32;

/// Size of Ed25519 private keys in bytes
pub const ED25519_PRIVATE_KEY_SIZE: usize = 32;

/// Size of raw Ed25519 signatures in bytes
pub const ED25519_SIGNATURE_SIZE: usize = 64;

/// Size of an encoded Ed25519 signature (public key followed by signature)
pub const ED25519_ENCODED_SIGNATURE_SIZE: usize = ED25519_PUBLIC_KEY_SIZE + ED25519_SIGNATURE_SIZE;

/// Size of secp256k1 private keys in bytes
pub const SECP256K1_PRIVATE_KEY_SIZE: usize = 32;

/// Size of a recoverable secp256k1 signature in bytes
pub const SECP256K1_SIGNATURE_SIZE: usize = 65;

/// Signature scheme of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureScheme {
    /// ECDSA over secp256k1 with public key recovery
    #[default]
    Secp256k1,
    /// Ed25519
    Ed25519,
}

impl SignatureScheme {
    /// Algorithm name used as key prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            SignatureScheme::Secp256k1 => "secp256k1",
            SignatureScheme::Ed25519 => "ed25519",
        }
    }
}

impl std::fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SignatureScheme {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "secp256k1" => Ok(SignatureScheme::Secp256k1),
            "ed25519" => Ok(SignatureScheme::Ed25519),
            _ => Err(AuthError::InvalidKeyFormat {
                reason: format!("Unknown key algorithm: {s}"),
            }),
        }
    }
}

// ==================== Algorithm-Agnostic Key Types ====================

/// Algorithm-agnostic public key.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    /// secp256k1 verifying key
    Secp256k1(k256::ecdsa::VerifyingKey),
    /// Ed25519 public key (32 bytes)
    Ed25519(ed25519_dalek::VerifyingKey),
}

impl PublicKey {
    /// Signer identity derived from this key.
    ///
    /// For secp256k1 this is the Ethereum address of the key. For Ed25519 it is
    /// derived the same way from the raw 32-byte key.
    pub fn signer_id(&self) -> SignerId {
        match self {
            PublicKey::Secp256k1(key) => {
                let point = key.to_encoded_point(false);
                Address::from_key_material(&point.as_bytes()[1..])
            }
            PublicKey::Ed25519(key) => Address::from_key_material(key.as_bytes()),
        }
    }

    /// The scheme of this key.
    pub fn scheme(&self) -> SignatureScheme {
        match self {
            PublicKey::Secp256k1(_) => SignatureScheme::Secp256k1,
            PublicKey::Ed25519(_) => SignatureScheme::Ed25519,
        }
    }

    /// Get the algorithm name for this key.
    pub fn algorithm(&self) -> &'static str {
        self.scheme().as_str()
    }

    /// Format the public key as a prefixed string (e.g. `"secp256k1:base64..."`).
    ///
    /// secp256k1 keys use the compressed SEC1 form.
    pub fn to_prefixed_string(&self) -> String {
        let encoded = match self {
            PublicKey::Secp256k1(key) => {
                Base64::encode_string(key.to_encoded_point(true).as_bytes())
            }
            PublicKey::Ed25519(key) => Base64::encode_string(&key.to_bytes()),
        };
        format!("{}:{encoded}", self.algorithm())
    }

    /// Parse a public key from a prefixed string.
    pub fn from_prefixed_string(s: &str) -> Result<Self, AuthError> {
        let (scheme, key_bytes) = split_prefixed(s)?;
        match scheme {
            SignatureScheme::Secp256k1 => k256::ecdsa::VerifyingKey::from_sec1_bytes(&key_bytes)
                .map(PublicKey::Secp256k1)
                .map_err(|e| AuthError::KeyParsingFailed {
                    reason: e.to_string(),
                }),
            SignatureScheme::Ed25519 => {
                let key_array: [u8; ED25519_PUBLIC_KEY_SIZE] = key_bytes.try_into().map_err(
                    |v: Vec<u8>| AuthError::InvalidKeyFormat {
                        reason: format!(
                            "Ed25519 public key must be {ED25519_PUBLIC_KEY_SIZE} bytes, got {}",
                            v.len()
                        ),
                    },
                )?;
                ed25519_dalek::VerifyingKey::from_bytes(&key_array)
                    .map(PublicKey::Ed25519)
                    .map_err(|e| AuthError::KeyParsingFailed {
                        reason: e.to_string(),
                    })
            }
        }
    }
}

impl std::fmt::Display for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_prefixed_string())
    }
}

/// Serializes as the prefixed string format.
impl Serialize for PublicKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_prefixed_string())
    }
}

/// Deserializes from the prefixed string format.
impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PublicKey::from_prefixed_string(&s).map_err(serde::de::Error::custom)
    }
}

/// Algorithm-agnostic signing key.
///
/// Secret material is volatile-zeroed on drop via the inner key types'
/// [`ZeroizeOnDrop`] implementations.
#[non_exhaustive]
pub enum PrivateKey {
    /// secp256k1 signing key (32 bytes)
    Secp256k1(k256::ecdsa::SigningKey),
    /// Ed25519 signing key (32 bytes)
    Ed25519(ed25519_dalek::SigningKey),
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrivateKey::Secp256k1(_) => f.write_str("PrivateKey::Secp256k1([REDACTED])"),
            PrivateKey::Ed25519(_) => f.write_str("PrivateKey::Ed25519([REDACTED])"),
        }
    }
}

impl PrivateKey {
    /// Generate a fresh key for the given scheme.
    pub fn generate(scheme: SignatureScheme) -> Self {
        match scheme {
            SignatureScheme::Secp256k1 => {
                PrivateKey::Secp256k1(k256::ecdsa::SigningKey::random(&mut OsRng))
            }
            SignatureScheme::Ed25519 => {
                PrivateKey::Ed25519(ed25519_dalek::SigningKey::generate(&mut OsRng))
            }
        }
    }

    /// Sign a 32-byte digest, producing the scheme's self-describing encoding.
    pub fn sign_digest(&self, digest: &Digest) -> Result<Vec<u8>, AuthError> {
        match self {
            PrivateKey::Secp256k1(key) => {
                let (signature, recovery_id) = key
                    .sign_prehash_recoverable(digest.as_bytes())
                    .map_err(|e| AuthError::SigningFailed {
                        signer: self.signer_id(),
                        reason: e.to_string(),
                    })?;
                let mut out = Vec::with_capacity(SECP256K1_SIGNATURE_SIZE);
                out.extend_from_slice(&signature.to_bytes());
                out.push(27 + recovery_id.to_byte());
                Ok(out)
            }
            PrivateKey::Ed25519(key) => {
                let signature = key.sign(digest.as_bytes());
                let mut out = Vec::with_capacity(ED25519_ENCODED_SIGNATURE_SIZE);
                out.extend_from_slice(key.verifying_key().as_bytes());
                out.extend_from_slice(&signature.to_bytes());
                Ok(out)
            }
        }
    }

    /// Derive the corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        match self {
            PrivateKey::Secp256k1(key) => PublicKey::Secp256k1(*key.verifying_key()),
            PrivateKey::Ed25519(key) => PublicKey::Ed25519(key.verifying_key()),
        }
    }

    /// Signer identity of this key.
    pub fn signer_id(&self) -> SignerId {
        self.public_key().signer_id()
    }

    /// The scheme of this key.
    pub fn scheme(&self) -> SignatureScheme {
        match self {
            PrivateKey::Secp256k1(_) => SignatureScheme::Secp256k1,
            PrivateKey::Ed25519(_) => SignatureScheme::Ed25519,
        }
    }

    /// Get the algorithm name for this key.
    pub fn algorithm(&self) -> &'static str {
        self.scheme().as_str()
    }

    /// Export the raw key bytes.
    ///
    /// The returned buffer is wrapped in [`Zeroizing`] so the key material
    /// is automatically cleared from memory when dropped.
    fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        match self {
            PrivateKey::Secp256k1(key) => Zeroizing::new(key.to_bytes().to_vec()),
            PrivateKey::Ed25519(key) => Zeroizing::new(key.to_bytes().to_vec()),
        }
    }

    /// Reconstruct a private key from raw bytes.
    pub fn from_bytes(scheme: SignatureScheme, bytes: &[u8]) -> Result<Self, AuthError> {
        match scheme {
            SignatureScheme::Secp256k1 => {
                if bytes.len() != SECP256K1_PRIVATE_KEY_SIZE {
                    return Err(AuthError::InvalidKeyFormat {
                        reason: format!(
                            "secp256k1 private key must be {SECP256K1_PRIVATE_KEY_SIZE} bytes, got {}",
                            bytes.len()
                        ),
                    });
                }
                k256::ecdsa::SigningKey::from_slice(bytes)
                    .map(PrivateKey::Secp256k1)
                    .map_err(|e| AuthError::KeyParsingFailed {
                        reason: e.to_string(),
                    })
            }
            SignatureScheme::Ed25519 => {
                let key_array: [u8; ED25519_PRIVATE_KEY_SIZE] =
                    bytes.try_into().map_err(|_| AuthError::InvalidKeyFormat {
                        reason: format!(
                            "Ed25519 private key must be {ED25519_PRIVATE_KEY_SIZE} bytes, got {}",
                            bytes.len()
                        ),
                    })?;
                Ok(PrivateKey::Ed25519(ed25519_dalek::SigningKey::from_bytes(
                    &key_array,
                )))
            }
        }
    }

    /// Format the private key as a prefixed string (e.g. `"secp256k1:base64..."`).
    ///
    /// The returned string is wrapped in [`Zeroizing`] so the key material
    /// is automatically cleared from memory when dropped.
    pub fn to_prefixed_string(&self) -> Zeroizing<String> {
        let bytes = self.to_bytes();
        let encoded = Zeroizing::new(Base64::encode_string(&bytes));
        Zeroizing::new(format!("{}:{}", self.algorithm(), encoded.as_str()))
    }

    /// Parse a private key from a prefixed string.
    pub fn from_prefixed_string(s: &str) -> Result<Self, AuthError> {
        let (scheme, key_bytes) = split_prefixed(s)?;
        let key_bytes = Zeroizing::new(key_bytes);
        Self::from_bytes(scheme, &key_bytes)
    }
}

/// Zeroization is handled by the inner key types' `Drop` impls.
/// `k256::ecdsa::SigningKey` zeroizes its scalar on drop; for Ed25519 the
/// `zeroize` feature on `ed25519-dalek` does the same.
///
/// **Invariant:** all inner key types must implement [`ZeroizeOnDrop`].
impl ZeroizeOnDrop for PrivateKey {}

/// Serializes as the prefixed string format.
impl Serialize for PrivateKey {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_prefixed_string())
    }
}

/// Deserializes from the prefixed string format.
impl<'de> Deserialize<'de> for PrivateKey {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = Zeroizing::new(String::deserialize(deserializer)?);
        PrivateKey::from_prefixed_string(&s).map_err(serde::de::Error::custom)
    }
}

fn split_prefixed(s: &str) -> Result<(SignatureScheme, Vec<u8>), AuthError> {
    let (prefix, key_data) = s
        .split_once(':')
        .ok_or_else(|| AuthError::InvalidKeyFormat {
            reason: "Expected 'algorithm:key' format".to_string(),
        })?;
    let scheme = prefix
        .parse::<SignatureScheme>()
        .map_err(|_| AuthError::InvalidKeyFormat {
            reason: format!("Unknown key algorithm prefix: '{prefix}'"),
        })?;
    let bytes = Base64::decode_vec(key_data).map_err(|e| AuthError::InvalidKeyFormat {
        reason: format!("Invalid base64 for key: {e}"),
    })?;
    Ok((scheme, bytes))
}

// ==================== Verification ====================

/// Recover the signer of a 65-byte secp256k1 signature.
///
/// Accepts `v` as 27/28 or as a raw recovery id 0/1. High-`s` signatures are
/// rejected.
pub fn recover_signer(digest: &Digest, signature: &[u8]) -> Result<SignerId, AuthError> {
    if signature.len() != SECP256K1_SIGNATURE_SIZE {
        return Err(AuthError::MalformedSignature {
            reason: format!(
                "secp256k1 signature must be {SECP256K1_SIGNATURE_SIZE} bytes, got {}",
                signature.len()
            ),
        });
    }
    let malformed = |reason: &str| AuthError::MalformedSignature {
        reason: reason.to_string(),
    };
    let sig = EcdsaSignature::from_slice(&signature[..64]).map_err(|_| malformed("bad r or s"))?;
    let v = signature[64];
    let v = if v >= 27 { v - 27 } else { v };
    let recovery_id = RecoveryId::from_byte(v).ok_or_else(|| malformed("bad recovery id"))?;
    let key = k256::ecdsa::VerifyingKey::recover_from_prehash(digest.as_bytes(), &sig, recovery_id)
        .map_err(|_| malformed("public key recovery failed"))?;
    Ok(PublicKey::Secp256k1(key).signer_id())
}

/// Verify that `signature` over `digest` was produced by `signer`.
///
/// The scheme is selected by signature length. Every rejection, including an
/// unsupported length or unparseable `r`, `s` or `v`, is
/// [`AuthError::InvalidSignature`] naming the claimed signer.
pub fn verify_digest(
    signer: &SignerId,
    digest: &Digest,
    signature: &[u8],
) -> Result<(), AuthError> {
    let recovered = match signature.len() {
        SECP256K1_SIGNATURE_SIZE => {
            recover_signer(digest, signature).map_err(|_| AuthError::InvalidSignature {
                signer: *signer,
            })?
        }
        ED25519_ENCODED_SIGNATURE_SIZE => {
            let (key_bytes, sig_bytes) = signature.split_at(ED25519_PUBLIC_KEY_SIZE);
            let key_array: [u8; ED25519_PUBLIC_KEY_SIZE] =
                key_bytes
                    .try_into()
                    .map_err(|_| AuthError::InvalidSignature { signer: *signer })?;
            let sig_array: [u8; ED25519_SIGNATURE_SIZE] =
                sig_bytes
                    .try_into()
                    .map_err(|_| AuthError::InvalidSignature { signer: *signer })?;
            let key = ed25519_dalek::VerifyingKey::from_bytes(&key_array)
                .map_err(|_| AuthError::InvalidSignature { signer: *signer })?;
            key.verify_strict(
                digest.as_bytes(),
                &ed25519_dalek::Signature::from_bytes(&sig_array),
            )
            .map_err(|_| AuthError::InvalidSignature { signer: *signer })?;
            PublicKey::Ed25519(key).signer_id()
        }
        _ => return Err(AuthError::InvalidSignature { signer: *signer }),
    };

    if recovered != *signer {
        return Err(AuthError::InvalidSignature { signer: *signer });
    }
    Ok(())
}

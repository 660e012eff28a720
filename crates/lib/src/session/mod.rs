//! Session key delegation.
//!
//! The delegation flow:
//!
//! 1. A session key is generated, by the delegator or by the delegate.
//! 2. The owner (a single signer or a weighted multisig) signs the enable
//!    digest of the permission-scoped validator built from that key and its
//!    policies. See [`SessionKeyManager::approve`].
//! 3. The resulting [`AuthorizationState`] travels to the delegate, alone or
//!    inside a [`SessionKeyBundle`] with the key, optionally sealed under a
//!    passphrase.
//! 4. The delegate rebuilds an active [`PermissionScopedValidator`].

mod seal;

pub use seal::{KEY_LENGTH, NONCE_LENGTH, SealParams, SealedBundle};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::auth::{AuthError, Digest, LocalSigner, PrivateKey, SignatureScheme, SignerId};
use crate::clock::Clock;
use crate::constants::{BUNDLE_MAGIC, BUNDLE_VERSION};
use crate::policy::PolicySet;
use crate::state::{AuthorizationState, DecodeOptions, StateError};
use crate::validator::{
    Lifecycle, PermissionScopedValidator, Validator, ValidatorConfig, ValidatorRegistry,
    enable_digest,
};
use crate::Result;

/// Issues and activates session keys.
#[derive(Debug, Clone)]
pub struct SessionKeyManager {
    clock: Arc<dyn Clock>,
    registry: Option<Arc<dyn ValidatorRegistry>>,
}

impl SessionKeyManager {
    /// `clock` drives the time-dependent policies of activated validators.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            registry: None,
        }
    }

    /// Activated validators consult `registry` to notice revocation.
    pub fn with_registry(mut self, registry: Arc<dyn ValidatorRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn generate_session_key(scheme: SignatureScheme) -> PrivateKey {
        PrivateKey::generate(scheme)
    }

    /// Digest the owner must sign to enable `session_signer` under `policies`.
    ///
    /// A multisig owner opens its approval round on this digest.
    pub fn enable_digest(session_signer: SignerId, policies: &PolicySet) -> Digest {
        let config = ValidatorConfig::PermissionScoped {
            signer: session_signer,
            policies: policies.clone(),
        };
        enable_digest(&config.identifier())
    }

    /// Obtain the owner's enable signature for a session key.
    ///
    /// A weighted multisig owner must already hold enough approvals for
    /// [`enable_digest`](Self::enable_digest).
    pub fn approve(
        &self,
        owner: &Validator,
        session_signer: SignerId,
        policies: PolicySet,
    ) -> Result<AuthorizationState> {
        policies.ensure_delegable()?;
        let owner_config = owner.config();
        if !owner_config.kind().is_sudo() {
            return Err(AuthError::OwnerNotSudo {
                kind: owner_config.kind(),
            }
            .into());
        }

        let config = ValidatorConfig::PermissionScoped {
            signer: session_signer,
            policies,
        };
        let identifier = config.identifier();
        let digest = enable_digest(&identifier);
        let signature = owner.authorize(&digest, None)?;
        owner_config
            .verify(&digest, &signature)
            .map_err(|_| AuthError::InvalidEnableSignature {
                owner: owner_config.identifier(),
            })?;

        info!(
            validator = %identifier,
            owner = %owner_config.identifier(),
            session_signer = %session_signer,
            "Session key approved"
        );
        Ok(AuthorizationState::new(config)
            .with_owner(owner_config)
            .with_enable_signature(signature))
    }

    /// Generate a session key and approve it in one step.
    pub fn create_session(
        &self,
        owner: &Validator,
        scheme: SignatureScheme,
        policies: PolicySet,
    ) -> Result<SessionKeyBundle> {
        let key = Self::generate_session_key(scheme);
        let state = self.approve(owner, key.signer_id(), policies)?;
        SessionKeyBundle::new(state, key)
    }

    /// Rebuild the active validator held in `bundle`.
    pub fn activate(&self, bundle: SessionKeyBundle) -> Result<PermissionScopedValidator> {
        bundle.into_validator(self.clock.clone(), self.registry.clone())
    }
}

/// An approved session: the authorization state plus the session private key.
#[derive(Debug)]
pub struct SessionKeyBundle {
    state: AuthorizationState,
    session_key: PrivateKey,
}

#[derive(Serialize)]
struct BundleRef<'a> {
    #[serde(with = "crate::encoding::hex_bytes")]
    state: Vec<u8>,
    session_key: &'a PrivateKey,
}

#[derive(Deserialize)]
struct RawBundle {
    #[serde(with = "crate::encoding::hex_bytes")]
    state: Vec<u8>,
    session_key: PrivateKey,
}

impl SessionKeyBundle {
    /// Pair an owner-approved state with the session key it names.
    pub fn new(state: AuthorizationState, session_key: PrivateKey) -> Result<Self> {
        state.validate()?;
        let ValidatorConfig::PermissionScoped { signer, .. } = &state.validator else {
            return Err(StateError::malformed(format!(
                "a session bundle needs a permission-scoped validator, got {}",
                state.kind()
            ))
            .into());
        };
        if state.enable_signature.is_none() {
            return Err(StateError::malformed("session has not been approved by an owner").into());
        }
        let found = session_key.signer_id();
        if found != *signer {
            return Err(AuthError::SessionKeyMismatch {
                expected: *signer,
                found,
            }
            .into());
        }
        Ok(Self { state, session_key })
    }

    pub fn state(&self) -> &AuthorizationState {
        &self.state
    }

    pub fn signer_id(&self) -> SignerId {
        self.session_key.signer_id()
    }

    /// Plaintext bundle bytes: `"VSK" ‖ version (u8) ‖ JSON`.
    ///
    /// The output contains the private key.
    pub fn to_bytes(&self) -> Result<Zeroizing<Vec<u8>>> {
        let raw = BundleRef {
            state: self.state.serialize()?,
            session_key: &self.session_key,
        };
        let mut out = Zeroizing::new(Vec::with_capacity(512));
        out.extend_from_slice(BUNDLE_MAGIC);
        out.push(BUNDLE_VERSION);
        serde_json::to_writer(&mut *out, &raw)?;
        Ok(out)
    }

    /// Decode plaintext bundle bytes. The embedded state is checked against
    /// `options`.
    pub fn from_bytes(bytes: &[u8], options: &DecodeOptions) -> Result<Self> {
        let body = bytes
            .strip_prefix(BUNDLE_MAGIC.as_slice())
            .ok_or_else(|| StateError::malformed("missing bundle magic prefix"))?;
        let (&version, body) = body
            .split_first()
            .ok_or_else(|| StateError::malformed("missing bundle version"))?;
        if version != BUNDLE_VERSION {
            return Err(StateError::SchemaVersionMismatch {
                expected: BUNDLE_VERSION,
                found: version,
            }
            .into());
        }
        let raw: RawBundle = serde_json::from_slice(body).map_err(StateError::malformed)?;
        let state = AuthorizationState::deserialize(&raw.state, options)?;
        Self::new(state, raw.session_key)
    }

    /// Encrypt the bundle under `passphrase`.
    pub fn seal(&self, passphrase: &str, params: &SealParams) -> Result<SealedBundle> {
        let bytes = self.to_bytes()?;
        Ok(seal::seal(&bytes, passphrase, params)?)
    }

    /// Decrypt and decode a sealed bundle.
    pub fn unseal(
        sealed: &SealedBundle,
        passphrase: &str,
        options: &DecodeOptions,
    ) -> Result<Self> {
        let bytes = seal::unseal(sealed, passphrase)?;
        Self::from_bytes(&bytes, options)
    }

    /// Rebuild the validator, verifying the owner's enable signature.
    pub fn into_validator(
        self,
        clock: Arc<dyn Clock>,
        registry: Option<Arc<dyn ValidatorRegistry>>,
    ) -> Result<PermissionScopedValidator> {
        let Self { state, session_key } = self;
        let signer = Arc::new(LocalSigner::new(session_key));
        let validator = match state.to_validator(Some(signer), clock, registry)? {
            Validator::PermissionScoped(validator) => validator,
            other => {
                return Err(StateError::malformed(format!(
                    "a session bundle needs a permission-scoped validator, got {}",
                    other.kind()
                ))
                .into());
            }
        };
        if validator.lifecycle() != Lifecycle::Active {
            return Err(AuthError::NotActive {
                validator: validator.identifier(),
                state: validator.lifecycle(),
            }
            .into());
        }
        debug!(validator = %validator.identifier(), "Session key activated");
        Ok(validator)
    }
}

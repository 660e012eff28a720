//! Serializable authorization state.
//!
//! An [`AuthorizationState`] is everything needed to rebuild a configured
//! validator elsewhere, minus private keys:
//!
//! ```text
//! bytes := "VCH" ‖ schema_version (u8) ‖ JSON body
//! ```
//!
//! Decoding fails closed. Unknown validator or policy kinds, a different schema
//! version, structural damage and broken invariants are all rejected rather
//! than partially loaded.

mod errors;

pub use errors::StateError;

use std::sync::Arc;

use base64ct::{Base64, Encoding};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::auth::{AddressOnlySigner, AuthError, Signer};
use crate::clock::Clock;
use crate::constants::{SCHEMA_VERSION, STATE_MAGIC};
use crate::multisig::{ApprovalAggregator, PendingApprovals};
use crate::policy::{PolicyKind, PolicySet};
use crate::validator::{
    OnChainId, PermissionScopedValidator, SingleSignerValidator, Validator, ValidatorConfig,
    ValidatorKind, ValidatorRegistry, WeightedMultisigValidator,
};
use crate::{Error, Result};

/// Decoder settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeOptions {
    /// Schema version the decoder accepts
    pub schema_version: u8,
    /// Reject states whose owner has a different identifier
    pub expected_owner: Option<OnChainId>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            expected_owner: None,
        }
    }
}

impl DecodeOptions {
    pub fn with_expected_owner(mut self, owner: OnChainId) -> Self {
        self.expected_owner = Some(owner);
        self
    }
}

/// Versioned recipe for a configured validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationState {
    pub validator: ValidatorConfig,
    /// Owner that enabled a permission-scoped validator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<ValidatorConfig>,
    /// Open approval round of a weighted multisig
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingApprovals>,
    /// Owner's signature over the enable digest of a permission-scoped validator
    #[serde(
        default,
        with = "crate::encoding::opt_hex_bytes",
        skip_serializing_if = "Option::is_none"
    )]
    pub enable_signature: Option<Vec<u8>>,
}

impl AuthorizationState {
    pub fn new(validator: ValidatorConfig) -> Self {
        Self {
            validator,
            owner: None,
            pending: None,
            enable_signature: None,
        }
    }

    /// Capture the state of a live validator.
    pub fn capture(validator: &Validator) -> Self {
        let mut state = Self::new(validator.config());
        match validator {
            Validator::SingleSigner(_) => {}
            Validator::WeightedMultisig(v) => {
                let pending = v.aggregator().snapshot();
                if pending.digest().is_some() {
                    state.pending = Some(pending);
                }
            }
            Validator::PermissionScoped(v) => {
                state.owner = v.owner();
                state.enable_signature = v.enable_signature();
            }
        }
        state
    }

    pub fn with_owner(mut self, owner: ValidatorConfig) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_pending(mut self, pending: PendingApprovals) -> Self {
        self.pending = Some(pending);
        self
    }

    pub fn with_enable_signature(mut self, signature: Vec<u8>) -> Self {
        self.enable_signature = Some(signature);
        self
    }

    pub fn kind(&self) -> ValidatorKind {
        self.validator.kind()
    }

    pub fn identifier(&self) -> OnChainId {
        self.validator.identifier()
    }

    pub fn owner_identifier(&self) -> Option<OnChainId> {
        self.owner.as_ref().map(ValidatorConfig::identifier)
    }

    pub fn policies(&self) -> Option<&PolicySet> {
        self.validator.policies()
    }

    /// Check the cross-field invariants that serde cannot express.
    pub fn validate(&self) -> std::result::Result<(), StateError> {
        let kind = self.validator.kind();

        if self.pending.is_some() && kind != ValidatorKind::WeightedMultisig {
            return Err(StateError::malformed(format!(
                "pending approvals on a {kind} validator"
            )));
        }
        if let (ValidatorConfig::WeightedMultisig(config), Some(pending)) =
            (&self.validator, &self.pending)
        {
            ApprovalAggregator::restore(config.clone(), pending.clone())
                .map_err(|e| StateError::malformed(format!("pending approvals: {e}")))?;
        }

        if kind != ValidatorKind::PermissionScoped
            && (self.owner.is_some() || self.enable_signature.is_some())
        {
            return Err(StateError::malformed(format!(
                "owner data on a {kind} validator"
            )));
        }
        if let Some(owner) = &self.owner {
            if !owner.kind().is_sudo() {
                return Err(StateError::malformed(format!(
                    "a {} validator cannot own a session key",
                    owner.kind()
                )));
            }
        }
        if self.enable_signature.is_some() && self.owner.is_none() {
            return Err(StateError::malformed("enable signature without an owner"));
        }
        if let Some(policies) = self.validator.policies() {
            policies
                .ensure_delegable()
                .map_err(|e| StateError::malformed(format!("policies: {e}")))?;
        }
        Ok(())
    }

    /// Encode as versioned bytes.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(256);
        out.extend_from_slice(STATE_MAGIC);
        out.push(SCHEMA_VERSION);
        serde_json::to_writer(&mut out, self)?;
        Ok(out)
    }

    /// Decode versioned bytes.
    pub fn deserialize(bytes: &[u8], options: &DecodeOptions) -> Result<Self> {
        let body = bytes
            .strip_prefix(STATE_MAGIC.as_slice())
            .ok_or_else(|| StateError::malformed("missing magic prefix"))?;
        let (&found, body) = body
            .split_first()
            .ok_or_else(|| StateError::malformed("missing schema version"))?;
        if found != options.schema_version {
            return Err(StateError::SchemaVersionMismatch {
                expected: options.schema_version,
                found,
            }
            .into());
        }

        let value: Value = serde_json::from_slice(body).map_err(StateError::malformed)?;
        let root = value
            .as_object()
            .ok_or_else(|| StateError::malformed("state body is not an object"))?;
        let validator = root
            .get("validator")
            .ok_or_else(|| StateError::malformed("missing validator"))?;
        check_validator_kinds(validator)?;
        if let Some(owner) = root.get("owner") {
            check_validator_kinds(owner)?;
        }

        let state: Self = serde_json::from_value(value).map_err(StateError::malformed)?;
        state.validate()?;

        if let Some(expected) = options.expected_owner {
            let found = state.owner_identifier();
            if found != Some(expected) {
                return Err(StateError::OwnerMismatch { expected, found }.into());
            }
        }

        debug!(
            kind = %state.kind(),
            validator = %state.identifier(),
            "Decoded authorization state"
        );
        Ok(state)
    }

    /// Base64 text form of [`serialize`](Self::serialize).
    pub fn to_base64(&self) -> Result<String> {
        Ok(Base64::encode_string(&self.serialize()?))
    }

    /// Decode the base64 text form.
    pub fn from_base64(text: &str, options: &DecodeOptions) -> Result<Self> {
        let bytes = Base64::decode_vec(text.trim())
            .map_err(|e| StateError::malformed(format!("invalid base64: {e}")))?;
        Self::deserialize(&bytes, options)
    }

    /// Rebuild a live validator.
    ///
    /// `signer` is the key for single-signer and permission-scoped validators;
    /// when absent a single-signer validator can only verify. A
    /// permission-scoped validator is restored active when the state carries a
    /// valid enable signature.
    pub fn to_validator(
        &self,
        signer: Option<Arc<dyn Signer>>,
        clock: Arc<dyn Clock>,
        registry: Option<Arc<dyn ValidatorRegistry>>,
    ) -> Result<Validator> {
        self.validate()?;
        match &self.validator {
            ValidatorConfig::SingleSigner { signer: expected } => {
                let signer = match signer {
                    Some(signer) => matching_signer(signer, *expected)?,
                    None => Arc::new(AddressOnlySigner::new(*expected)),
                };
                Ok(SingleSignerValidator::new(signer).into())
            }
            ValidatorConfig::WeightedMultisig(config) => {
                let aggregator = match &self.pending {
                    Some(pending) => ApprovalAggregator::restore(config.clone(), pending.clone())?,
                    None => ApprovalAggregator::new(config.clone()),
                };
                Ok(WeightedMultisigValidator::with_aggregator(Arc::new(aggregator)).into())
            }
            ValidatorConfig::PermissionScoped {
                signer: expected,
                policies,
            } => {
                let signer = signer.ok_or(AuthError::SigningUnavailable { signer: *expected })?;
                let signer = matching_signer(signer, *expected)?;
                let mut validator =
                    PermissionScopedValidator::new(signer, policies.clone(), clock)?;
                if let Some(registry) = registry {
                    validator = validator.with_registry(registry);
                }
                if let Some(owner) = &self.owner {
                    validator.bind_owner(owner.clone())?;
                    if let Some(signature) = &self.enable_signature {
                        validator.attach_enable_signature(signature.clone())?;
                    }
                }
                Ok(validator.into())
            }
        }
    }
}

fn matching_signer(
    signer: Arc<dyn Signer>,
    expected: crate::auth::SignerId,
) -> std::result::Result<Arc<dyn Signer>, AuthError> {
    let found = signer.signer_id();
    if found != expected {
        return Err(AuthError::SessionKeyMismatch { expected, found });
    }
    Ok(signer)
}

/// Reject unknown validator and policy tags before typed decoding, so they
/// surface as such instead of as generic parse failures.
fn check_validator_kinds(validator: &Value) -> std::result::Result<(), Error> {
    let kind = validator
        .get("kind")
        .and_then(Value::as_str)
        .ok_or_else(|| StateError::malformed("validator without a kind"))?;
    let kind = ValidatorKind::from_tag(kind).ok_or_else(|| StateError::UnknownValidatorKind {
        kind: kind.to_string(),
    })?;

    if kind == ValidatorKind::PermissionScoped {
        let policies = validator
            .get("policies")
            .and_then(Value::as_array)
            .ok_or_else(|| StateError::malformed("permission-scoped validator without policies"))?;
        for (index, policy) in policies.iter().enumerate() {
            let tag = policy
                .get("type")
                .and_then(Value::as_str)
                .ok_or_else(|| StateError::malformed(format!("policy #{index} without a type")))?;
            if PolicyKind::from_tag(tag).is_none() {
                return Err(StateError::UnknownPolicyKind {
                    index,
                    kind: tag.to_string(),
                }
                .into());
            }
        }
    }
    Ok(())
}

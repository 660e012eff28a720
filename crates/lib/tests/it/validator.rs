//! The three validator kinds behind the common `Validator` interface.

use std::sync::Arc;

use vouch::{
    Error,
    auth::{AuthError, Digest, LocalSigner, PrivateKey, RemoteSigner, SignatureScheme, Signer,
        SignerId, SigningService},
    policy::{PolicyError, PolicySet},
    validator::{
        InMemoryRegistry, Lifecycle, PermissionScopedValidator, SingleSignerValidator, Validator,
        ValidatorConfig, ValidatorKind, WeightedMultisigValidator,
    },
};

use crate::helpers::{T0, TestClock, multisig, session_policies, signer, transfer_intent};

/// Holds keys on behalf of callers, like a KMS would.
#[derive(Debug)]
struct Vault {
    key: PrivateKey,
    corrupt: bool,
}

impl SigningService for Vault {
    fn sign(
        &self,
        _signer: &SignerId,
        digest: &Digest,
    ) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
        let mut signature = self.key.sign_digest(digest)?;
        if self.corrupt {
            signature[10] ^= 1;
        }
        Ok(signature)
    }
}

fn enabled_session(
    owner: &Validator,
    policies: PolicySet,
    clock: Arc<TestClock>,
) -> PermissionScopedValidator {
    let session = PermissionScopedValidator::new(signer(), policies, clock).unwrap();
    session.bind_owner(owner.config()).unwrap();
    let signature = owner.authorize(&session.enable_digest(), None).unwrap();
    session.attach_enable_signature(signature).unwrap();
    session
}

#[test]
fn test_identifier_encodes_kind_and_is_stable() {
    let key = signer();
    let single: Validator = SingleSignerValidator::new(key.clone()).into();
    let again: Validator = SingleSignerValidator::new(key).into();
    assert_eq!(single.identifier(), again.identifier());
    assert_eq!(single.identifier().kind(), Some(ValidatorKind::SingleSigner));

    let (config, _) = multisig(1, &[1, 1]);
    let weighted: Validator = WeightedMultisigValidator::new(config).into();
    assert_eq!(
        weighted.identifier().kind(),
        Some(ValidatorKind::WeightedMultisig)
    );
    assert_ne!(weighted.identifier(), single.identifier());

    let session = enabled_session(&single, session_policies(1), TestClock::new(T0));
    assert_eq!(
        session.identifier().kind(),
        Some(ValidatorKind::PermissionScoped)
    );
    assert_eq!(session.identifier(), session.config().identifier());
}

#[test]
fn test_identifier_depends_on_policies() {
    let key: Arc<dyn Signer> = signer();
    let clock = TestClock::new(T0);
    let a = PermissionScopedValidator::new(key.clone(), session_policies(1), clock.clone()).unwrap();
    let b = PermissionScopedValidator::new(key, session_policies(2), clock).unwrap();
    assert_ne!(a.identifier(), b.identifier());
    assert_ne!(a.enable_digest(), b.enable_digest());
}

#[test]
fn test_uniform_authorize_and_verify() {
    let digest = Digest::keccak256(b"uniform");

    let single: Validator = SingleSignerValidator::new(signer()).into();

    let (config, signers) = multisig(2, &[1, 1]);
    let weighted = WeightedMultisigValidator::new(config);
    weighted.aggregator().begin_approval(digest);
    for s in &signers {
        weighted.aggregator().approve_with(s.as_ref()).unwrap();
    }
    let weighted: Validator = weighted.into();

    let session: Validator =
        enabled_session(&single, session_policies(5), TestClock::new(T0)).into();

    for validator in [&single, &weighted, &session] {
        let signature = validator
            .authorize(&digest, Some(&transfer_intent()))
            .unwrap();
        assert!(validator.verify(&digest, &signature), "{}", validator.kind());
        assert!(!validator.verify(&Digest::keccak256(b"other"), &signature));
    }
}

#[test]
fn test_remote_signer() {
    let key = PrivateKey::generate(SignatureScheme::Ed25519);
    let id = key.signer_id();
    let remote = RemoteSigner::new(id, Arc::new(Vault {
        key,
        corrupt: false,
    }));
    let validator = SingleSignerValidator::new(Arc::new(remote));
    let digest = Digest::keccak256(b"remote");
    let signature = validator.authorize(&digest).unwrap();
    assert!(validator.config().verify(&digest, &signature).is_ok());

    let key = PrivateKey::generate(SignatureScheme::Secp256k1);
    let id = key.signer_id();
    let broken = RemoteSigner::new(id, Arc::new(Vault { key, corrupt: true }));
    let err = SingleSignerValidator::new(Arc::new(broken))
        .authorize(&digest)
        .unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::InvalidSignature { signer }) if signer == id));
}

#[test]
fn test_multisig_owner_enables_session() {
    let (config, signers) = multisig(2, &[1, 1, 1]);
    let weighted = WeightedMultisigValidator::new(config);
    let aggregator = weighted.aggregator().clone();
    let owner: Validator = weighted.into();

    let session = PermissionScopedValidator::new(
        Arc::new(LocalSigner::generate(SignatureScheme::Ed25519)),
        session_policies(1),
        TestClock::new(T0),
    )
    .unwrap();
    session.bind_owner(owner.config()).unwrap();

    aggregator.begin_approval(session.enable_digest());
    aggregator.approve_with(signers[0].as_ref()).unwrap();
    aggregator.approve_with(signers[2].as_ref()).unwrap();
    let signature = owner.authorize(&session.enable_digest(), None).unwrap();
    session.attach_enable_signature(signature).unwrap();
    assert_eq!(session.lifecycle(), Lifecycle::Active);
}

#[test]
fn test_session_expires_with_time_window() {
    let clock = TestClock::new(T0);
    let owner: Validator = SingleSignerValidator::new(signer()).into();
    let session = enabled_session(&owner, session_policies(100), clock.clone());
    let digest = Digest::keccak256(b"expiring");

    assert!(session.authorize(&digest, Some(&transfer_intent())).is_ok());
    clock.advance(86_401);
    let err = session
        .authorize(&digest, Some(&transfer_intent()))
        .unwrap_err();
    assert!(err.is_policy_denial());
    assert!(!err.is_terminal());
}

#[test]
fn test_session_rate_limit_over_time() {
    let clock = TestClock::new(T0);
    let owner: Validator = SingleSignerValidator::new(signer()).into();
    let session = enabled_session(&owner, session_policies(1), clock.clone());
    let digest = Digest::keccak256(b"rate");

    session.authorize(&digest, Some(&transfer_intent())).unwrap();
    let err = session
        .authorize(&digest, Some(&transfer_intent()))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Policy(PolicyError::RateLimited { index: 1, .. })
    ));
    clock.advance(60);
    session.authorize(&digest, Some(&transfer_intent())).unwrap();
}

#[test]
fn test_revocation_via_registry() {
    let registry = Arc::new(InMemoryRegistry::new());
    let owner: Validator = SingleSignerValidator::new(signer()).into();
    let session = enabled_session(&owner, session_policies(10), TestClock::new(T0))
        .with_registry(registry.clone());
    registry.register(session.identifier());
    let digest = Digest::keccak256(b"revoked");

    session.authorize(&digest, Some(&transfer_intent())).unwrap();
    registry.unregister(&session.identifier());

    let err = session
        .authorize(&digest, Some(&transfer_intent()))
        .unwrap_err();
    assert!(err.is_terminal());
    assert_eq!(session.lifecycle(), Lifecycle::Revoked);

    registry.register(session.identifier());
    assert!(
        session
            .authorize(&digest, Some(&transfer_intent()))
            .unwrap_err()
            .is_terminal()
    );
}

#[test]
fn test_enable_signature_from_wrong_owner() {
    let owner: Validator = SingleSignerValidator::new(signer()).into();
    let impostor: Validator = SingleSignerValidator::new(signer()).into();
    let session = PermissionScopedValidator::new(signer(), session_policies(1), TestClock::new(T0))
        .unwrap();
    session.bind_owner(owner.config()).unwrap();

    let signature = impostor.authorize(&session.enable_digest(), None).unwrap();
    let err = session.attach_enable_signature(signature).unwrap_err();
    assert!(matches!(
        err,
        Error::Auth(AuthError::InvalidEnableSignature { owner: id }) if id == owner.identifier()
    ));
    assert_eq!(session.lifecycle(), Lifecycle::AwaitingEnableApproval);
}

#[test]
fn test_config_json_is_tagged() {
    let key = signer();
    let config = ValidatorConfig::SingleSigner {
        signer: key.signer_id(),
    };
    let json = serde_json::to_value(&config).unwrap();
    assert_eq!(json["kind"], "single_signer");
    assert_eq!(json["signer"], key.signer_id().to_string());
}

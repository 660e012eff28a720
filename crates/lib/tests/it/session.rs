//! Session key approval, hand-off between parties and activation.

use std::sync::Arc;

use vouch::{
    Error,
    auth::{AuthError, Digest, SignatureScheme},
    policy::{Intent, PolicyError},
    session::{SealParams, SealedBundle, SessionKeyBundle, SessionKeyManager},
    state::{AuthorizationState, DecodeOptions, StateError},
    validator::{InMemoryRegistry, Lifecycle, Validator, WeightedMultisigValidator},
};

use crate::helpers::{
    T0, TestClock, approve, multisig, session_policies, single_owner, token, transfer_intent,
};

fn cheap_seal() -> SealParams {
    SealParams {
        m_cost: 64,
        t_cost: 1,
        p_cost: 1,
    }
}

#[test]
fn test_delegator_creates_delegate_activates() {
    let owner = single_owner();
    let delegator = SessionKeyManager::new(TestClock::new(T0));
    let bundle = delegator
        .create_session(&owner, SignatureScheme::Secp256k1, session_policies(3))
        .unwrap();
    let sealed = bundle.seal("hunter2", &cheap_seal()).unwrap();

    // The sealed bundle travels as JSON.
    let wire = serde_json::to_string(&sealed).unwrap();
    let sealed: SealedBundle = serde_json::from_str(&wire).unwrap();

    let delegate = SessionKeyManager::new(TestClock::new(T0 + 10));
    let options = DecodeOptions::default().with_expected_owner(owner.identifier());
    let bundle = SessionKeyBundle::unseal(&sealed, "hunter2", &options).unwrap();
    let session = delegate.activate(bundle).unwrap();
    assert_eq!(session.lifecycle(), Lifecycle::Active);

    let digest = Digest::keccak256(b"delegated transfer");
    let signature = session.authorize(&digest, Some(&transfer_intent())).unwrap();
    assert!(session.config().verify(&digest, &signature).is_ok());

    let err = session
        .authorize(&digest, Some(&Intent::call(token(), approve())))
        .unwrap_err();
    assert!(err.is_policy_denial());
}

#[test]
fn test_delegate_generated_key_with_state_handoff() {
    let owner = single_owner();
    let manager = SessionKeyManager::new(TestClock::new(T0));

    // Delegate keeps the key, only the address crosses over.
    let key = SessionKeyManager::generate_session_key(SignatureScheme::Ed25519);
    let text = manager
        .approve(&owner, key.signer_id(), session_policies(1))
        .unwrap()
        .to_base64()
        .unwrap();

    let state = AuthorizationState::from_base64(&text, &DecodeOptions::default()).unwrap();
    let session = manager
        .activate(SessionKeyBundle::new(state, key).unwrap())
        .unwrap();
    session
        .authorize(&Digest::keccak256(b"once"), Some(&transfer_intent()))
        .unwrap();
    assert!(matches!(
        session.authorize(&Digest::keccak256(b"twice"), Some(&transfer_intent())),
        Err(Error::Policy(PolicyError::RateLimited { .. }))
    ));
}

#[test]
fn test_multisig_owner_approval_round() {
    let (config, signers) = multisig(100, &[50, 50]);
    let weighted = WeightedMultisigValidator::new(config);
    let aggregator = weighted.aggregator().clone();
    let owner: Validator = weighted.into();
    let manager = SessionKeyManager::new(TestClock::new(T0));

    let key = SessionKeyManager::generate_session_key(SignatureScheme::Secp256k1);
    let policies = session_policies(5);
    aggregator.begin_approval(SessionKeyManager::enable_digest(key.signer_id(), &policies));
    aggregator.approve_with(signers[0].as_ref()).unwrap();

    let err = manager
        .approve(&owner, key.signer_id(), policies.clone())
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Auth(AuthError::InsufficientApprovals {
            approved_weight: 50,
            threshold: 100
        })
    ));

    aggregator.approve_with(signers[1].as_ref()).unwrap();
    let state = manager.approve(&owner, key.signer_id(), policies).unwrap();
    assert_eq!(state.owner_identifier(), Some(owner.identifier()));
    let session = manager
        .activate(SessionKeyBundle::new(state, key).unwrap())
        .unwrap();
    assert_eq!(session.lifecycle(), Lifecycle::Active);
}

#[test]
fn test_activation_observes_registry() {
    let registry = Arc::new(InMemoryRegistry::new());
    let manager = SessionKeyManager::new(TestClock::new(T0)).with_registry(registry.clone());
    let bundle = manager
        .create_session(&single_owner(), SignatureScheme::Secp256k1, session_policies(5))
        .unwrap();
    let session = manager.activate(bundle).unwrap();

    // Never registered on-chain.
    let err = session
        .authorize(&Digest::keccak256(b"unregistered"), Some(&transfer_intent()))
        .unwrap_err();
    assert!(err.is_terminal());
}

#[test]
fn test_wrong_owner_pin_rejected() {
    let manager = SessionKeyManager::new(TestClock::new(T0));
    let bundle = manager
        .create_session(&single_owner(), SignatureScheme::Secp256k1, session_policies(1))
        .unwrap();
    let bytes = bundle.to_bytes().unwrap();

    let options = DecodeOptions::default().with_expected_owner(single_owner().identifier());
    let err = SessionKeyBundle::from_bytes(&bytes, &options).unwrap_err();
    assert!(matches!(
        err,
        Error::State(StateError::OwnerMismatch { .. })
    ));
}

#[test]
fn test_sealed_bundle_tampering() {
    let manager = SessionKeyManager::new(TestClock::new(T0));
    let bundle = manager
        .create_session(&single_owner(), SignatureScheme::Ed25519, session_policies(1))
        .unwrap();
    let mut sealed = bundle.seal("pw", &cheap_seal()).unwrap();
    let last = sealed.ciphertext.len() - 1;
    sealed.ciphertext[last] ^= 0x01;
    let err = SessionKeyBundle::unseal(&sealed, "pw", &DecodeOptions::default()).unwrap_err();
    assert!(matches!(err, Error::State(StateError::UnsealFailed)));
}

#[test]
fn test_unapproved_state_cannot_form_bundle() {
    let key = SessionKeyManager::generate_session_key(SignatureScheme::Secp256k1);
    let state = AuthorizationState::new(vouch::validator::ValidatorConfig::PermissionScoped {
        signer: key.signer_id(),
        policies: session_policies(1),
    });
    let err = SessionKeyBundle::new(state, key).unwrap_err();
    assert!(matches!(
        err,
        Error::State(StateError::MalformedState { .. })
    ));
}

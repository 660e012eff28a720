//! AuthorizationState encoding, decoding and restoration into live validators.

use proptest::prelude::*;
use vouch::{
    Error,
    auth::{Address, AuthError, Digest, PrivateKey, SignatureScheme, Signer},
    multisig::{Approval, ApprovalAggregator, WeightedMultisigConfig, WeightedSignerEntry},
    policy::{
        CallPermission, CallRestriction, CallerRestriction, Condition, GasLimit, PaymasterRule,
        Policy, PolicySet, RateLimit, Selector, TimeWindow, Word,
    },
    state::{AuthorizationState, DecodeOptions, StateError},
    validator::{
        Lifecycle, PermissionScopedValidator, SingleSignerValidator, Validator, ValidatorConfig,
        WeightedMultisigValidator,
    },
};

use crate::helpers::{T0, TestClock, multisig, session_policies, signer, transfer_intent};

// ============================================================================
// Strategies for generating states
// ============================================================================

/// Deterministic key from a non-zero seed; even seeds are Ed25519.
fn seed_key(seed: u8) -> PrivateKey {
    if seed % 2 == 0 {
        PrivateKey::from_bytes(SignatureScheme::Ed25519, &[seed; 32]).unwrap()
    } else {
        let mut bytes = [0u8; 32];
        bytes[31] = seed;
        PrivateKey::from_bytes(SignatureScheme::Secp256k1, &bytes).unwrap()
    }
}

fn address_strategy() -> impl Strategy<Value = Address> {
    any::<[u8; 20]>().prop_map(Address::new)
}

fn word_strategy() -> impl Strategy<Value = Word> {
    any::<[u8; 32]>().prop_map(Word::new)
}

fn condition_strategy() -> impl Strategy<Value = Condition> {
    prop_oneof![
        word_strategy().prop_map(Condition::Equal),
        word_strategy().prop_map(Condition::NotEqual),
        word_strategy().prop_map(Condition::LessThanOrEqual),
        word_strategy().prop_map(Condition::GreaterThan),
        prop::collection::vec(word_strategy(), 1..4).prop_map(Condition::OneOf),
    ]
}

fn permission_strategy() -> impl Strategy<Value = CallPermission> {
    (
        address_strategy(),
        any::<[u8; 4]>(),
        any::<u128>(),
        prop::collection::vec((0u16..4, condition_strategy()), 0..3),
    )
        .prop_map(|(target, selector, value_limit, args)| {
            args.into_iter().fold(
                CallPermission::new(target, Selector::new(selector)).with_value_limit(value_limit),
                |permission, (index, condition)| permission.with_arg(index, condition),
            )
        })
}

fn paymaster_strategy() -> impl Strategy<Value = PaymasterRule> {
    prop_oneof![
        Just(PaymasterRule::Any),
        Just(PaymasterRule::Required),
        Just(PaymasterRule::Forbidden),
        address_strategy().prop_map(PaymasterRule::Exactly),
    ]
}

fn policy_strategy() -> impl Strategy<Value = Policy> {
    prop_oneof![
        prop::collection::vec(permission_strategy(), 1..3)
            .prop_map(|permissions| CallRestriction::new(permissions).into()),
        (
            prop::option::of(any::<u128>()),
            prop::option::of(any::<u128>()),
            paymaster_strategy()
        )
            .prop_map(|(allowance, value_allowance, paymaster)| GasLimit {
                allowance,
                value_allowance,
                paymaster
            }
            .into()),
        (1u32..100, 1u64..100_000, any::<bool>()).prop_map(|(count, interval, sliding)| {
            if sliding {
                RateLimit::sliding(count, interval).into()
            } else {
                RateLimit::new(count, interval).into()
            }
        }),
        (any::<u32>(), any::<u32>()).prop_map(|(after, length)| {
            TimeWindow::new(u64::from(after), u64::from(after) + u64::from(length)).into()
        }),
        prop::collection::vec(address_strategy(), 1..3)
            .prop_map(|allowed| CallerRestriction::new(allowed).into()),
    ]
}

/// Multisig configuration plus the seeds of its members.
fn multisig_strategy() -> impl Strategy<Value = (WeightedMultisigConfig, Vec<u8>)> {
    (
        prop::collection::btree_set(1u8..=255, 1..5),
        prop::collection::vec(1u32..1000, 5),
        any::<u32>(),
    )
        .prop_map(|(seeds, weights, pick)| {
            let seeds: Vec<u8> = seeds.into_iter().collect();
            let entries: Vec<WeightedSignerEntry> = seeds
                .iter()
                .zip(&weights)
                .map(|(seed, weight)| WeightedSignerEntry::new(seed_key(*seed).signer_id(), *weight))
                .collect();
            let total: u64 = entries.iter().map(|e| u64::from(e.weight)).sum();
            let threshold = 1 + (u64::from(pick) % total) as u32;
            (WeightedMultisigConfig::new(threshold, entries).unwrap(), seeds)
        })
}

fn multisig_state_strategy() -> impl Strategy<Value = AuthorizationState> {
    (multisig_strategy(), any::<[u8; 32]>(), any::<u8>()).prop_map(
        |((config, seeds), digest, mask)| {
            let mut state =
                AuthorizationState::new(ValidatorConfig::WeightedMultisig(config.clone()));
            if mask & 0x80 != 0 {
                let digest = Digest::new(digest);
                let aggregator = ApprovalAggregator::new(config);
                aggregator.begin_approval(digest);
                for (i, seed) in seeds.iter().enumerate() {
                    if mask & (1 << i) != 0 {
                        let key = seed_key(*seed);
                        let signature = key.sign_digest(&digest).unwrap();
                        aggregator
                            .submit(Approval::new(key.signer_id(), digest, signature))
                            .unwrap();
                    }
                }
                state = state.with_pending(aggregator.snapshot());
            }
            state
        },
    )
}

fn owner_strategy() -> impl Strategy<Value = ValidatorConfig> {
    prop_oneof![
        address_strategy().prop_map(|signer| ValidatorConfig::SingleSigner { signer }),
        multisig_strategy().prop_map(|(config, _)| ValidatorConfig::WeightedMultisig(config)),
    ]
}

fn scoped_state_strategy() -> impl Strategy<Value = AuthorizationState> {
    (
        address_strategy(),
        prop::collection::vec(policy_strategy(), 1..5),
        prop::option::of((owner_strategy(), prop::option::of(prop::collection::vec(any::<u8>(), 1..96)))),
    )
        .prop_map(|(signer, policies, owner)| {
            let policies = PolicySet::new(policies).unwrap();
            let mut state =
                AuthorizationState::new(ValidatorConfig::PermissionScoped { signer, policies });
            if let Some((owner, signature)) = owner {
                state = state.with_owner(owner);
                if let Some(signature) = signature {
                    state = state.with_enable_signature(signature);
                }
            }
            state
        })
}

fn state_strategy() -> impl Strategy<Value = AuthorizationState> {
    prop_oneof![
        address_strategy()
            .prop_map(|signer| AuthorizationState::new(ValidatorConfig::SingleSigner { signer })),
        multisig_state_strategy(),
        scoped_state_strategy(),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Serialized states decode to an equal state with the same identifier.
    #[test]
    fn prop_state_roundtrip(state in state_strategy()) {
        let bytes = state.serialize().unwrap();
        let decoded = AuthorizationState::deserialize(&bytes, &DecodeOptions::default()).unwrap();
        prop_assert_eq!(&decoded, &state);
        prop_assert_eq!(decoded.identifier(), state.identifier());
        prop_assert_eq!(decoded.serialize().unwrap(), bytes);
    }
}

// ============================================================================
// Restoration
// ============================================================================

#[test]
fn test_multisig_round_survives_restart() {
    let (config, signers) = multisig(2, &[1, 1, 1]);
    let digest = Digest::keccak256(b"slow approvals");
    let first: Validator = WeightedMultisigValidator::new(config).into();
    let Validator::WeightedMultisig(weighted) = &first else {
        unreachable!()
    };
    weighted.aggregator().begin_approval(digest);
    weighted.aggregator().approve_with(signers[0].as_ref()).unwrap();

    let text = AuthorizationState::capture(&first).to_base64().unwrap();
    let state = AuthorizationState::from_base64(&text, &DecodeOptions::default()).unwrap();
    assert_eq!(state.pending.as_ref().map(|p| p.len()), Some(1));

    let restored = state
        .to_validator(None, TestClock::new(T0), None)
        .unwrap();
    let Validator::WeightedMultisig(weighted) = &restored else {
        panic!("expected a weighted multisig");
    };
    weighted.aggregator().approve_with(signers[1].as_ref()).unwrap();
    let signature = restored.authorize(&digest, None).unwrap();
    assert!(first.verify(&digest, &signature));
}

#[test]
fn test_forged_pending_approval_rejected() {
    let (config, signers) = multisig(2, &[1, 1]);
    let validator: Validator = WeightedMultisigValidator::new(config).into();
    let Validator::WeightedMultisig(weighted) = &validator else {
        unreachable!()
    };
    let digest = Digest::keccak256(b"forged");
    weighted.aggregator().begin_approval(digest);
    weighted.aggregator().approve_with(signers[0].as_ref()).unwrap();

    let bytes = AuthorizationState::capture(&validator).serialize().unwrap();
    let mut body: serde_json::Value = serde_json::from_slice(&bytes[4..]).unwrap();
    body["pending"]["approvals"][0]["signer"] =
        serde_json::json!(signers[1].signer_id().to_string());
    let mut forged = bytes[..4].to_vec();
    forged.extend(serde_json::to_vec(&body).unwrap());

    let err = AuthorizationState::deserialize(&forged, &DecodeOptions::default()).unwrap_err();
    assert!(matches!(err, Error::State(StateError::MalformedState { .. })));
}

#[test]
fn test_single_signer_restores_without_key() {
    let key = signer();
    let state = AuthorizationState::new(ValidatorConfig::SingleSigner {
        signer: key.signer_id(),
    });
    let digest = Digest::keccak256(b"verify only");
    let signature = key.sign_digest(&digest).unwrap();

    let restored = state.to_validator(None, TestClock::new(T0), None).unwrap();
    assert!(restored.verify(&digest, &signature));
    assert!(matches!(
        restored.authorize(&digest, None),
        Err(Error::Auth(AuthError::SigningUnavailable { .. }))
    ));

    let err = state
        .to_validator(Some(signer()), TestClock::new(T0), None)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Auth(AuthError::SessionKeyMismatch { .. })
    ));
}

#[test]
fn test_permission_scoped_restores_active() {
    let owner: Validator = SingleSignerValidator::new(signer()).into();
    let session_key = signer();
    let session =
        PermissionScopedValidator::new(session_key.clone(), session_policies(2), TestClock::new(T0))
            .unwrap();
    session.bind_owner(owner.config()).unwrap();
    session
        .attach_enable_signature(owner.authorize(&session.enable_digest(), None).unwrap())
        .unwrap();
    let session: Validator = session.into();

    let bytes = AuthorizationState::capture(&session).serialize().unwrap();
    let options = DecodeOptions::default().with_expected_owner(owner.identifier());
    let state = AuthorizationState::deserialize(&bytes, &options).unwrap();

    let restored = state
        .to_validator(Some(session_key.clone()), TestClock::new(T0), None)
        .unwrap();
    let Validator::PermissionScoped(scoped) = &restored else {
        panic!("expected a permission-scoped validator");
    };
    assert_eq!(scoped.lifecycle(), Lifecycle::Active);
    assert_eq!(restored.identifier(), session.identifier());
    let digest = Digest::keccak256(b"restored");
    assert!(restored.authorize(&digest, Some(&transfer_intent())).is_ok());

    // Without the enable signature the owner is bound but approval is still due.
    let mut unapproved = state.clone();
    unapproved.enable_signature = None;
    let restored = unapproved
        .to_validator(Some(session_key), TestClock::new(T0), None)
        .unwrap();
    let Validator::PermissionScoped(scoped) = &restored else {
        panic!("expected a permission-scoped validator");
    };
    assert_eq!(scoped.lifecycle(), Lifecycle::AwaitingEnableApproval);

    // Someone else's key cannot stand in for the session key.
    let err = state
        .to_validator(Some(signer()), TestClock::new(T0), None)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Auth(AuthError::SessionKeyMismatch { .. })
    ));
}

#[test]
fn test_schema_version_option() {
    let state = AuthorizationState::new(ValidatorConfig::SingleSigner {
        signer: signer().signer_id(),
    });
    let bytes = state.serialize().unwrap();
    let options = DecodeOptions {
        schema_version: 7,
        ..DecodeOptions::default()
    };
    let err = AuthorizationState::deserialize(&bytes, &options).unwrap_err();
    assert!(matches!(
        err,
        Error::State(StateError::SchemaVersionMismatch {
            expected: 7,
            found: 1
        })
    ));
}

#[test]
fn test_decode_options_from_json() {
    let options: DecodeOptions = serde_json::from_str("{}").unwrap();
    assert_eq!(options, DecodeOptions::default());
}

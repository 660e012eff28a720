//! Weighted multisig thresholds and approval aggregation.

use std::sync::Arc;
use std::thread;

use vouch::{
    Error,
    auth::{AuthError, Digest, Signer, SignerId},
    multisig::{
        Approval, ApprovalAggregator, WeightedMultisigConfig, WeightedSignerEntry,
        decode_signatures,
    },
};

use crate::helpers::{ed25519_signer, multisig, signer};

#[test]
fn test_threshold_edges_for_even_split() {
    let (config, _) = multisig(100, &[50, 50]);
    assert_eq!(config.total_weight(), 100);

    let (config, _) = multisig(50, &[50, 50]);
    assert_eq!(config.threshold(), 50);

    let a = signer();
    let b = signer();
    let err = WeightedMultisigConfig::new(
        101,
        [
            WeightedSignerEntry::new(a.signer_id(), 50),
            WeightedSignerEntry::new(b.signer_id(), 50),
        ],
    )
    .unwrap_err();
    assert!(err.is_configuration_error());
}

#[test]
fn test_one_of_two_meets_half_threshold() {
    let (config, signers) = multisig(50, &[50, 50]);
    let aggregator = ApprovalAggregator::new(config);
    let digest = Digest::keccak256(b"half");
    aggregator.begin_approval(digest);
    aggregator.approve_with(signers[1].as_ref()).unwrap();
    assert!(aggregator.is_satisfied());
    let encoded = aggregator.encode().unwrap();
    assert_eq!(aggregator.config().verify(&digest, &encoded).unwrap(), 50);
}

#[test]
fn test_end_to_end_full_threshold() {
    let (config, signers) = multisig(100, &[50, 50]);
    let aggregator = ApprovalAggregator::new(config);
    let digest = Digest::keccak256(b"transfer 1 eth");
    aggregator.begin_approval(digest);

    aggregator.approve_with(signers[0].as_ref()).unwrap();
    assert_eq!(aggregator.approved_weight(), 50);
    assert!(matches!(
        aggregator.encode(),
        Err(AuthError::Unsatisfied {
            approved_weight: 50,
            threshold: 100
        })
    ));

    let outsider = signer();
    let err = aggregator
        .submit(Approval::sign(outsider.as_ref(), digest).unwrap())
        .unwrap_err();
    assert_eq!(
        err,
        AuthError::UnknownSigner {
            signer: outsider.signer_id()
        }
    );
    assert_eq!(aggregator.approved_weight(), 50);

    aggregator.approve_with(signers[1].as_ref()).unwrap();
    let encoded = aggregator.finalize().unwrap();
    assert_eq!(aggregator.config().verify(&digest, &encoded).unwrap(), 100);
    assert_eq!(aggregator.pending_digest(), None);
}

#[test]
fn test_encoding_independent_of_submission_order() {
    let (config, signers) = multisig(3, &[1, 1, 1]);
    let digest = Digest::keccak256(b"order");
    let approvals: Vec<Approval> = signers
        .iter()
        .map(|s| Approval::sign(s.as_ref(), digest).unwrap())
        .collect();

    let forward = ApprovalAggregator::new(config.clone());
    forward.begin_approval(digest);
    for approval in &approvals {
        forward.submit(approval.clone()).unwrap();
    }

    let backward = ApprovalAggregator::new(config);
    backward.begin_approval(digest);
    for approval in approvals.iter().rev() {
        backward.submit(approval.clone()).unwrap();
    }

    let encoded = forward.encode().unwrap();
    assert_eq!(encoded, backward.encode().unwrap());
    // Repeated encoding is stable and does not close the round.
    assert_eq!(encoded, forward.encode().unwrap());

    let order: Vec<SignerId> = decode_signatures(&encoded)
        .unwrap()
        .into_iter()
        .map(|(signer, _)| signer)
        .collect();
    let mut sorted = order.clone();
    sorted.sort();
    assert_eq!(order, sorted);
}

#[test]
fn test_approval_for_other_digest_rejected() {
    let (config, signers) = multisig(1, &[1]);
    let aggregator = ApprovalAggregator::new(config);

    let stray = Approval::sign(signers[0].as_ref(), Digest::keccak256(b"stray")).unwrap();
    assert!(matches!(
        aggregator.submit(stray.clone()),
        Err(AuthError::DigestMismatch { expected: None, .. })
    ));

    let digest = Digest::keccak256(b"current");
    aggregator.begin_approval(digest);
    let err = aggregator.submit(stray).unwrap_err();
    assert!(err.is_digest_mismatch());
    assert_eq!(aggregator.approved_weight(), 0);
}

#[test]
fn test_forged_signature_rejected() {
    let (config, signers) = multisig(1, &[1, 1]);
    let aggregator = ApprovalAggregator::new(config);
    let digest = Digest::keccak256(b"forged");
    aggregator.begin_approval(digest);

    // Signed by one member, claimed by another.
    let mut approval = Approval::sign(signers[0].as_ref(), digest).unwrap();
    approval.signer = signers[1].signer_id();
    let err = aggregator.submit(approval).unwrap_err();
    assert!(err.is_invalid_signature());
    assert!(aggregator.approvers().is_empty());
}

#[test]
fn test_new_round_discards_approvals() {
    let (config, signers) = multisig(2, &[1, 1]);
    let aggregator = ApprovalAggregator::new(config);
    aggregator.begin_approval(Digest::keccak256(b"first"));
    aggregator.approve_with(signers[0].as_ref()).unwrap();

    let second = Digest::keccak256(b"second");
    aggregator.begin_approval(second);
    assert_eq!(aggregator.approved_weight(), 0);
    assert_eq!(aggregator.pending_digest(), Some(second));
}

#[test]
fn test_resubmission_counts_once() {
    let (config, signers) = multisig(2, &[1, 1]);
    let aggregator = ApprovalAggregator::new(config);
    aggregator.begin_approval(Digest::keccak256(b"twice"));
    aggregator.approve_with(signers[0].as_ref()).unwrap();
    aggregator.approve_with(signers[0].as_ref()).unwrap();
    assert_eq!(aggregator.approved_weight(), 1);
    assert_eq!(aggregator.approvers(), vec![signers[0].signer_id()]);
}

#[test]
fn test_mixed_schemes() {
    let secp = signer();
    let ed = ed25519_signer();
    let config = WeightedMultisigConfig::new(
        3,
        [
            WeightedSignerEntry::new(secp.signer_id(), 1),
            WeightedSignerEntry::new(ed.signer_id(), 2),
        ],
    )
    .unwrap();
    let aggregator = ApprovalAggregator::new(config);
    let digest = Digest::keccak256(b"mixed");
    aggregator.begin_approval(digest);
    aggregator.approve_with(ed.as_ref()).unwrap();
    aggregator.approve_with(secp.as_ref()).unwrap();
    let encoded = aggregator.encode().unwrap();
    assert_eq!(aggregator.config().verify(&digest, &encoded).unwrap(), 3);
}

#[test]
fn test_tampered_bundle_rejected() {
    let (config, signers) = multisig(2, &[1, 1]);
    let aggregator = ApprovalAggregator::new(config.clone());
    let digest = Digest::keccak256(b"tamper");
    aggregator.begin_approval(digest);
    for s in &signers {
        aggregator.approve_with(s.as_ref()).unwrap();
    }
    let encoded = aggregator.encode().unwrap();

    let mut flipped = encoded.clone();
    let last = flipped.len() - 2;
    flipped[last] ^= 0xff;
    assert!(config.verify(&digest, &flipped).is_err());

    let truncated = &encoded[..encoded.len() - 1];
    assert!(matches!(
        config.verify(&digest, truncated),
        Err(AuthError::MalformedSignature { .. })
    ));

    // The same entry twice must not double its weight.
    let entries = decode_signatures(&encoded).unwrap();
    let (first, sig) = entries[0];
    let mut doubled = Vec::new();
    for _ in 0..2 {
        doubled.extend_from_slice(first.as_bytes());
        doubled.extend_from_slice(&(sig.len() as u16).to_be_bytes());
        doubled.extend_from_slice(sig);
    }
    assert!(matches!(
        config.verify(&digest, &doubled),
        Err(AuthError::MalformedSignature { .. })
    ));

    assert!(matches!(
        config.verify(&Digest::keccak256(b"other"), &encoded),
        Err(AuthError::InvalidSignature { .. })
    ));
}

#[test]
fn test_concurrent_submissions() {
    let weights = [1u32; 8];
    let (config, signers) = multisig(8, &weights);
    let aggregator = Arc::new(ApprovalAggregator::new(config));
    let digest = Digest::keccak256(b"concurrent");
    aggregator.begin_approval(digest);

    let handles: Vec<_> = signers
        .iter()
        .cloned()
        .map(|s| {
            let aggregator = Arc::clone(&aggregator);
            thread::spawn(move || aggregator.approve_with(s.as_ref()))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    assert_eq!(aggregator.approved_weight(), 8);
    let encoded = aggregator.encode().unwrap();
    assert!(aggregator.config().verify(&digest, &encoded).is_ok());
}

#[test]
fn test_no_round_error_converts() {
    let (config, signers) = multisig(1, &[1]);
    let aggregator = ApprovalAggregator::new(config);
    let err: Error = aggregator
        .approve_with(signers[0].as_ref())
        .unwrap_err()
        .into();
    assert!(matches!(err, Error::Auth(AuthError::NoOpenRound)));
    assert!(err.is_authentication_error());
}

#[test]
fn test_truncated_approval_is_invalid_signature() {
    let (config, signers) = multisig(1, &[1]);
    let aggregator = ApprovalAggregator::new(config);
    let digest = Digest::keccak256(b"truncated");
    aggregator.begin_approval(digest);

    let mut approval = Approval::sign(signers[0].as_ref(), digest).unwrap();
    approval.signature.truncate(64);
    let err = aggregator.submit(approval).unwrap_err();
    assert!(matches!(err, AuthError::InvalidSignature { signer } if signer == signers[0].signer_id()));
    assert_eq!(aggregator.approved_weight(), 0);
}

#[test]
fn test_round_switches_never_merge_stale_approvals() {
    let (config, signers) = multisig(4, &[1, 1, 1, 1]);
    let aggregator = Arc::new(ApprovalAggregator::new(config));
    let digests: Vec<Digest> = (0..8u8).map(|i| Digest::keccak256([i])).collect();
    aggregator.begin_approval(digests[0]);

    let switcher = {
        let aggregator = Arc::clone(&aggregator);
        let digests = digests.clone();
        thread::spawn(move || {
            for digest in digests.iter().cycle().take(200) {
                aggregator.begin_approval(*digest);
                thread::yield_now();
            }
        })
    };
    let submitters: Vec<_> = signers
        .iter()
        .cloned()
        .enumerate()
        .map(|(offset, s)| {
            let aggregator = Arc::clone(&aggregator);
            let digests = digests.clone();
            thread::spawn(move || {
                // Signed up front, so most are stale by the time they arrive.
                let approvals: Vec<Approval> = digests
                    .iter()
                    .map(|d| Approval::sign(s.as_ref(), *d).unwrap())
                    .collect();
                for approval in approvals.iter().cycle().skip(offset).take(200) {
                    if let Err(err) = aggregator.submit(approval.clone()) {
                        assert!(err.is_digest_mismatch(), "unexpected error: {err}");
                    }
                }
            })
        })
        .collect();
    switcher.join().unwrap();
    for handle in submitters {
        handle.join().unwrap();
    }

    let pending = aggregator.snapshot();
    let digest = pending.digest().unwrap();
    assert!(pending.approvals().all(|a| a.digest == digest));
    assert_eq!(aggregator.approved_weight(), pending.len() as u64);

    let stale = digests.iter().copied().find(|d| *d != digest).unwrap();
    let err = aggregator
        .submit(Approval::sign(signers[0].as_ref(), stale).unwrap())
        .unwrap_err();
    assert!(err.is_digest_mismatch());
    assert_eq!(aggregator.approved_weight(), pending.len() as u64);
}

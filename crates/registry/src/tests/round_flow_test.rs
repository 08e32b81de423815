//! Round flow integration tests
//!
//! Tests the complete registry flow including:
//! - Consent gate and round configuration reads
//! - Commit/reveal intake under the participant cap
//! - Committee voting and deterministic finalization
//! - Journal replay reconstructing identical state

use std::sync::Arc;

use crate::error::RegistryError;
use crate::persistence::EventStore;
use crate::registry::Registry;
use crate::types::{ClientId, Digest, MemberId, PatientId, TaskId};

/// Helper to build a registry with a bootstrapped committee.
fn setup_registry(members: usize) -> (Registry, Vec<MemberId>) {
    let registry = Registry::new();
    let committee: Vec<MemberId> = (0..members).map(|_| MemberId::new_unique()).collect();
    registry.bootstrap_committee(&committee).unwrap();
    (registry, committee)
}

/// Test 1: the end-to-end round scenario.
///
/// Open a round with cap 2, take two commits and reject the third, reveal
/// both, close, collect member votes X/X plus a rejected outsider vote for
/// Y, and finalize to X.
#[test]
fn test_end_to_end_round_flow() {
    let (registry, committee) = setup_registry(2);
    let admin = committee[0];
    let task = TaskId::from_seed(b"tumor-segmentation");

    let round = registry.open_round(&admin, task, 10.0, 1.0, 2).unwrap();
    assert_eq!(round, 1);

    let client_a = ClientId::new_unique();
    let client_b = ClientId::new_unique();
    let client_c = ClientId::new_unique();
    let h1 = Digest::of(b"masked-update-a");
    let h2 = Digest::of(b"masked-update-b");
    let h3 = Digest::of(b"masked-update-c");

    registry.submit_commit(task, round, client_a, h1).unwrap();
    registry.submit_commit(task, round, client_b, h2).unwrap();
    assert_eq!(
        registry.submit_commit(task, round, client_c, h3),
        Err(RegistryError::CapacityExceeded)
    );

    registry
        .submit_reveal(task, round, client_a, h1, Digest::of(b"reveal-a"))
        .unwrap();
    registry
        .submit_reveal(task, round, client_b, h2, Digest::of(b"reveal-b"))
        .unwrap();

    let participants = registry.list_participants(task, round);
    assert_eq!(participants.len(), 2);
    assert!(participants.iter().all(|p| p.revealed));

    registry.close_round(&admin, task, round).unwrap();

    let x = Digest::of(b"aggregated-model-x");
    let y = Digest::of(b"aggregated-model-y");
    registry.vote_finalize(&committee[0], task, round, x).unwrap();
    registry.vote_finalize(&committee[1], task, round, x).unwrap();
    assert_eq!(
        registry.vote_finalize(&MemberId::new_unique(), task, round, y),
        Err(RegistryError::Unauthorized)
    );

    assert_eq!(registry.finalize_model(task, round), Ok(x));
    assert_eq!(registry.aggregate_result(task, round), Ok(Some(x)));

    let stored = registry.get_round(task, round).unwrap();
    assert!(stored.closed);
    assert!(stored.end_at > 0);
    assert_eq!(stored.model_hash, x);
}

/// Test 2: round indices stay contiguous per task, across tasks.
#[test]
fn test_round_indices_contiguous_across_tasks() {
    let (registry, committee) = setup_registry(1);
    let admin = committee[0];
    let imaging = TaskId::from_seed(b"imaging");
    let genomics = TaskId::from_seed(b"genomics");

    for expected in 1..=4 {
        assert_eq!(
            registry.open_round(&admin, imaging, 1.0, 1e-5, 8),
            Ok(expected)
        );
    }
    assert_eq!(registry.open_round(&admin, genomics, 1.0, 1e-5, 8), Ok(1));

    assert_eq!(registry.latest_round_index(&imaging), 4);
    assert_eq!(registry.latest_round_index(&genomics), 1);
    for index in 1..=4 {
        assert!(registry.get_round(imaging, index).is_some());
    }
    assert!(registry.get_round(imaging, 5).is_none());
}

/// Test 3: commit-then-reveal succeeds exactly once per pair.
#[test]
fn test_reveal_exactly_once_at_registry_level() {
    let (registry, committee) = setup_registry(1);
    let task = TaskId::new_unique();
    let client = ClientId::new_unique();
    let commit = Digest::of(b"masked");
    let reveal = Digest::of(b"unmasked-metadata");

    registry.open_round(&committee[0], task, 1.0, 1e-5, 4).unwrap();
    registry.submit_commit(task, 1, client, commit).unwrap();

    registry.submit_reveal(task, 1, client, commit, reveal).unwrap();
    assert_eq!(
        registry.submit_reveal(task, 1, client, commit, reveal),
        Err(RegistryError::NoMatchingCommit)
    );
}

/// Test 4: tie votes finalize to the first-encountered hash.
#[test]
fn test_tie_finalizes_to_first_vote() {
    let (registry, committee) = setup_registry(2);
    let task = TaskId::new_unique();
    let a = Digest::of(b"model-a");
    let b = Digest::of(b"model-b");

    registry.open_round(&committee[0], task, 1.0, 1e-5, 4).unwrap();
    registry.close_round(&committee[0], task, 1).unwrap();

    registry.vote_finalize(&committee[0], task, 1, a).unwrap();
    registry.vote_finalize(&committee[1], task, 1, b).unwrap();

    assert_eq!(registry.finalize_model(task, 1), Ok(a));
}

/// Test 5: a journaled registry replays into identical state.
#[test]
fn test_journal_replay_reconstructs_state() {
    let dir = tempfile::tempdir().unwrap();
    let patient = PatientId::new_unique();
    let task = TaskId::from_seed(b"sepsis-prediction");
    let client = ClientId::new_unique();
    let commit = Digest::of(b"masked");
    let model = Digest::of(b"aggregated-model");
    let member;

    {
        let journal = Arc::new(EventStore::open(dir.path()).unwrap());
        let registry = Registry::with_journal(journal.clone());
        member = MemberId::new_unique();
        registry.bootstrap_committee(&[member]).unwrap();

        registry.grant_consent(patient, task, "vitals");
        registry.open_round(&member, task, 10.0, 1e-6, 4).unwrap();
        registry.submit_commit(task, 1, client, commit).unwrap();
        registry
            .submit_reveal(task, 1, client, commit, Digest::of(b"reveal"))
            .unwrap();
        registry.close_round(&member, task, 1).unwrap();
        registry.vote_finalize(&member, task, 1, model).unwrap();
        registry.finalize_model(task, 1).unwrap();

        journal.flush().unwrap();
    }

    let journal = Arc::new(EventStore::open(dir.path()).unwrap());
    let restored = Registry::with_journal(journal);
    let replayed = restored.replay_journal().unwrap();
    assert_eq!(replayed, 8);

    assert!(restored.is_member(&member));
    assert!(restored.is_allowed(&patient, &task));

    let round = restored.get_round(task, 1).unwrap();
    assert!(round.closed);
    assert_eq!(round.max_participants, 4);
    assert_eq!(round.model_hash, model);

    let participants = restored.list_participants(task, 1);
    assert_eq!(participants.len(), 1);
    assert!(participants[0].revealed);
    assert_eq!(participants[0].client_id, client);

    assert_eq!(restored.aggregate_result(task, 1), Ok(Some(model)));
}

/// Test 6: replayed timestamps come from the journal, not the clock.
#[test]
fn test_replay_preserves_timestamps() {
    let dir = tempfile::tempdir().unwrap();
    let task = TaskId::new_unique();
    let opened_at;

    {
        let journal = Arc::new(EventStore::open(dir.path()).unwrap());
        let registry = Registry::with_journal(journal.clone());
        let member = MemberId::new_unique();
        registry.bootstrap_committee(&[member]).unwrap();
        registry.open_round(&member, task, 1.0, 1e-5, 4).unwrap();
        opened_at = registry.get_round(task, 1).unwrap().start_at;
        journal.flush().unwrap();
    }

    let journal = Arc::new(EventStore::open(dir.path()).unwrap());
    let restored = Registry::with_journal(journal);
    restored.replay_journal().unwrap();

    assert_eq!(restored.get_round(task, 1).unwrap().start_at, opened_at);
}

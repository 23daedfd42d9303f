//! # Three-Ballot Election Scenario
//!
//! End-to-end runs of the commitment pipeline over one small cycle:
//!
//! | Voter | Position | Selections |
//! |-------|----------|------------|
//! | V1    | P1       | C2         |
//! | V2    | P1       | C1         |
//! | V3    | P2       | C3, C1     |
//!
//! Covers root determinism, proof export and verification, idempotent reruns,
//! persistence failure after the root is anchored, ledger outages, and a run
//! cancelled while waiting for confirmation.

use std::time::Duration;

use vcom_commit::{
    CommitConfig, CommitError, CommitmentPipeline, CycleTree, JournalEvent, PublishOutcome,
    RootPublisher, SubmissionJournal, VerifyError,
};
use vcom_core::{encode, hash_leaf, leaf_hash, BallotRecord, CycleId, LeafSchema, VoterId};
use vcom_crypto::{node_hash, verify};
use vcom_ledger::MockLedger;
use vcom_store::{MemoryVoteStore, VoteStore};

fn cycle() -> CycleId {
    CycleId::new("2024")
}

fn ballots() -> Vec<BallotRecord> {
    vec![
        BallotRecord::new("V1", ["C2"], "P1", "2024"),
        BallotRecord::new("V2", ["C1"], "P1", "2024"),
        BallotRecord::new("V3", ["C3", "C1"], "P2", "2024"),
    ]
}

async fn closed_store() -> MemoryVoteStore {
    let store = MemoryVoteStore::new();
    store.cast_all(ballots()).expect("cast");
    store.close_cycle(&cycle()).await.expect("close");
    store
}

fn pipeline(
    store: MemoryVoteStore,
    ledger: MockLedger,
) -> CommitmentPipeline<MemoryVoteStore, MockLedger> {
    let config = CommitConfig {
        poll_interval_ms: 500,
        confirm_timeout_secs: 60,
        backoff_base_ms: 100,
        ..CommitConfig::default()
    };
    CommitmentPipeline::new(store, ledger, SubmissionJournal::in_memory(), config)
}

#[test]
fn root_matches_hand_built_tree() {
    let mut leaves: Vec<_> = ballots()
        .iter()
        .map(|b| leaf_hash(b, LeafSchema::BallotV1).expect("leaf"))
        .collect();
    leaves.sort();
    let expected = node_hash(&node_hash(&leaves[0], &leaves[1]), &leaves[2]);

    let tree = CycleTree::build(&cycle(), ballots(), LeafSchema::BallotV1).expect("tree");
    assert_eq!(tree.root(), expected);
    assert_eq!(tree.leaf_count(), 3);
}

#[test]
fn root_ignores_ballot_and_selection_order() {
    let reference = CycleTree::build(&cycle(), ballots(), LeafSchema::BallotV1)
        .expect("tree")
        .root();

    let mut reordered = ballots();
    reordered.reverse();
    reordered[0] = BallotRecord::new("V3", ["C1", "C3"], "P2", "2024");
    let permuted = CycleTree::build(&cycle(), reordered, LeafSchema::BallotV1).expect("tree");
    assert_eq!(permuted.root(), reference);
}

#[test]
fn any_ballot_change_changes_root() {
    let reference = CycleTree::build(&cycle(), ballots(), LeafSchema::BallotV1)
        .expect("tree")
        .root();
    let mut changed = ballots();
    changed[1] = BallotRecord::new("V2", ["C2"], "P1", "2024");
    let altered = CycleTree::build(&cycle(), changed, LeafSchema::BallotV1).expect("tree");
    assert_ne!(altered.root(), reference);
}

#[test]
fn altered_ballot_fails_against_original_proof() {
    let tree = CycleTree::build(&cycle(), ballots(), LeafSchema::BallotV1).expect("tree");
    let v2 = leaf_hash(&ballots()[1], LeafSchema::BallotV1).expect("leaf");
    let proof = tree.tree.prove_leaf(&v2).expect("proof");
    assert!(verify(&v2, &proof, &tree.root()));

    let altered = BallotRecord::new("V2", ["C2"], "P1", "2024");
    let altered_leaf = leaf_hash(&altered, LeafSchema::BallotV1).expect("leaf");
    assert!(!verify(&altered_leaf, &proof, &tree.root()));
}

#[tokio::test(start_paused = true)]
async fn altered_bundle_fails_at_the_path() {
    let pipeline = pipeline(closed_store().await, MockLedger::new("mock"));
    pipeline.run_cycle(&cycle()).await.expect("commit");
    let mut bundle = pipeline
        .export_proof(&cycle(), &VoterId::new("V2"), None)
        .await
        .expect("export")
        .remove(0);

    let altered = encode(
        &BallotRecord::new("V2", ["C2"], "P1", "2024"),
        LeafSchema::BallotV1,
    )
    .expect("encode");
    bundle.canonical = String::from_utf8(altered.as_bytes().to_vec()).expect("utf-8");
    bundle.leaf = hash_leaf(&altered);
    assert_eq!(bundle.verify(), Err(VerifyError::RootMismatch(bundle.root)));
}

#[test]
fn selection_schema_keeps_identical_ballots() {
    let twins = vec![
        BallotRecord::new("V1", ["C1"], "P1", "2024"),
        BallotRecord::new("V2", ["C1"], "P1", "2024"),
    ];
    let tree = CycleTree::build(&cycle(), twins, LeafSchema::SelectionV1).expect("tree");
    assert_eq!(tree.leaves[0], tree.leaves[1]);
    assert_eq!(tree.leaf_count(), 2);
    assert_eq!(tree.root(), node_hash(&tree.leaves[0], &tree.leaves[1]));
}

#[tokio::test(start_paused = true)]
async fn every_voter_can_prove_inclusion() {
    let pipeline = pipeline(closed_store().await, MockLedger::new("mock"));
    let outcome = pipeline.run_cycle(&cycle()).await.expect("commit");

    for voter in ["V1", "V2", "V3"] {
        let bundles = pipeline
            .export_proof(&cycle(), &VoterId::new(voter), None)
            .await
            .expect("export");
        assert_eq!(bundles.len(), 1);
        let bundle = &bundles[0];
        assert_eq!(bundle.root, outcome.record.root);
        assert_eq!(bundle.tx_ref, outcome.record.tx_ref);
        bundle.verify().expect("bundle verifies");

        let json = serde_json::to_string(bundle).expect("serialize");
        let back: vcom_commit::ProofBundle = serde_json::from_str(&json).expect("parse");
        back.verify().expect("round-tripped bundle verifies");
    }
}

#[tokio::test(start_paused = true)]
async fn rerun_anchors_exactly_once() {
    let pipeline = pipeline(closed_store().await, MockLedger::new("mock"));
    let first = pipeline.run_cycle(&cycle()).await.expect("first run");
    let second = pipeline.run_cycle(&cycle()).await.expect("second run");

    assert_eq!(first.publication.outcome, PublishOutcome::Submitted);
    assert!(matches!(
        second.publication.outcome,
        PublishOutcome::AlreadyRecorded(_)
    ));
    assert_eq!(first.record, second.record);
    assert_eq!(pipeline.ledger().submit_calls(), 1);
    assert_eq!(pipeline.ledger().transaction_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn publishing_the_same_root_twice_uses_one_transaction() {
    let store = closed_store().await;
    let ledger = MockLedger::new("mock");
    let journal = SubmissionJournal::in_memory();
    let config = CommitConfig {
        poll_interval_ms: 500,
        ..CommitConfig::default()
    };
    let root = CycleTree::build(&cycle(), ballots(), LeafSchema::BallotV1)
        .expect("tree")
        .root();

    let publisher = RootPublisher::new(&store, &ledger, &journal, &config);
    let first = publisher.publish(root, &cycle()).await.expect("first publish");
    let second = publisher.publish(root, &cycle()).await.expect("second publish");
    assert_eq!(first.outcome, PublishOutcome::Submitted);
    assert_eq!(second.outcome, PublishOutcome::ResumedFromJournal);
    assert_eq!(first.tx_ref, second.tx_ref);

    let fresh_journal = SubmissionJournal::in_memory();
    let third = RootPublisher::new(&store, &ledger, &fresh_journal, &config)
        .publish(root, &cycle())
        .await
        .expect("publish with a fresh journal");
    assert_eq!(third.outcome, PublishOutcome::ReusedLedgerEntry);
    assert_eq!(third.tx_ref, first.tx_ref);

    assert_eq!(ledger.submit_calls(), 1);
    assert_eq!(ledger.transaction_count(), 1);
    assert!(store.commitment(&cycle()).await.expect("read").is_none());
}

#[tokio::test(start_paused = true)]
async fn persistence_failure_is_repaired_without_republishing() {
    let store = closed_store().await;
    let pipeline = pipeline(store.clone(), MockLedger::new("mock"));

    store.set_fail_inserts(true);
    let err = pipeline.run_cycle(&cycle()).await.unwrap_err();
    let anchored_tx = match &err {
        CommitError::PersistenceFailedAfterPublish { tx_ref, .. } => tx_ref.clone(),
        other => panic!("expected PersistenceFailedAfterPublish, got {other:?}"),
    };
    assert!(!err.is_retryable());
    assert_eq!(pipeline.ledger().transaction_count(), 1);
    assert!(pipeline
        .journal()
        .entries(&cycle())
        .iter()
        .any(|e| matches!(e.event, JournalEvent::PersistenceFailed { .. })));

    store.set_fail_inserts(false);
    let outcome = pipeline.run_cycle(&cycle()).await.expect("repair run");
    assert_eq!(outcome.publication.outcome, PublishOutcome::ResumedFromJournal);
    assert_eq!(outcome.record.tx_ref, anchored_tx);
    assert_eq!(pipeline.ledger().submit_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn ledger_outage_is_retryable() {
    let pipeline = pipeline(closed_store().await, MockLedger::new("mock"));

    pipeline.ledger().set_unavailable(true);
    let err = pipeline.run_cycle(&cycle()).await.unwrap_err();
    assert!(err.is_retryable(), "{err}");
    assert_eq!(
        pipeline.store().commitment(&cycle()).await.expect("read"),
        None
    );

    pipeline.ledger().set_unavailable(false);
    let outcome = pipeline.run_cycle(&cycle()).await.expect("rerun");
    assert_eq!(outcome.publication.outcome, PublishOutcome::Submitted);
    assert_eq!(pipeline.ledger().transaction_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancelled_run_resumes_the_same_transaction() {
    let pipeline = pipeline(
        closed_store().await,
        MockLedger::new("mock").with_pending_polls(10),
    );

    let cancelled = tokio::time::timeout(Duration::from_secs(2), pipeline.run_cycle(&cycle())).await;
    assert!(cancelled.is_err(), "run should still be awaiting confirmation");
    let open = pipeline
        .journal()
        .open_submission(&cycle())
        .expect("journaled submission");

    let outcome = pipeline.run_cycle(&cycle()).await.expect("resumed run");
    assert_eq!(outcome.publication.outcome, PublishOutcome::ResumedFromJournal);
    assert_eq!(outcome.record.tx_ref, open.tx_ref);
    assert_eq!(pipeline.ledger().submit_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn malformed_ballot_blocks_the_cycle() {
    let store = MemoryVoteStore::new();
    let mut snapshot = ballots();
    snapshot.push(BallotRecord::new("", ["C1"], "P1", "2024"));
    store.cast_all(snapshot).expect("cast");
    store.close_cycle(&cycle()).await.expect("close");
    let pipeline = pipeline(store, MockLedger::new("mock"));

    match pipeline.run_cycle(&cycle()).await {
        Err(CommitError::MalformedRecord { index, .. }) => assert_eq!(index, 3),
        other => panic!("expected MalformedRecord, got {other:?}"),
    }
    assert_eq!(pipeline.ledger().submit_calls(), 0);
}

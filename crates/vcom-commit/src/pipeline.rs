//! # Commitment Pipeline
//!
//! One cycle at a time: fetch snapshot, encode every ballot, build the tree,
//! publish the root, record the commitment. Each stage depends on the one
//! before it; the only long suspend points are ledger calls.
//!
//! Encoding rejects the whole cycle on the first malformed ballot and names
//! its position in the snapshot. A partial tree is never built.

use serde::Serialize;
use tracing::Instrument;
use vcom_core::{
    encode, hash_leaf, BallotRecord, CanonicalLeafBytes, CommitmentRecord, CycleId, Digest32,
    LeafSchema, PositionId, VoterId,
};
use vcom_crypto::MerkleTree;
use vcom_ledger::Ledger;
use vcom_store::VoteStore;

use crate::audit::{self, ProofBundle};
use crate::config::CommitConfig;
use crate::error::{CommitError, Stage};
use crate::journal::SubmissionJournal;
use crate::publisher::{Publication, PublishOutcome, RootPublisher};
use crate::recorder::CommitmentRecorder;

/// A cycle's ballots, their leaves, and the tree over them.
///
/// `ballots[i]`, `encoded[i]` and `leaves[i]` describe the same ballot in
/// snapshot order. The tree's own leaf order is sorted.
#[derive(Debug, Clone)]
pub struct CycleTree {
    /// The cycle.
    pub cycle: CycleId,
    /// Schema the leaves were encoded with.
    pub schema: LeafSchema,
    /// Store snapshot.
    pub ballots: Vec<BallotRecord>,
    /// Canonical bytes per ballot.
    pub encoded: Vec<CanonicalLeafBytes>,
    /// Leaf hash per ballot.
    pub leaves: Vec<Digest32>,
    /// The Merkle tree.
    pub tree: MerkleTree,
}

impl CycleTree {
    /// Encode and build from a snapshot.
    pub fn build(
        cycle: &CycleId,
        ballots: Vec<BallotRecord>,
        schema: LeafSchema,
    ) -> Result<Self, CommitError> {
        if ballots.is_empty() {
            return Err(CommitError::EmptyLeafSet {
                cycle: cycle.clone(),
            });
        }
        let encoded = ballots
            .iter()
            .enumerate()
            .map(|(index, ballot)| {
                encode(ballot, schema).map_err(|source| CommitError::MalformedRecord {
                    cycle: cycle.clone(),
                    index,
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let leaves: Vec<Digest32> = encoded.iter().map(hash_leaf).collect();
        let tree = MerkleTree::build(leaves.clone()).map_err(|source| CommitError::Proof {
            cycle: cycle.clone(),
            source,
        })?;
        Ok(Self {
            cycle: cycle.clone(),
            schema,
            ballots,
            encoded,
            leaves,
            tree,
        })
    }

    /// The Merkle root.
    pub fn root(&self) -> Digest32 {
        self.tree.root()
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.tree.leaf_count()
    }
}

/// Read a cycle's snapshot from `store` and build its tree.
pub async fn snapshot_tree<S: VoteStore>(
    store: &S,
    cycle: &CycleId,
    schema: LeafSchema,
    stage: Stage,
) -> Result<CycleTree, CommitError> {
    let ballots = store
        .ballots(cycle)
        .await
        .map_err(|e| CommitError::store(cycle, stage, e))?;
    tracing::debug!(%cycle, ballots = ballots.len(), %schema, "snapshot fetched");
    CycleTree::build(cycle, ballots, schema)
}

/// Result of committing one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitOutcome {
    /// The stored commitment.
    pub record: CommitmentRecord,
    /// How the root got onto the ledger.
    pub publication: Publication,
}

/// Commits cycles against one store and one ledger.
pub struct CommitmentPipeline<S, L> {
    store: S,
    ledger: L,
    journal: SubmissionJournal,
    config: CommitConfig,
}

impl<S: VoteStore, L: Ledger> CommitmentPipeline<S, L> {
    /// Assemble a pipeline from its parts.
    pub fn new(store: S, ledger: L, journal: SubmissionJournal, config: CommitConfig) -> Self {
        Self {
            store,
            ledger,
            journal,
            config,
        }
    }

    /// Assemble a pipeline, opening the journal named in `config`.
    pub async fn open(store: S, ledger: L, config: CommitConfig) -> Result<Self, CommitError> {
        let journal = match &config.journal_path {
            Some(path) => SubmissionJournal::open(path).await?,
            None => SubmissionJournal::in_memory(),
        };
        Ok(Self::new(store, ledger, journal, config))
    }

    /// The vote store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The ledger.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// The submission journal.
    pub fn journal(&self) -> &SubmissionJournal {
        &self.journal
    }

    /// The configuration.
    pub fn config(&self) -> &CommitConfig {
        &self.config
    }

    /// Fetch, encode and build, without touching the ledger.
    pub async fn compute_root(&self, cycle: &CycleId) -> Result<CycleTree, CommitError> {
        snapshot_tree(&self.store, cycle, self.config.schema, Stage::Fetch).await
    }

    /// Commit one cycle end to end.
    ///
    /// Safe to rerun: a cycle that is already recorded returns its existing
    /// record, and a submission left open by an earlier run is resumed.
    pub async fn run_cycle(&self, cycle: &CycleId) -> Result<CommitOutcome, CommitError> {
        let span = tracing::info_span!("commit_cycle", %cycle);
        self.run_cycle_inner(cycle).instrument(span).await
    }

    async fn run_cycle_inner(&self, cycle: &CycleId) -> Result<CommitOutcome, CommitError> {
        if !self.config.allow_open_cycle {
            let closed = self
                .store
                .is_closed(cycle)
                .await
                .map_err(|e| CommitError::store(cycle, Stage::Fetch, e))?;
            if !closed {
                return Err(CommitError::CycleOpen {
                    cycle: cycle.clone(),
                });
            }
        }

        let tree = self.compute_root(cycle).await?;
        let root = tree.root();
        tracing::info!(%root, leaves = tree.leaf_count(), "root computed");

        let publication = RootPublisher::new(&self.store, &self.ledger, &self.journal, &self.config)
            .publish(root, cycle)
            .await?;

        let record = match &publication.outcome {
            PublishOutcome::AlreadyRecorded(record) => record.clone(),
            _ => {
                CommitmentRecorder::new(&self.store, &self.journal)
                    .record(&publication, tree.leaf_count() as u64, tree.schema)
                    .await?
            }
        };
        Ok(CommitOutcome {
            record,
            publication,
        })
    }

    /// Commit several cycles in order. A failed cycle does not stop the rest.
    pub async fn run_cycles(
        &self,
        cycles: &[CycleId],
    ) -> Vec<(CycleId, Result<CommitOutcome, CommitError>)> {
        let mut results = Vec::with_capacity(cycles.len());
        for cycle in cycles {
            let result = self.run_cycle(cycle).await;
            if let Err(e) = &result {
                tracing::error!(%cycle, stage = %e.stage(), "cycle commit failed: {e}");
            }
            results.push((cycle.clone(), result));
        }
        results
    }

    /// Inclusion proofs for a voter's ballots in a committed cycle.
    pub async fn export_proof(
        &self,
        cycle: &CycleId,
        voter: &VoterId,
        position: Option<&PositionId>,
    ) -> Result<Vec<ProofBundle>, CommitError> {
        audit::export_proof(&self.store, cycle, voter, position).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcom_ledger::MockLedger;
    use vcom_store::MemoryVoteStore;

    fn ballots() -> Vec<BallotRecord> {
        vec![
            BallotRecord::new("V1", ["C2"], "P1", "2024"),
            BallotRecord::new("V2", ["C1"], "P1", "2024"),
            BallotRecord::new("V3", ["C3", "C1"], "P2", "2024"),
        ]
    }

    fn cycle() -> CycleId {
        CycleId::new("2024")
    }

    async fn pipeline() -> CommitmentPipeline<MemoryVoteStore, MockLedger> {
        let store = MemoryVoteStore::new();
        store.cast_all(ballots()).unwrap();
        store.close_cycle(&cycle()).await.unwrap();
        CommitmentPipeline::new(
            store,
            MockLedger::new("mock"),
            SubmissionJournal::in_memory(),
            CommitConfig::default(),
        )
    }

    #[test]
    fn malformed_ballot_names_its_index() {
        let mut snapshot = ballots();
        snapshot.insert(1, BallotRecord::new("V9", Vec::<String>::new(), "P1", "2024"));
        match CycleTree::build(&cycle(), snapshot, LeafSchema::BallotV1) {
            Err(CommitError::MalformedRecord { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected MalformedRecord, got {other:?}"),
        }
    }

    #[test]
    fn empty_snapshot_is_rejected() {
        assert!(matches!(
            CycleTree::build(&cycle(), Vec::new(), LeafSchema::BallotV1),
            Err(CommitError::EmptyLeafSet { .. })
        ));
    }

    #[test]
    fn leaves_follow_snapshot_order() {
        let tree = CycleTree::build(&cycle(), ballots(), LeafSchema::BallotV1).unwrap();
        assert_eq!(tree.leaf_count(), 3);
        for (ballot, leaf) in tree.ballots.iter().zip(&tree.leaves) {
            assert_eq!(*leaf, vcom_core::leaf_hash(ballot, LeafSchema::BallotV1).unwrap());
            assert!(tree.tree.contains(leaf));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn open_cycle_is_refused() {
        let store = MemoryVoteStore::new();
        store.cast_all(ballots()).unwrap();
        let pipeline = CommitmentPipeline::new(
            store,
            MockLedger::new("mock"),
            SubmissionJournal::in_memory(),
            CommitConfig::default(),
        );
        assert!(matches!(
            pipeline.run_cycle(&cycle()).await,
            Err(CommitError::CycleOpen { .. })
        ));
        assert_eq!(pipeline.ledger().submit_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn run_cycle_records_commitment() {
        let pipeline = pipeline().await;
        let outcome = pipeline.run_cycle(&cycle()).await.unwrap();
        assert_eq!(outcome.publication.outcome, PublishOutcome::Submitted);
        assert_eq!(outcome.record.leaf_count, 3);
        assert_eq!(outcome.record.tx_ref, outcome.publication.tx_ref);
        assert_eq!(
            pipeline.store().commitment(&cycle()).await.unwrap(),
            Some(outcome.record.clone())
        );
        assert!(pipeline.journal().open_submission(&cycle()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn store_read_failure_is_a_fetch_error() {
        let pipeline = pipeline().await;
        pipeline.store().set_fail_reads(true);
        let err = pipeline.run_cycle(&cycle()).await.unwrap_err();
        assert_eq!(err.stage(), Stage::Fetch);
    }

    #[tokio::test(start_paused = true)]
    async fn batch_continues_past_failures() {
        let pipeline = pipeline().await;
        let empty = CycleId::new("2025");
        pipeline.store().close_cycle(&empty).await.unwrap();
        let results = pipeline.run_cycles(&[empty.clone(), cycle()]).await;
        assert!(matches!(results[0].1, Err(CommitError::EmptyLeafSet { .. })));
        assert!(results[1].1.is_ok());
    }
}

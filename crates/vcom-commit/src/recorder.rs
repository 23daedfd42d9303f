//! Commitment record persistence.
//!
//! Runs only after the publisher has a confirmed transaction. A failure
//! here never triggers another publish: the anchor already exists, so the
//! error carries the transaction for manual repair and the journal keeps
//! the submission open for the next run.

use vcom_core::{CommitmentRecord, CycleId, LeafSchema};
use vcom_store::{StoreError, VoteStore};

use crate::error::{CommitError, Stage};
use crate::journal::{JournalEvent, SubmissionJournal};
use crate::publisher::Publication;

/// Writes commitment records.
pub struct CommitmentRecorder<'a, S> {
    store: &'a S,
    journal: &'a SubmissionJournal,
}

impl<'a, S: VoteStore> CommitmentRecorder<'a, S> {
    /// Borrow the store and journal.
    pub fn new(store: &'a S, journal: &'a SubmissionJournal) -> Self {
        Self { store, journal }
    }

    /// Persist the commitment for a confirmed publication.
    ///
    /// A record already stored for the same root and transaction is returned
    /// as is.
    pub async fn record(
        &self,
        publication: &Publication,
        leaf_count: u64,
        schema: LeafSchema,
    ) -> Result<CommitmentRecord, CommitError> {
        let cycle = &publication.cycle;
        let record = CommitmentRecord::new(
            cycle.clone(),
            publication.root,
            publication.tx_ref.clone(),
            publication.ledger.clone(),
            leaf_count,
            schema,
        );

        match self.store.insert_commitment(&record).await {
            Ok(()) => {
                self.journal
                    .record(
                        cycle,
                        record.root,
                        JournalEvent::Recorded {
                            tx_ref: record.tx_ref.clone(),
                        },
                    )
                    .await?;
                tracing::info!(
                    %cycle,
                    root = %record.root,
                    tx_ref = %record.tx_ref,
                    leaf_count,
                    "commitment recorded"
                );
                Ok(record)
            }
            Err(StoreError::DuplicateCommitment { .. }) => self.existing(cycle, &record).await,
            Err(e) => Err(self.persistence_failed(&record, e.to_string()).await),
        }
    }

    async fn existing(
        &self,
        cycle: &CycleId,
        attempted: &CommitmentRecord,
    ) -> Result<CommitmentRecord, CommitError> {
        let existing = self
            .store
            .commitment(cycle)
            .await
            .map_err(|e| CommitError::store(cycle, Stage::Record, e))?;
        match existing {
            Some(existing)
                if existing.root == attempted.root && existing.tx_ref == attempted.tx_ref =>
            {
                tracing::info!(%cycle, tx_ref = %existing.tx_ref, "commitment already recorded");
                Ok(existing)
            }
            Some(existing) => Err(CommitError::AlreadyCommitted {
                cycle: cycle.clone(),
                existing_root: existing.root,
                tx_ref: existing.tx_ref,
            }),
            None => Err(self
                .persistence_failed(attempted, "store reported a duplicate but holds no record".into())
                .await),
        }
    }

    async fn persistence_failed(&self, record: &CommitmentRecord, reason: String) -> CommitError {
        tracing::error!(
            cycle = %record.cycle,
            root = %record.root,
            tx_ref = %record.tx_ref,
            ledger = %record.ledger,
            "root is anchored but the commitment record was not stored: {reason}"
        );
        let event = JournalEvent::PersistenceFailed {
            tx_ref: record.tx_ref.clone(),
            reason: reason.clone(),
        };
        if let Err(e) = self.journal.record(&record.cycle, record.root, event).await {
            tracing::error!(cycle = %record.cycle, "journal write failed as well: {e}");
        }
        CommitError::PersistenceFailedAfterPublish {
            cycle: record.cycle.clone(),
            root: record.root,
            tx_ref: record.tx_ref.clone(),
            reason,
        }
    }
}

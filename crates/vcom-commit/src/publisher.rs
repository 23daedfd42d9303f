//! # Root Publisher
//!
//! Anchors a cycle's Merkle root on the ledger at most once and waits until
//! the transaction reaches the configured finality.
//!
//! ## Idempotency
//!
//! Before anything is submitted the publisher checks, in order:
//!
//! 1. the vote store's commitment record for the cycle,
//! 2. the submission journal for a transaction that was accepted but never
//!    recorded (its ledger status is re-checked before any resubmission),
//! 3. the ledger itself via [`Ledger::find`].
//!
//! A matching root at any step reuses the existing transaction. A different
//! root is [`CommitError::AlreadyCommitted`].
//!
//! A submission whose response was lost is retried, and the write-once
//! ledger then rejects the retry. A rejection is therefore followed by one
//! more lookup, which adopts the earlier transaction if it carries our root.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use vcom_core::{CommitmentRecord, CycleId, Digest32, TxRef};
use vcom_ledger::{Ledger, LedgerEntry, LedgerError, RootAnchor, TxStatus};
use vcom_store::VoteStore;

use crate::config::CommitConfig;
use crate::error::{CommitError, Stage};
use crate::journal::{JournalEvent, OpenSubmission, SubmissionJournal};
use crate::retry::{retry_transient, RetryFailure};

/// How a publication came about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishOutcome {
    /// A new transaction was submitted and confirmed.
    Submitted,
    /// The ledger already held an anchor with this root.
    ReusedLedgerEntry,
    /// A journaled transaction from an earlier run was confirmed.
    ResumedFromJournal,
    /// The store already holds a commitment with this root. The ledger was
    /// not consulted.
    AlreadyRecorded(CommitmentRecord),
}

/// A root anchored on the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Publication {
    /// The cycle.
    pub cycle: CycleId,
    /// The anchored root.
    pub root: Digest32,
    /// Transaction carrying the root.
    pub tx_ref: TxRef,
    /// Ledger identifier.
    pub ledger: String,
    /// Last status observed. `None` for [`PublishOutcome::AlreadyRecorded`].
    pub status: Option<TxStatus>,
    /// How the publication came about.
    pub outcome: PublishOutcome,
}

#[derive(Debug, Error)]
enum SubmitFailure {
    #[error(transparent)]
    Ledger(LedgerError),
    #[error("submit timed out after {0:?}")]
    Timeout(Duration),
}

impl SubmitFailure {
    fn is_transient(&self) -> bool {
        match self {
            Self::Ledger(e) => e.is_transient(),
            Self::Timeout(_) => true,
        }
    }
}

enum Unconfirmed {
    Failed(TxStatus),
    Query(LedgerError),
}

/// Publishes roots for one store/ledger pair.
pub struct RootPublisher<'a, S, L> {
    store: &'a S,
    ledger: &'a L,
    journal: &'a SubmissionJournal,
    config: &'a CommitConfig,
}

impl<'a, S: VoteStore, L: Ledger> RootPublisher<'a, S, L> {
    /// Borrow the collaborators for one or more publications.
    pub fn new(
        store: &'a S,
        ledger: &'a L,
        journal: &'a SubmissionJournal,
        config: &'a CommitConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            journal,
            config,
        }
    }

    /// Anchor `root` for `cycle` and wait for confirmation.
    ///
    /// Returns once the transaction satisfies the configured finality. The
    /// commitment record is not written here.
    pub async fn publish(&self, root: Digest32, cycle: &CycleId) -> Result<Publication, CommitError> {
        if let Some(existing) = self
            .store
            .commitment(cycle)
            .await
            .map_err(|e| CommitError::store(cycle, Stage::Publish, e))?
        {
            if existing.root != root {
                return Err(CommitError::AlreadyCommitted {
                    cycle: cycle.clone(),
                    existing_root: existing.root,
                    tx_ref: existing.tx_ref,
                });
            }
            tracing::info!(%cycle, %root, tx_ref = %existing.tx_ref, "commitment already recorded");
            return Ok(Publication {
                cycle: cycle.clone(),
                root,
                tx_ref: existing.tx_ref.clone(),
                ledger: existing.ledger.clone(),
                status: None,
                outcome: PublishOutcome::AlreadyRecorded(existing),
            });
        }

        if let Some(open) = self.journal.open_submission(cycle) {
            if let Some(publication) = self.resume(cycle, root, open).await? {
                return Ok(publication);
            }
        }

        if let Some(entry) = self.find(cycle).await? {
            return self.adopt(cycle, root, entry).await;
        }

        let (tx_ref, attempts) = match self.submit(cycle, root).await? {
            Accepted::New { tx_ref, attempts } => (tx_ref, attempts),
            Accepted::Existing(entry) => return self.adopt(cycle, root, entry).await,
        };
        tracing::info!(%cycle, %root, %tx_ref, attempts, "root submitted");
        self.journal
            .record(
                cycle,
                root,
                JournalEvent::Submitted {
                    tx_ref: tx_ref.clone(),
                    ledger: self.ledger.ledger_id().to_string(),
                },
            )
            .await?;
        self.await_confirmation(cycle, root, tx_ref, attempts, PublishOutcome::Submitted)
            .await
    }

    async fn resume(
        &self,
        cycle: &CycleId,
        root: Digest32,
        open: OpenSubmission,
    ) -> Result<Option<Publication>, CommitError> {
        if open.ledger != self.ledger.ledger_id() {
            tracing::warn!(
                %cycle,
                tx_ref = %open.tx_ref,
                journaled = %open.ledger,
                current = %self.ledger.ledger_id(),
                "journaled submission belongs to another ledger, ignoring it"
            );
            return Ok(None);
        }

        let status = self
            .ledger
            .status(&open.tx_ref)
            .await
            .map_err(|e| ledger_failure(cycle, 0, e))?;
        tracing::info!(%cycle, tx_ref = %open.tx_ref, %status, "found journaled submission");

        if matches!(status, TxStatus::Failed | TxStatus::Unknown) {
            self.journal
                .record(
                    cycle,
                    open.root,
                    JournalEvent::Abandoned {
                        tx_ref: open.tx_ref,
                        reason: format!("ledger reports {status}"),
                    },
                )
                .await?;
            return Ok(None);
        }
        if open.root != root {
            return Err(CommitError::AlreadyCommitted {
                cycle: cycle.clone(),
                existing_root: open.root,
                tx_ref: open.tx_ref,
            });
        }
        self.await_confirmation(cycle, root, open.tx_ref, 0, PublishOutcome::ResumedFromJournal)
            .await
            .map(Some)
    }

    async fn find(&self, cycle: &CycleId) -> Result<Option<LedgerEntry>, CommitError> {
        retry_transient(&self.config.retry_policy(), LedgerError::is_transient, |_| {
            self.ledger.find(cycle)
        })
        .await
        .map_err(|failure| ledger_failure(cycle, failure.attempts, failure.error))
    }

    async fn adopt(
        &self,
        cycle: &CycleId,
        root: Digest32,
        entry: LedgerEntry,
    ) -> Result<Publication, CommitError> {
        if entry.root != root {
            return Err(CommitError::AlreadyCommitted {
                cycle: cycle.clone(),
                existing_root: entry.root,
                tx_ref: entry.tx_ref,
            });
        }
        tracing::info!(%cycle, %root, tx_ref = %entry.tx_ref, "ledger already holds this root");
        self.journal
            .record(
                cycle,
                root,
                JournalEvent::Submitted {
                    tx_ref: entry.tx_ref.clone(),
                    ledger: self.ledger.ledger_id().to_string(),
                },
            )
            .await?;
        self.await_confirmation(cycle, root, entry.tx_ref, 0, PublishOutcome::ReusedLedgerEntry)
            .await
    }

    async fn submit(&self, cycle: &CycleId, root: Digest32) -> Result<Accepted, CommitError> {
        let anchor = RootAnchor::new(cycle.clone(), root);
        let timeout = self.config.submit_timeout();
        let result = retry_transient(
            &self.config.retry_policy(),
            SubmitFailure::is_transient,
            |attempt| {
                let anchor = &anchor;
                async move {
                    tracing::debug!(%cycle, attempt, "submitting root");
                    match tokio::time::timeout(timeout, self.ledger.submit(anchor)).await {
                        Ok(result) => result
                            .map(|tx_ref| (tx_ref, attempt))
                            .map_err(SubmitFailure::Ledger),
                        Err(_) => Err(SubmitFailure::Timeout(timeout)),
                    }
                }
            },
        )
        .await;

        let RetryFailure { attempts, error } = match result {
            Ok((tx_ref, attempts)) => return Ok(Accepted::New { tx_ref, attempts }),
            Err(failure) => failure,
        };
        match error {
            SubmitFailure::Ledger(LedgerError::Rejected { reason, .. }) => {
                match self.find(cycle).await? {
                    Some(entry) => {
                        tracing::info!(
                            %cycle,
                            tx_ref = %entry.tx_ref,
                            "submit rejected but the ledger holds an anchor for the cycle"
                        );
                        Ok(Accepted::Existing(entry))
                    }
                    None => Err(CommitError::LedgerRejected {
                        cycle: cycle.clone(),
                        reason,
                    }),
                }
            }
            SubmitFailure::Ledger(e) => Err(ledger_failure(cycle, attempts, e)),
            timeout @ SubmitFailure::Timeout(_) => Err(CommitError::LedgerUnavailable {
                cycle: cycle.clone(),
                attempts,
                reason: timeout.to_string(),
            }),
        }
    }

    async fn await_confirmation(
        &self,
        cycle: &CycleId,
        root: Digest32,
        tx_ref: TxRef,
        attempts: u32,
        outcome: PublishOutcome,
    ) -> Result<Publication, CommitError> {
        let required = self.config.finality.required_status();
        let interval = self.config.poll_interval();
        let poll = async {
            loop {
                match self.ledger.status(&tx_ref).await {
                    Ok(status) if status.satisfies(required) => return Ok(status),
                    Ok(TxStatus::Failed) => return Err(Unconfirmed::Failed(TxStatus::Failed)),
                    Ok(status) => tracing::debug!(%cycle, %tx_ref, %status, "awaiting {required}"),
                    Err(e) if e.is_transient() => {
                        tracing::warn!(%cycle, %tx_ref, "status check failed: {e}");
                    }
                    Err(e) => return Err(Unconfirmed::Query(e)),
                }
                tokio::time::sleep(interval).await;
            }
        };

        let confirm_timeout = self.config.confirm_timeout();
        let polled = tokio::time::timeout(confirm_timeout, poll).await;
        match polled {
            Ok(Ok(status)) => {
                self.journal
                    .record(cycle, root, JournalEvent::Confirmed { tx_ref: tx_ref.clone() })
                    .await?;
                tracing::info!(%cycle, %root, %tx_ref, %status, "root confirmed");
                Ok(Publication {
                    cycle: cycle.clone(),
                    root,
                    tx_ref,
                    ledger: self.ledger.ledger_id().to_string(),
                    status: Some(status),
                    outcome,
                })
            }
            Ok(Err(Unconfirmed::Failed(status))) => {
                let reason = format!("transaction {tx_ref} {status}");
                self.journal
                    .record(
                        cycle,
                        root,
                        JournalEvent::Abandoned {
                            tx_ref,
                            reason: reason.clone(),
                        },
                    )
                    .await?;
                Err(CommitError::LedgerRejected {
                    cycle: cycle.clone(),
                    reason,
                })
            }
            Ok(Err(Unconfirmed::Query(e))) => Err(ledger_failure(cycle, attempts, e)),
            Err(_) => {
                tracing::warn!(%cycle, %tx_ref, "not {required} within {confirm_timeout:?}, left in journal");
                Err(CommitError::LedgerUnavailable {
                    cycle: cycle.clone(),
                    attempts,
                    reason: format!("{tx_ref} not {required} within {confirm_timeout:?}"),
                })
            }
        }
    }
}

enum Accepted {
    New { tx_ref: TxRef, attempts: u32 },
    Existing(LedgerEntry),
}

fn ledger_failure(cycle: &CycleId, attempts: u32, error: LedgerError) -> CommitError {
    match error {
        LedgerError::Unavailable { reason, .. } => CommitError::LedgerUnavailable {
            cycle: cycle.clone(),
            attempts,
            reason,
        },
        LedgerError::Rejected { reason, .. } => CommitError::LedgerRejected {
            cycle: cycle.clone(),
            reason,
        },
        e @ LedgerError::InvalidConfig(_) => CommitError::LedgerRejected {
            cycle: cycle.clone(),
            reason: e.to_string(),
        },
    }
}

//! In-memory vote store backed by `DashMap`.
//!
//! Cheaply cloneable via `Arc`; all clones share the same data. Failure
//! injection switches make reads or commitment inserts fail so callers can
//! exercise their error paths.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use vcom_core::{BallotRecord, CommitmentRecord, CycleId};

use crate::error::StoreError;
use crate::VoteStore;

#[derive(Debug, Default)]
struct Inner {
    ballots: DashMap<CycleId, Vec<BallotRecord>>,
    commitments: DashMap<CycleId, CommitmentRecord>,
    closed: DashSet<CycleId>,
    fail_reads: AtomicBool,
    fail_inserts: AtomicBool,
}

/// In-memory [`VoteStore`].
#[derive(Debug, Clone, Default)]
pub struct MemoryVoteStore {
    inner: Arc<Inner>,
}

impl MemoryVoteStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a ballot. Rejected once the ballot's cycle is closed.
    pub fn cast(&self, ballot: BallotRecord) -> Result<(), StoreError> {
        // The entry guard is held across the check; close_cycle takes it too.
        let mut ballots = self.inner.ballots.entry(ballot.cycle.clone()).or_default();
        if self.inner.closed.contains(&ballot.cycle) {
            return Err(StoreError::CycleClosed {
                cycle: ballot.cycle,
            });
        }
        ballots.push(ballot);
        Ok(())
    }

    /// Record several ballots, stopping at the first rejection.
    pub fn cast_all(
        &self,
        ballots: impl IntoIterator<Item = BallotRecord>,
    ) -> Result<(), StoreError> {
        ballots.into_iter().try_for_each(|b| self.cast(b))
    }

    /// Make `ballots` and `commitment` fail until cleared.
    pub fn set_fail_reads(&self, fail: bool) {
        self.inner.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make `insert_commitment` fail until cleared.
    pub fn set_fail_inserts(&self, fail: bool) {
        self.inner.fail_inserts.store(fail, Ordering::SeqCst);
    }

    fn check_reads(&self) -> Result<(), StoreError> {
        if self.inner.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected read failure".into()));
        }
        Ok(())
    }
}

impl VoteStore for MemoryVoteStore {
    async fn ballots(&self, cycle: &CycleId) -> Result<Vec<BallotRecord>, StoreError> {
        self.check_reads()?;
        Ok(self
            .inner
            .ballots
            .get(cycle)
            .map(|b| b.value().clone())
            .unwrap_or_default())
    }

    async fn commitment(&self, cycle: &CycleId) -> Result<Option<CommitmentRecord>, StoreError> {
        self.check_reads()?;
        Ok(self.inner.commitments.get(cycle).map(|c| c.value().clone()))
    }

    async fn insert_commitment(&self, record: &CommitmentRecord) -> Result<(), StoreError> {
        if self.inner.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected insert failure".into()));
        }
        match self.inner.commitments.entry(record.cycle.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateCommitment {
                cycle: record.cycle.clone(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(())
            }
        }
    }

    async fn close_cycle(&self, cycle: &CycleId) -> Result<(), StoreError> {
        let _ballots = self.inner.ballots.entry(cycle.clone()).or_default();
        self.inner.closed.insert(cycle.clone());
        Ok(())
    }

    async fn is_closed(&self, cycle: &CycleId) -> Result<bool, StoreError> {
        Ok(self.inner.closed.contains(cycle))
    }
}

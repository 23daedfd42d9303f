//! # vcom-store: Vote Store Boundary
//!
//! The commitment pipeline reads a cycle's ballots and writes exactly one
//! commitment record per cycle through the [`VoteStore`] trait. Ballot
//! ingestion (casting) is outside the trait: each backend offers its own
//! `cast` for loaders and tests.
//!
//! ## Backends
//!
//! - [`MemoryVoteStore`]: `DashMap`-backed, with failure injection for tests.
//! - [`JsonFileStore`]: append-only files under one directory. Suitable for a
//!   single-host deployment and for the CLI.
//! - `PgVoteStore` (feature `postgres`): SQLx with embedded migrations.
//! - [`AnyVoteStore`]: runtime selection between the backends.
//!
//! ## Invariants
//!
//! - `insert_commitment` is write-once per cycle. A second insert fails with
//!   [`StoreError::DuplicateCommitment`] regardless of content.
//! - Once a cycle is closed, `cast` rejects new ballots, so `ballots` returns
//!   a stable snapshot.

pub mod error;
pub mod file;
pub mod memory;

#[cfg(feature = "postgres")]
pub mod postgres;

use std::future::Future;

use vcom_core::{BallotRecord, CommitmentRecord, CycleId};

pub use error::StoreError;
pub use file::JsonFileStore;
pub use memory::MemoryVoteStore;

#[cfg(feature = "postgres")]
pub use postgres::PgVoteStore;

/// Read/write access to ballots and commitment records.
pub trait VoteStore: Send + Sync {
    /// Every ballot recorded for `cycle`, in storage order.
    fn ballots(
        &self,
        cycle: &CycleId,
    ) -> impl Future<Output = Result<Vec<BallotRecord>, StoreError>> + Send;

    /// The commitment for `cycle`, if one was recorded.
    fn commitment(
        &self,
        cycle: &CycleId,
    ) -> impl Future<Output = Result<Option<CommitmentRecord>, StoreError>> + Send;

    /// Persist a commitment record. Fails with `DuplicateCommitment` if the
    /// cycle already has one.
    fn insert_commitment(
        &self,
        record: &CommitmentRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Close `cycle` to further ballots. Closing twice is a no-op.
    fn close_cycle(&self, cycle: &CycleId) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Whether `cycle` is closed.
    fn is_closed(&self, cycle: &CycleId) -> impl Future<Output = Result<bool, StoreError>> + Send;
}

/// Runtime-selected vote store.
#[derive(Debug, Clone)]
pub enum AnyVoteStore {
    /// In-memory store.
    Memory(MemoryVoteStore),
    /// JSON file store.
    File(JsonFileStore),
    /// Postgres store.
    #[cfg(feature = "postgres")]
    Postgres(PgVoteStore),
}

impl AnyVoteStore {
    /// Record a ballot through the backend's own ingestion path.
    pub async fn cast(&self, ballot: &BallotRecord) -> Result<(), StoreError> {
        match self {
            Self::Memory(s) => s.cast(ballot.clone()),
            Self::File(s) => s.cast(ballot).await,
            #[cfg(feature = "postgres")]
            Self::Postgres(s) => s.cast(ballot).await,
        }
    }
}

impl From<MemoryVoteStore> for AnyVoteStore {
    fn from(store: MemoryVoteStore) -> Self {
        Self::Memory(store)
    }
}

impl From<JsonFileStore> for AnyVoteStore {
    fn from(store: JsonFileStore) -> Self {
        Self::File(store)
    }
}

#[cfg(feature = "postgres")]
impl From<PgVoteStore> for AnyVoteStore {
    fn from(store: PgVoteStore) -> Self {
        Self::Postgres(store)
    }
}

macro_rules! dispatch {
    ($self:ident, $s:ident => $call:expr) => {
        match $self {
            AnyVoteStore::Memory($s) => $call,
            AnyVoteStore::File($s) => $call,
            #[cfg(feature = "postgres")]
            AnyVoteStore::Postgres($s) => $call,
        }
    };
}

impl VoteStore for AnyVoteStore {
    async fn ballots(&self, cycle: &CycleId) -> Result<Vec<BallotRecord>, StoreError> {
        dispatch!(self, s => s.ballots(cycle).await)
    }

    async fn commitment(&self, cycle: &CycleId) -> Result<Option<CommitmentRecord>, StoreError> {
        dispatch!(self, s => s.commitment(cycle).await)
    }

    async fn insert_commitment(&self, record: &CommitmentRecord) -> Result<(), StoreError> {
        dispatch!(self, s => s.insert_commitment(record).await)
    }

    async fn close_cycle(&self, cycle: &CycleId) -> Result<(), StoreError> {
        dispatch!(self, s => s.close_cycle(cycle).await)
    }

    async fn is_closed(&self, cycle: &CycleId) -> Result<bool, StoreError> {
        dispatch!(self, s => s.is_closed(cycle).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn any_store_dispatches_to_backend() {
        let dir = tempfile::tempdir().unwrap();
        let cycle = CycleId::new("2024");
        for store in [
            AnyVoteStore::from(MemoryVoteStore::new()),
            AnyVoteStore::from(JsonFileStore::new(dir.path())),
        ] {
            store
                .cast(&BallotRecord::new("V1", ["C2"], "P1", "2024"))
                .await
                .unwrap();
            assert_eq!(store.ballots(&cycle).await.unwrap().len(), 1);
            store.close_cycle(&cycle).await.unwrap();
            assert!(store.is_closed(&cycle).await.unwrap());
            assert!(matches!(
                store
                    .cast(&BallotRecord::new("V2", ["C1"], "P1", "2024"))
                    .await,
                Err(StoreError::CycleClosed { .. })
            ));
        }
    }
}

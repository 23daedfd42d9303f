//! # Commitment Errors
//!
//! Every failure of the pipeline carries the cycle it concerns and maps to
//! the stage that raised it, so an operator can tell "nothing happened"
//! apart from "the root is on the ledger but not recorded".
//!
//! | Variant                          | Stage   | Ledger written? |
//! |----------------------------------|---------|-----------------|
//! | `CycleOpen`, `Store` (fetch)     | fetch   | no              |
//! | `MalformedRecord`                | encode  | no              |
//! | `EmptyLeafSet`                   | build   | no              |
//! | `AlreadyCommitted`               | publish | earlier run     |
//! | `LedgerUnavailable`              | publish | maybe (journaled) |
//! | `LedgerRejected`                 | publish | no              |
//! | `PersistenceFailedAfterPublish`  | record  | **yes**         |

use thiserror::Error;
use vcom_core::{CycleId, Digest32, LeafError, TxRef};
use vcom_crypto::MerkleError;
use vcom_store::StoreError;

use crate::journal::JournalError;

/// Pipeline stage an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Reading the ballot snapshot.
    Fetch,
    /// Encoding ballots into leaves.
    Encode,
    /// Building the Merkle tree.
    Build,
    /// Anchoring the root on the ledger.
    Publish,
    /// Persisting the commitment record.
    Record,
    /// Proof export and verification.
    Audit,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Fetch => "fetch",
            Self::Encode => "encode",
            Self::Build => "build",
            Self::Publish => "publish",
            Self::Record => "record",
            Self::Audit => "audit",
        };
        f.write_str(s)
    }
}

/// Errors from the commitment pipeline.
#[derive(Error, Debug)]
pub enum CommitError {
    /// A ballot failed leaf encoding. The whole cycle is rejected.
    #[error("{cycle}: ballot #{index} is malformed: {source}")]
    MalformedRecord {
        /// The cycle.
        cycle: CycleId,
        /// Position of the ballot in the store snapshot.
        index: usize,
        /// Encoder error.
        source: LeafError,
    },

    /// The cycle has no ballots.
    #[error("{cycle} has no ballots to commit")]
    EmptyLeafSet {
        /// The cycle.
        cycle: CycleId,
    },

    /// A different root is already committed for the cycle.
    #[error("{cycle} is already committed with root {existing_root} in {tx_ref}")]
    AlreadyCommitted {
        /// The cycle.
        cycle: CycleId,
        /// Root already on record.
        existing_root: Digest32,
        /// Transaction that anchored it.
        tx_ref: TxRef,
    },

    /// The ledger stayed unreachable, or the anchor was not confirmed in
    /// time. Any accepted transaction is journaled and resumed on rerun.
    #[error("{cycle}: ledger unavailable after {attempts} attempt(s): {reason}")]
    LedgerUnavailable {
        /// The cycle.
        cycle: CycleId,
        /// Submission attempts made.
        attempts: u32,
        /// Last failure.
        reason: String,
    },

    /// The ledger refused the anchor, or the transaction failed.
    #[error("{cycle}: ledger rejected the anchor: {reason}")]
    LedgerRejected {
        /// The cycle.
        cycle: CycleId,
        /// Rejection reason.
        reason: String,
    },

    /// The root is anchored on the ledger but the commitment record could not
    /// be stored. Do not republish; repair the record from `tx_ref`.
    #[error(
        "{cycle}: root {root} is anchored in {tx_ref} but the commitment record was not stored: {reason}"
    )]
    PersistenceFailedAfterPublish {
        /// The cycle.
        cycle: CycleId,
        /// Anchored root.
        root: Digest32,
        /// Confirmed ledger transaction.
        tx_ref: TxRef,
        /// Store failure.
        reason: String,
    },

    /// The cycle is still open for voting.
    #[error("{cycle} is still open; close it before committing")]
    CycleOpen {
        /// The cycle.
        cycle: CycleId,
    },

    /// The ballots in the store no longer produce the committed root.
    #[error("{cycle}: store ballots rebuild to {rebuilt}, but {committed} was committed")]
    RootMismatch {
        /// The cycle.
        cycle: CycleId,
        /// Root on record.
        committed: Digest32,
        /// Root rebuilt from the current snapshot.
        rebuilt: Digest32,
    },

    /// No commitment exists for the cycle.
    #[error("{cycle} has not been committed")]
    NotCommitted {
        /// The cycle.
        cycle: CycleId,
    },

    /// No ballot matched the request.
    #[error("no matching ballot in {cycle}")]
    BallotNotFound {
        /// The cycle.
        cycle: CycleId,
    },

    /// Proof derivation failed.
    #[error("{cycle}: proof derivation failed: {source}")]
    Proof {
        /// The cycle.
        cycle: CycleId,
        /// Merkle error.
        source: MerkleError,
    },

    /// Vote store failure.
    #[error("{cycle}: vote store failed during {stage}: {source}")]
    Store {
        /// The cycle.
        cycle: CycleId,
        /// Stage the store was accessed in.
        stage: Stage,
        /// Store error.
        source: StoreError,
    },

    /// Submission journal failure.
    #[error("submission journal: {0}")]
    Journal(#[from] JournalError),
}

impl CommitError {
    /// The stage that raised the error.
    pub fn stage(&self) -> Stage {
        match self {
            Self::CycleOpen { .. } => Stage::Fetch,
            Self::MalformedRecord { .. } => Stage::Encode,
            Self::EmptyLeafSet { .. } => Stage::Build,
            Self::AlreadyCommitted { .. }
            | Self::LedgerUnavailable { .. }
            | Self::LedgerRejected { .. }
            | Self::Journal(_) => Stage::Publish,
            Self::PersistenceFailedAfterPublish { .. } => Stage::Record,
            Self::RootMismatch { .. }
            | Self::NotCommitted { .. }
            | Self::BallotNotFound { .. }
            | Self::Proof { .. } => Stage::Audit,
            Self::Store { stage, .. } => *stage,
        }
    }

    /// Whether rerunning the same cycle may succeed without intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LedgerUnavailable { .. })
    }

    /// The cycle the error concerns, if it names one.
    pub fn cycle(&self) -> Option<&CycleId> {
        match self {
            Self::MalformedRecord { cycle, .. }
            | Self::EmptyLeafSet { cycle }
            | Self::AlreadyCommitted { cycle, .. }
            | Self::LedgerUnavailable { cycle, .. }
            | Self::LedgerRejected { cycle, .. }
            | Self::PersistenceFailedAfterPublish { cycle, .. }
            | Self::CycleOpen { cycle }
            | Self::RootMismatch { cycle, .. }
            | Self::NotCommitted { cycle }
            | Self::BallotNotFound { cycle }
            | Self::Proof { cycle, .. }
            | Self::Store { cycle, .. } => Some(cycle),
            Self::Journal(_) => None,
        }
    }

    pub(crate) fn store(cycle: &CycleId, stage: Stage, source: StoreError) -> Self {
        Self::Store {
            cycle: cycle.clone(),
            stage,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cycle() -> CycleId {
        CycleId::new("2024")
    }

    #[test]
    fn only_unavailable_is_retryable() {
        let unavailable = CommitError::LedgerUnavailable {
            cycle: cycle(),
            attempts: 4,
            reason: "timeout".into(),
        };
        assert!(unavailable.is_retryable());
        let rejected = CommitError::LedgerRejected {
            cycle: cycle(),
            reason: "revert".into(),
        };
        assert!(!rejected.is_retryable());
        assert!(!CommitError::EmptyLeafSet { cycle: cycle() }.is_retryable());
    }

    #[test]
    fn stages() {
        assert_eq!(CommitError::EmptyLeafSet { cycle: cycle() }.stage(), Stage::Build);
        assert_eq!(CommitError::CycleOpen { cycle: cycle() }.stage(), Stage::Fetch);
        let persistence = CommitError::PersistenceFailedAfterPublish {
            cycle: cycle(),
            root: Digest32::from_bytes([1; 32]),
            tx_ref: TxRef::new("0xabc"),
            reason: "disk full".into(),
        };
        assert_eq!(persistence.stage(), Stage::Record);
        let store = CommitError::store(
            &cycle(),
            Stage::Fetch,
            StoreError::Unavailable("down".into()),
        );
        assert_eq!(store.stage(), Stage::Fetch);
    }

    #[test]
    fn persistence_failure_message_names_tx() {
        let err = CommitError::PersistenceFailedAfterPublish {
            cycle: cycle(),
            root: Digest32::from_bytes([1; 32]),
            tx_ref: TxRef::new("0xabc"),
            reason: "disk full".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("0xabc"));
        assert!(msg.contains("cycle:2024"));
        assert!(msg.contains("disk full"));
        assert_eq!(err.cycle(), Some(&cycle()));
    }
}

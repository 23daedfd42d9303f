use std::path::PathBuf;

use thiserror::Error;
use vcom_core::CycleId;

/// Errors from vote store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A commitment already exists for the cycle. Commitments are written
    /// once per cycle.
    #[error("a commitment already exists for {cycle}")]
    DuplicateCommitment {
        /// The cycle.
        cycle: CycleId,
    },

    /// The cycle is closed; no more ballots may be cast.
    #[error("{cycle} is closed")]
    CycleClosed {
        /// The cycle.
        cycle: CycleId,
    },

    /// Filesystem failure.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A stored record could not be decoded.
    #[error("corrupt record in {location}: {reason}")]
    Corrupt {
        /// Where the record lives (file and line, or table).
        location: String,
        /// Decode failure.
        reason: String,
    },

    /// JSON encoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend is unreachable or refused the operation.
    #[error("vote store unavailable: {0}")]
    Unavailable(String),

    /// Postgres error.
    #[cfg(feature = "postgres")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

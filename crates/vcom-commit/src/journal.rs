//! # Submission Journal
//!
//! Append-only log of what the publisher did on the ledger, one JSON object
//! per line. It closes the gap between "the ledger accepted a transaction"
//! and "the commitment record was stored": a rerun after a crash, a
//! cancellation or a persistence failure finds the transaction here and
//! checks its status instead of anchoring again.
//!
//! A cycle has an open submission when its latest `submitted` event is not
//! followed by `recorded` or `abandoned`.

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use vcom_core::{CycleId, Digest32, Timestamp, TxRef};

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JournalEvent {
    /// The ledger accepted (or already held) a transaction for the root.
    Submitted {
        /// Ledger transaction.
        tx_ref: TxRef,
        /// Ledger identifier.
        ledger: String,
    },
    /// The transaction reached the required status.
    Confirmed {
        /// Ledger transaction.
        tx_ref: TxRef,
    },
    /// The commitment record was stored.
    Recorded {
        /// Ledger transaction.
        tx_ref: TxRef,
    },
    /// Storing the commitment record failed after confirmation.
    PersistenceFailed {
        /// Ledger transaction.
        tx_ref: TxRef,
        /// Store failure.
        reason: String,
    },
    /// The transaction failed or vanished; it will not be resumed.
    Abandoned {
        /// Ledger transaction.
        tx_ref: TxRef,
        /// Why.
        reason: String,
    },
}

impl JournalEvent {
    /// The transaction the event concerns.
    pub fn tx_ref(&self) -> &TxRef {
        match self {
            Self::Submitted { tx_ref, .. }
            | Self::Confirmed { tx_ref }
            | Self::Recorded { tx_ref }
            | Self::PersistenceFailed { tx_ref, .. }
            | Self::Abandoned { tx_ref, .. } => tx_ref,
        }
    }
}

/// One journal line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    /// The cycle.
    pub cycle: CycleId,
    /// The root being anchored.
    pub root: Digest32,
    /// When the entry was written.
    pub at: Timestamp,
    /// The event.
    #[serde(flatten)]
    pub event: JournalEvent,
}

impl JournalEntry {
    /// Stamp an event with the current time.
    pub fn new(cycle: CycleId, root: Digest32, event: JournalEvent) -> Self {
        Self {
            cycle,
            root,
            at: Timestamp::now(),
            event,
        }
    }
}

/// A submission that was accepted but never recorded or abandoned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenSubmission {
    /// The root that was submitted.
    pub root: Digest32,
    /// Ledger transaction.
    pub tx_ref: TxRef,
    /// Ledger identifier.
    pub ledger: String,
}

/// Journal errors.
#[derive(Error, Debug)]
pub enum JournalError {
    /// Filesystem failure.
    #[error("journal I/O on {}: {source}", path.display())]
    Io {
        /// Journal file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A line could not be parsed.
    #[error("corrupt journal {}:{line}: {reason}", path.display())]
    Corrupt {
        /// Journal file.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// Parse failure.
        reason: String,
    },

    /// Encoding an entry failed.
    #[error("journal serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Append-only submission journal, optionally backed by a file.
#[derive(Debug, Default)]
pub struct SubmissionJournal {
    path: Option<PathBuf>,
    entries: RwLock<Vec<JournalEntry>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl SubmissionJournal {
    /// A journal that lives only as long as the process.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open (or create on first write) a journal file and load its entries.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, JournalError> {
        let path = path.into();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => parse_lines(&path, &contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(source) => return Err(JournalError::Io { path, source }),
        };
        tracing::debug!(path = %path.display(), entries = entries.len(), "journal loaded");
        Ok(Self {
            path: Some(path),
            entries: RwLock::new(entries),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Append an entry. The file write completes before the entry becomes
    /// visible to readers.
    pub async fn append(&self, entry: JournalEntry) -> Result<(), JournalError> {
        let _guard = self.write_lock.lock().await;
        if let Some(path) = &self.path {
            let mut line = serde_json::to_vec(&entry)?;
            line.push(b'\n');
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| JournalError::Io {
                        path: parent.to_path_buf(),
                        source,
                    })?;
            }
            let io_err = |source| JournalError::Io {
                path: path.clone(),
                source,
            };
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await
                .map_err(io_err)?;
            file.write_all(&line).await.map_err(io_err)?;
            file.sync_data().await.map_err(io_err)?;
        }
        self.entries.write().push(entry);
        Ok(())
    }

    /// Convenience for [`append`](Self::append).
    pub async fn record(
        &self,
        cycle: &CycleId,
        root: Digest32,
        event: JournalEvent,
    ) -> Result<(), JournalError> {
        self.append(JournalEntry::new(cycle.clone(), root, event)).await
    }

    /// All entries for `cycle`, oldest first.
    pub fn entries(&self, cycle: &CycleId) -> Vec<JournalEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.cycle == *cycle)
            .cloned()
            .collect()
    }

    /// The open submission for `cycle`, if any.
    pub fn open_submission(&self, cycle: &CycleId) -> Option<OpenSubmission> {
        let entries = self.entries.read();
        let mut open: Option<OpenSubmission> = None;
        for entry in entries.iter().filter(|e| e.cycle == *cycle) {
            match &entry.event {
                JournalEvent::Submitted { tx_ref, ledger } => {
                    open = Some(OpenSubmission {
                        root: entry.root,
                        tx_ref: tx_ref.clone(),
                        ledger: ledger.clone(),
                    });
                }
                JournalEvent::Recorded { tx_ref } | JournalEvent::Abandoned { tx_ref, .. } => {
                    if open.as_ref().is_some_and(|o| o.tx_ref == *tx_ref) {
                        open = None;
                    }
                }
                JournalEvent::Confirmed { .. } | JournalEvent::PersistenceFailed { .. } => {}
            }
        }
        open
    }
}

fn parse_lines(path: &Path, contents: &str) -> Result<Vec<JournalEntry>, JournalError> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| JournalError::Corrupt {
                path: path.to_path_buf(),
                line: i + 1,
                reason: e.to_string(),
            })
        })
        .collect()
}

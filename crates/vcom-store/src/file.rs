//! # Append-Only JSON File Store
//!
//! Layout under the base directory, one set of files per cycle. File stems
//! are the hex encoding of the cycle id's UTF-8 bytes, so any cycle id maps
//! to a safe, reversible file name.
//!
//! ```text
//! {base}/ballots/{cycle_hex}.jsonl      one BallotRecord per line, appended
//! {base}/closed/{cycle_hex}.json        close marker, created once
//! {base}/commitments/{cycle_hex}.json   CommitmentRecord, created once
//! {base}/locks/{cycle_hex}.lock         advisory lock for cast and close
//! ```
//!
//! Commitment and close markers are written to a temporary file, synced, and
//! then hard-linked into place. The link fails with `AlreadyExists` when the
//! target exists, so the filesystem enforces write-once, and a reader never
//! sees a partially written record.
//!
//! `cast` and `close_cycle` hold an exclusive lock on the cycle's lock file,
//! across processes. A ballot is either appended before the close marker
//! exists or rejected, so a closed cycle's snapshot never changes.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use vcom_core::{BallotRecord, CommitmentRecord, CycleId, Timestamp};

use crate::error::StoreError;
use crate::VoteStore;

const BALLOTS_DIR: &str = "ballots";
const CLOSED_DIR: &str = "closed";
const COMMITMENTS_DIR: &str = "commitments";
const LOCKS_DIR: &str = "locks";

static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// File-backed [`VoteStore`].
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    base_dir: PathBuf,
}

impl JsonFileStore {
    /// Create a store rooted at `base_dir`. Directories are created lazily.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// The root directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Append a ballot. Rejected once the ballot's cycle is closed.
    pub async fn cast(&self, ballot: &BallotRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(ballot)?;
        line.push(b'\n');

        let cycle = ballot.cycle.clone();
        let marker = self.path_for(CLOSED_DIR, &cycle, "json");
        let path = self.path_for(BALLOTS_DIR, &cycle, "jsonl");
        self.ensure_dir(BALLOTS_DIR).await?;
        self.with_cycle_lock(&ballot.cycle, move || {
            if marker.try_exists().map_err(|e| StoreError::io(&marker, e))? {
                return Err(StoreError::CycleClosed { cycle });
            }
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| StoreError::io(&path, e))?;
            file.write_all(&line).map_err(|e| StoreError::io(&path, e))?;
            file.sync_data().map_err(|e| StoreError::io(&path, e))
        })
        .await
    }

    fn path_for(&self, dir: &str, cycle: &CycleId, ext: &str) -> PathBuf {
        self.base_dir
            .join(dir)
            .join(format!("{}.{ext}", cycle_file_stem(cycle)))
    }

    async fn ensure_dir(&self, dir: &str) -> Result<(), StoreError> {
        let path = self.base_dir.join(dir);
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))
    }

    /// Run `f` on the blocking pool while holding the cycle's exclusive lock.
    async fn with_cycle_lock<T, F>(&self, cycle: &CycleId, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    {
        self.ensure_dir(LOCKS_DIR).await?;
        let lock_path = self.path_for(LOCKS_DIR, cycle, "lock");
        blocking(move || {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(&lock_path)
                .map_err(|e| StoreError::io(&lock_path, e))?;
            let mut lock = fd_lock::RwLock::new(file);
            let _guard = lock.write().map_err(|e| StoreError::io(&lock_path, e))?;
            f()
        })
        .await
    }
}

async fn blocking<T, F>(f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::Unavailable(format!("file store task failed: {e}")))?
}

/// Install `bytes` at `path` unless it exists. Returns `false` if it does.
///
/// The bytes are synced to a sibling temporary file first, so `path` only
/// ever appears complete.
fn create_once(path: &Path, bytes: &[u8]) -> Result<bool, StoreError> {
    let tmp = temp_path(path);
    let installed = write_synced(&tmp, bytes).and_then(|()| match std::fs::hard_link(&tmp, path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(StoreError::io(path, e)),
    });
    match std::fs::remove_file(&tmp) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %tmp.display(), "could not remove temporary file: {e}"),
    }
    installed
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| StoreError::io(path, e))?;
    file.write_all(bytes).map_err(|e| StoreError::io(path, e))?;
    file.sync_all().map_err(|e| StoreError::io(path, e))
}

fn temp_path(path: &Path) -> PathBuf {
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".tmp-{}-{seq}", std::process::id()));
    path.with_file_name(name)
}

/// Read a file, mapping "not found" to `None`.
async fn read_optional(path: &Path) -> Result<Option<String>, StoreError> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

fn cycle_file_stem(cycle: &CycleId) -> String {
    cycle
        .as_str()
        .as_bytes()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

impl VoteStore for JsonFileStore {
    async fn ballots(&self, cycle: &CycleId) -> Result<Vec<BallotRecord>, StoreError> {
        let path = self.path_for(BALLOTS_DIR, cycle, "jsonl");
        let Some(contents) = read_optional(&path).await? else {
            return Ok(Vec::new());
        };
        contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str::<BallotRecord>(line).map_err(|e| StoreError::Corrupt {
                    location: format!("{}:{}", path.display(), i + 1),
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    async fn commitment(&self, cycle: &CycleId) -> Result<Option<CommitmentRecord>, StoreError> {
        let path = self.path_for(COMMITMENTS_DIR, cycle, "json");
        let Some(contents) = read_optional(&path).await? else {
            return Ok(None);
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                location: path.display().to_string(),
                reason: e.to_string(),
            })
    }

    async fn insert_commitment(&self, record: &CommitmentRecord) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(record)?;
        self.ensure_dir(COMMITMENTS_DIR).await?;
        let path = self.path_for(COMMITMENTS_DIR, &record.cycle, "json");
        let target = path.clone();
        if blocking(move || create_once(&target, &bytes)).await? {
            tracing::debug!(cycle = %record.cycle, path = %path.display(), "commitment written");
            Ok(())
        } else {
            Err(StoreError::DuplicateCommitment {
                cycle: record.cycle.clone(),
            })
        }
    }

    async fn close_cycle(&self, cycle: &CycleId) -> Result<(), StoreError> {
        let marker = serde_json::json!({
            "cycle": cycle,
            "closed_at": Timestamp::now(),
        })
        .to_string()
        .into_bytes();
        self.ensure_dir(CLOSED_DIR).await?;
        let path = self.path_for(CLOSED_DIR, cycle, "json");
        self.with_cycle_lock(cycle, move || create_once(&path, &marker).map(|_| ()))
            .await
    }

    async fn is_closed(&self, cycle: &CycleId) -> Result<bool, StoreError> {
        let path = self.path_for(CLOSED_DIR, cycle, "json");
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| StoreError::io(&path, e))
    }
}

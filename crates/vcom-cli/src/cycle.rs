//! # Cycle Commands
//!
//! ```bash
//! vcom import ballots.jsonl
//! vcom close --cycle 2024
//! vcom root --cycle 2024
//! vcom commit --cycle 2024 --journal state/journal.jsonl
//! vcom status --cycle 2024
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use vcom_commit::{CommitError, SubmissionJournal};
use vcom_core::{BallotRecord, CommitmentRecord, CycleId, Digest32, LeafSchema, TxRef};
use vcom_store::VoteStore;

use crate::backend::{load_config, BackendArgs, ConfigOverrides};

/// Exit code when the root is anchored but the commitment record is missing.
pub const EXIT_NEEDS_REPAIR: u8 = 2;
/// Exit code when every failure is transient and a rerun may succeed.
pub const EXIT_TEMPFAIL: u8 = 75;

/// `vcom import`.
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Ballot file: a JSON array or one JSON object per line.
    pub file: PathBuf,
}

/// `vcom close`.
#[derive(Args, Debug)]
pub struct CloseArgs {
    /// Cycle to close.
    #[arg(long)]
    pub cycle: String,
}

/// `vcom root`.
#[derive(Args, Debug)]
pub struct RootArgs {
    /// Cycle to compute.
    #[arg(long)]
    pub cycle: String,

    #[command(flatten)]
    pub overrides: ConfigOverrides,
}

/// `vcom commit`.
#[derive(Args, Debug)]
pub struct CommitArgs {
    /// Cycles to commit, in order.
    #[arg(long = "cycle", required = true)]
    pub cycles: Vec<String>,

    #[command(flatten)]
    pub overrides: ConfigOverrides,
}

/// `vcom status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Cycle to inspect.
    #[arg(long)]
    pub cycle: String,

    /// Submission journal file.
    #[arg(long)]
    pub journal: Option<PathBuf>,
}

/// Parse a ballot file.
pub fn parse_ballots(raw: &str) -> Result<Vec<BallotRecord>> {
    if raw.trim_start().starts_with('[') {
        return serde_json::from_str(raw).context("parsing ballot array");
    }
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("parsing ballot on line {}", i + 1))
        })
        .collect()
}

/// Execute `vcom import`.
pub async fn run_import(args: &ImportArgs, backend: &BackendArgs) -> Result<u8> {
    let raw = std::fs::read_to_string(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;
    let ballots = parse_ballots(&raw)?;
    let store = backend.open_store().await?;
    for (i, ballot) in ballots.iter().enumerate() {
        store
            .cast(ballot)
            .await
            .with_context(|| format!("casting ballot #{i} ({})", ballot.voter))?;
    }
    println!("imported {} ballots", ballots.len());
    Ok(0)
}

/// Execute `vcom close`.
pub async fn run_close(args: &CloseArgs, backend: &BackendArgs) -> Result<u8> {
    let cycle = CycleId::new(args.cycle.as_str());
    let store = backend.open_store().await?;
    store.close_cycle(&cycle).await?;
    println!("{cycle} closed");
    Ok(0)
}

#[derive(Serialize)]
struct RootReport {
    cycle: CycleId,
    schema: LeafSchema,
    leaf_count: usize,
    root: Digest32,
}

/// Execute `vcom root`.
pub async fn run_root(args: &RootArgs, backend: &BackendArgs, config: Option<&Path>) -> Result<u8> {
    let config = load_config(config, &args.overrides)?;
    let store = backend.open_store().await?;
    let cycle = CycleId::new(args.cycle.as_str());
    let tree =
        vcom_commit::snapshot_tree(&store, &cycle, config.schema, vcom_commit::Stage::Fetch).await?;
    let report = RootReport {
        root: tree.root(),
        leaf_count: tree.leaf_count(),
        schema: tree.schema,
        cycle,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(0)
}

/// Execute `vcom commit`.
pub async fn run_commit(
    args: &CommitArgs,
    backend: &BackendArgs,
    config: Option<&Path>,
) -> Result<u8> {
    let config = load_config(config, &args.overrides)?;
    if config.journal_path.is_none() {
        tracing::warn!("no journal configured: an interrupted commit cannot be resumed");
    }
    let pipeline = backend.pipeline(config).await?;
    let cycles: Vec<CycleId> = args.cycles.iter().map(|c| CycleId::new(c.as_str())).collect();

    let mut failures = Vec::new();
    for (cycle, result) in pipeline.run_cycles(&cycles).await {
        match result {
            Ok(outcome) => println!("{}", serde_json::to_string_pretty(&outcome)?),
            Err(e) => {
                eprintln!("{cycle}: {e}");
                failures.push(e);
            }
        }
    }
    Ok(exit_code(&failures))
}

/// Exit code for a set of cycle failures.
pub fn exit_code(failures: &[CommitError]) -> u8 {
    if failures.is_empty() {
        0
    } else if failures
        .iter()
        .any(|e| matches!(e, CommitError::PersistenceFailedAfterPublish { .. }))
    {
        EXIT_NEEDS_REPAIR
    } else if failures.iter().all(CommitError::is_retryable) {
        EXIT_TEMPFAIL
    } else {
        1
    }
}

#[derive(Serialize)]
struct OpenSubmissionReport {
    tx_ref: TxRef,
    root: Digest32,
    ledger: String,
}

#[derive(Serialize)]
struct StatusReport {
    cycle: CycleId,
    closed: bool,
    ballots: usize,
    commitment: Option<CommitmentRecord>,
    open_submission: Option<OpenSubmissionReport>,
}

/// Execute `vcom status`.
pub async fn run_status(args: &StatusArgs, backend: &BackendArgs) -> Result<u8> {
    let cycle = CycleId::new(args.cycle.as_str());
    let store = backend.open_store().await?;
    let open_submission = match &args.journal {
        Some(path) => SubmissionJournal::open(path)
            .await?
            .open_submission(&cycle)
            .map(|open| OpenSubmissionReport {
                tx_ref: open.tx_ref,
                root: open.root,
                ledger: open.ledger,
            }),
        None => None,
    };
    let report = StatusReport {
        closed: store.is_closed(&cycle).await?,
        ballots: store.ballots(&cycle).await?.len(),
        commitment: store.commitment(&cycle).await?,
        open_submission,
        cycle,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(0)
}

//! # Proof Commands
//!
//! `vcom prove` exports inclusion proofs for a voter from the store.
//! `vcom verify` checks exported bundles offline, and optionally against the
//! ledger.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use vcom_commit::{check_anchor, export_proof, AnchorCheck, ProofBundle};
use vcom_core::{CycleId, PositionId, VoterId};

use crate::backend::BackendArgs;

/// `vcom prove`.
#[derive(Args, Debug)]
pub struct ProveArgs {
    /// Committed cycle.
    #[arg(long)]
    pub cycle: String,

    /// Voter whose ballots to prove.
    #[arg(long)]
    pub voter: String,

    /// Limit to one position.
    #[arg(long)]
    pub position: Option<String>,

    /// Write the bundles here instead of stdout.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

/// `vcom verify`.
#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Bundle file: one bundle or an array of bundles.
    pub bundle: PathBuf,

    /// Also confirm the root is anchored on the configured ledger.
    #[arg(long)]
    pub check_ledger: bool,
}

/// Execute `vcom prove`.
pub async fn run_prove(args: &ProveArgs, backend: &BackendArgs) -> Result<u8> {
    let store = backend.open_store().await?;
    let cycle = CycleId::new(args.cycle.as_str());
    let voter = VoterId::new(args.voter.as_str());
    let position = args.position.as_deref().map(PositionId::new);
    let bundles = export_proof(&store, &cycle, &voter, position.as_ref()).await?;

    let json = serde_json::to_string_pretty(&bundles)?;
    match &args.out {
        Some(path) => {
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            println!("wrote {} proof(s) to {}", bundles.len(), path.display());
        }
        None => println!("{json}"),
    }
    Ok(0)
}

/// Parse a bundle file holding one bundle or an array.
pub fn parse_bundles(raw: &str) -> Result<Vec<ProofBundle>> {
    if raw.trim_start().starts_with('[') {
        serde_json::from_str(raw).context("parsing bundle array")
    } else {
        Ok(vec![serde_json::from_str(raw).context("parsing bundle")?])
    }
}

/// Execute `vcom verify`.
pub async fn run_verify(args: &VerifyArgs, backend: &BackendArgs) -> Result<u8> {
    let raw = std::fs::read_to_string(&args.bundle)
        .with_context(|| format!("reading {}", args.bundle.display()))?;
    let bundles = parse_bundles(&raw)?;
    let ledger = if args.check_ledger {
        Some(backend.open_ledger()?)
    } else {
        None
    };

    let mut failed = 0usize;
    for bundle in &bundles {
        let label = format!("{} {} leaf {}", bundle.cycle, bundle.position, bundle.leaf);
        if let Err(e) = bundle.verify() {
            println!("FAIL  {label}: {e}");
            failed += 1;
            continue;
        }
        if let Some(ledger) = &ledger {
            match check_anchor(ledger, bundle).await? {
                AnchorCheck::Matches(status) => {
                    println!("OK    {label}: anchored in {} ({status})", bundle.tx_ref);
                }
                AnchorCheck::Differs(entry) => {
                    println!(
                        "FAIL  {label}: ledger anchors root {} in {}",
                        entry.root, entry.tx_ref
                    );
                    failed += 1;
                }
                AnchorCheck::Missing => {
                    println!("FAIL  {label}: no anchor on the ledger for {}", bundle.cycle);
                    failed += 1;
                }
            }
        } else {
            println!("OK    {label}: included under root {}", bundle.root);
        }
    }
    Ok(if failed == 0 { 0 } else { 1 })
}

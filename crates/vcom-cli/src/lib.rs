//! # vcom-cli: Vote Commitment CLI
//!
//! Provides the `vcom` command-line interface over the commitment pipeline.
//!
//! ## Subcommands
//!
//! - `vcom import`: Load ballots into the vote store.
//! - `vcom close`: Close a cycle to further ballots.
//! - `vcom root`: Compute a cycle's Merkle root without publishing.
//! - `vcom commit`: Publish and record roots for one or more cycles.
//! - `vcom status`: Commitment, close state and journaled submission.
//! - `vcom prove`: Export inclusion proofs for a voter.
//! - `vcom verify`: Check exported proofs, optionally against the ledger.
//!
//! ```bash
//! vcom --store-dir data import ballots.jsonl
//! vcom --store-dir data close --cycle 2024
//! vcom --store-dir data --ledger evm commit --cycle 2024 --journal data/journal.jsonl
//! vcom --store-dir data prove --cycle 2024 --voter V3 --out v3.json
//! vcom verify v3.json
//! ```

pub mod backend;
pub mod cycle;
pub mod proof;

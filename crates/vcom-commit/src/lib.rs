//! # vcom-commit: Vote Commitment Pipeline
//!
//! Turns a closed election cycle into a tamper-evident commitment:
//!
//! ```text
//! VoteStore ──ballots──▶ encode ──leaves──▶ MerkleTree ──root──▶ RootPublisher ──tx──▶ CommitmentRecorder
//!                                               │                      │                       │
//!                                               └──── export_proof ◀───┴── SubmissionJournal ◀─┘
//! ```
//!
//! - [`CommitmentPipeline::run_cycle`] runs the stages in order and is safe
//!   to rerun for the same cycle.
//! - [`RootPublisher`] anchors a root at most once per cycle, with retries,
//!   timeouts and confirmation polling.
//! - [`CommitmentRecorder`] writes the commitment record after confirmation.
//! - [`SubmissionJournal`] remembers accepted transactions across runs.
//! - [`export_proof`] and [`ProofBundle::verify`] produce and check inclusion
//!   proofs for individual ballots.
//!
//! ## Failure semantics
//!
//! See [`CommitError`]. The one failure that needs an operator is
//! [`CommitError::PersistenceFailedAfterPublish`]: the root is on the ledger
//! but the store has no record of it. Reruns resume from the journal and
//! never anchor a second root for the cycle.

pub mod audit;
pub mod config;
pub mod error;
pub mod journal;
pub mod pipeline;
pub mod publisher;
pub mod recorder;
pub mod retry;

pub use audit::{check_anchor, export_proof, AnchorCheck, ProofBundle, VerifyError};
pub use config::{CommitConfig, ConfigError, Finality};
pub use error::{CommitError, Stage};
pub use journal::{JournalEntry, JournalError, JournalEvent, OpenSubmission, SubmissionJournal};
pub use pipeline::{snapshot_tree, CommitOutcome, CommitmentPipeline, CycleTree};
pub use publisher::{Publication, PublishOutcome, RootPublisher};
pub use recorder::CommitmentRecorder;
pub use retry::RetryPolicy;

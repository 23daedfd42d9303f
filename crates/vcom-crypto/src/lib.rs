//! # vcom-crypto: Merkle Commitment Primitives
//!
//! - **Tree builder** (`merkle.rs`): folds leaf hashes into a single root.
//!   Leaves are sorted and sibling pairs are ordered before hashing, so the
//!   root depends only on the multiset of leaves.
//! - **Proof engine** (`proof.rs`): inclusion proofs for any leaf and
//!   verification of a leaf + proof against a root.
//!
//! ## Crate Policy
//!
//! - Depends only on `vcom-core` internally.
//! - Pure functions, no I/O, no shared mutable state.
//! - Tests use real SHA-256 over real encoded ballots.

pub mod error;
pub mod merkle;
pub mod proof;

pub use error::MerkleError;
pub use merkle::{node_hash, MerkleTree};
pub use proof::{verify, verify_siblings, MerkleProof, ProofStep, Side};

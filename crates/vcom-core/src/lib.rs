//! # vcom-core: Foundational Types for Vote Commitment
//!
//! Defines the data model shared by every crate in the workspace. Depends on
//! nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype identifiers.** `VoterId`, `OptionId`, `PositionId`, `CycleId`
//!    and `TxRef` are distinct types. A cycle id cannot be passed where a
//!    voter id is expected.
//!
//! 2. **`CanonicalLeafBytes` newtype.** The only constructor is
//!    [`leaf::encode()`], which validates the record, sorts and de-duplicates
//!    selections, and serializes with RFC 8785 (JCS). Leaf hashing accepts
//!    only `&CanonicalLeafBytes`.
//!
//! 3. **Domain-separated SHA-256.** Leaves hash as `SHA256(0x00 || bytes)`,
//!    interior nodes as `SHA256(0x01 || lo || hi)`. The prefixes live here so
//!    the encoder and the tree builder cannot disagree.
//!
//! 4. **UTC-only timestamps** truncated to seconds.
//!
//! ## Crate Policy
//!
//! - No dependencies on other `vcom-*` crates.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod ballot;
pub mod commitment;
pub mod digest;
pub mod error;
pub mod identity;
pub mod leaf;
pub mod temporal;

pub use ballot::{BallotRecord, LeafSchema};
pub use commitment::CommitmentRecord;
pub use digest::{Digest32, DIGEST_LEN, LEAF_PREFIX, NODE_PREFIX};
pub use error::{LeafError, ParseError};
pub use identity::{CycleId, OptionId, PositionId, TxRef, VoterId};
pub use leaf::{encode, hash_leaf, leaf_hash, CanonicalLeafBytes};
pub use temporal::Timestamp;

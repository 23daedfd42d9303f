//! Merkle tree and proof errors.

use thiserror::Error;
use vcom_core::Digest32;

/// Errors from tree construction and proof derivation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MerkleError {
    /// No leaves were supplied. An empty commitment has no meaning and must
    /// never be published.
    #[error("cannot build a Merkle tree from an empty leaf set")]
    EmptyLeafSet,

    /// The requested leaf index does not exist.
    #[error("leaf index {index} out of range for {leaf_count} leaves")]
    LeafIndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Leaves in the tree.
        leaf_count: usize,
    },

    /// The leaf hash is not part of the tree.
    #[error("leaf {0} is not in the tree")]
    LeafNotFound(Digest32),

    /// A proof does not fit the claimed tree shape.
    #[error("malformed proof: {0}")]
    MalformedProof(String),
}

//! # Inclusion Proofs
//!
//! A [`MerkleProof`] walks from one leaf to the root. At each level it
//! records either the sibling digest needed to rebuild the parent, or that
//! the node was promoted without a sibling.
//!
//! Verification folds the leaf through the siblings with the same canonical
//! pairing rule as the builder and compares the result to the root bytewise.
//! Promoted levels leave the running digest unchanged.
//!
//! The sibling side is recorded for auditors reading a proof by hand; the
//! pairing rule itself does not need it. [`verify`] still checks that the
//! recorded shape matches the claimed leaf index and leaf count, so a proof
//! cannot be padded or truncated unnoticed.

use serde::{Deserialize, Serialize};
use vcom_core::Digest32;

use crate::error::MerkleError;
use crate::merkle::{level_sizes, node_hash, MerkleTree};

/// Position of a sibling relative to the node on the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Sibling sits to the left.
    Left,
    /// Sibling sits to the right.
    Right,
}

/// One level of an inclusion proof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProofStep {
    /// Combine with this sibling.
    Sibling {
        /// The sibling digest.
        hash: Digest32,
        /// Where the sibling sits.
        side: Side,
    },
    /// The node had no sibling at this level and was promoted unchanged.
    Promoted,
}

/// Inclusion proof for one leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Index of the leaf in tree order (sorted leaves).
    pub leaf_index: usize,
    /// Number of leaves in the tree the proof was derived from.
    pub leaf_count: usize,
    /// Steps from the leaf level up to just below the root.
    pub steps: Vec<ProofStep>,
}

impl MerkleProof {
    /// Sibling digests in path order, skipping promoted levels.
    ///
    /// This is the exported form: a bare list of fixed-size digests.
    pub fn siblings(&self) -> Vec<Digest32> {
        self.steps
            .iter()
            .filter_map(|step| match step {
                ProofStep::Sibling { hash, .. } => Some(*hash),
                ProofStep::Promoted => None,
            })
            .collect()
    }

    /// Rebuild a full proof from the exported sibling list.
    ///
    /// # Errors
    ///
    /// `MerkleError::MalformedProof` if the sibling count does not match the
    /// shape of a tree with `leaf_count` leaves at `leaf_index`.
    pub fn from_siblings(
        leaf_index: usize,
        leaf_count: usize,
        siblings: &[Digest32],
    ) -> Result<Self, MerkleError> {
        let shape = path_shape(leaf_index, leaf_count)?;
        let needed = shape.iter().filter(|s| s.is_some()).count();
        if needed != siblings.len() {
            return Err(MerkleError::MalformedProof(format!(
                "expected {needed} siblings for leaf {leaf_index} of {leaf_count}, got {}",
                siblings.len()
            )));
        }
        let mut remaining = siblings.iter();
        let mut steps = Vec::with_capacity(shape.len());
        for slot in shape {
            match (slot, slot.and_then(|_| remaining.next())) {
                (Some(side), Some(hash)) => steps.push(ProofStep::Sibling { hash: *hash, side }),
                _ => steps.push(ProofStep::Promoted),
            }
        }
        Ok(Self {
            leaf_index,
            leaf_count,
            steps,
        })
    }
}

impl MerkleTree {
    /// Derive the inclusion proof for the leaf at `index` (tree order).
    ///
    /// # Errors
    ///
    /// `MerkleError::LeafIndexOutOfRange` if `index >= leaf_count()`.
    pub fn prove(&self, index: usize) -> Result<MerkleProof, MerkleError> {
        let leaf_count = self.leaf_count();
        if index >= leaf_count {
            return Err(MerkleError::LeafIndexOutOfRange { index, leaf_count });
        }

        let levels = self.levels();
        let mut pos = index;
        let mut steps = Vec::with_capacity(self.depth());
        for level in &levels[..levels.len() - 1] {
            let sibling = pos ^ 1;
            if sibling < level.len() {
                let side = if sibling < pos { Side::Left } else { Side::Right };
                steps.push(ProofStep::Sibling {
                    hash: level[sibling],
                    side,
                });
            } else {
                steps.push(ProofStep::Promoted);
            }
            pos /= 2;
        }

        Ok(MerkleProof {
            leaf_index: index,
            leaf_count,
            steps,
        })
    }

    /// Derive the inclusion proof for a leaf hash.
    ///
    /// # Errors
    ///
    /// `MerkleError::LeafNotFound` if the leaf is not in the tree.
    pub fn prove_leaf(&self, leaf: &Digest32) -> Result<MerkleProof, MerkleError> {
        let index = self.position(leaf).ok_or(MerkleError::LeafNotFound(*leaf))?;
        self.prove(index)
    }
}

/// Verify that `leaf` is included under `root`.
///
/// Returns `false` for any mismatch, including a proof whose step layout
/// does not fit its claimed leaf index and leaf count. Never panics.
pub fn verify(leaf: &Digest32, proof: &MerkleProof, root: &Digest32) -> bool {
    let shape = match path_shape(proof.leaf_index, proof.leaf_count) {
        Ok(shape) => shape,
        Err(_) => return false,
    };
    if shape.len() != proof.steps.len() {
        return false;
    }

    let mut current = *leaf;
    for (expected, step) in shape.iter().zip(&proof.steps) {
        match (expected, step) {
            (Some(side), ProofStep::Sibling { hash, side: recorded }) if side == recorded => {
                current = node_hash(&current, hash);
            }
            (None, ProofStep::Promoted) => {}
            _ => return false,
        }
    }
    current == *root
}

/// Verify a leaf against a bare sibling list (the exported form).
///
/// Folds `leaf` through `siblings` with the canonical pairing rule and
/// compares against `root`. Needs no index or side information.
pub fn verify_siblings(leaf: &Digest32, siblings: &[Digest32], root: &Digest32) -> bool {
    let computed = siblings
        .iter()
        .fold(*leaf, |current, sibling| node_hash(&current, sibling));
    computed == *root
}

/// For each level below the root: `Some(side)` if the node at `leaf_index`'s
/// path has a sibling there, `None` if it is promoted.
fn path_shape(leaf_index: usize, leaf_count: usize) -> Result<Vec<Option<Side>>, MerkleError> {
    if leaf_count == 0 {
        return Err(MerkleError::EmptyLeafSet);
    }
    if leaf_index >= leaf_count {
        return Err(MerkleError::LeafIndexOutOfRange {
            index: leaf_index,
            leaf_count,
        });
    }
    let sizes = level_sizes(leaf_count);
    let mut pos = leaf_index;
    let mut shape = Vec::with_capacity(sizes.len().saturating_sub(1));
    for &size in &sizes[..sizes.len() - 1] {
        let sibling = pos ^ 1;
        shape.push((sibling < size).then(|| {
            if sibling < pos {
                Side::Left
            } else {
                Side::Right
            }
        }));
        pos /= 2;
    }
    Ok(shape)
}

//! # Merkle Tree Builder
//!
//! ## Algorithm
//!
//! 1. Sort the leaf hashes bytewise. Duplicates are kept (multiset).
//! 2. Pair adjacent nodes at the current level. Each pair hashes as
//!    `SHA256(0x01 || lo || hi)` where `lo <= hi` bytewise, so the parent
//!    does not depend on which child is left.
//! 3. An unpaired last node is promoted unchanged to the next level. It is
//!    never paired with itself.
//! 4. Repeat until one node remains: the root.
//!
//! One leaf yields a root equal to that leaf. Zero leaves is an error.
//!
//! Building costs `n - 1` node hashes at most. Every level is kept in memory
//! so proofs are derived in `O(log n)` without rehashing.

use vcom_core::{Digest32, NODE_PREFIX};

use crate::error::MerkleError;

/// Hash two sibling digests under the canonical pairing rule.
pub fn node_hash(a: &Digest32, b: &Digest32) -> Digest32 {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    Digest32::sha256_prefixed(NODE_PREFIX, &[lo.as_bytes(), hi.as_bytes()])
}

/// A fully materialized Merkle tree.
///
/// `levels[0]` holds the sorted leaves; the last level holds only the root.
/// Instances can only be built through [`MerkleTree::build`], so a tree is
/// never observable half-built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    levels: Vec<Vec<Digest32>>,
}

impl MerkleTree {
    /// Build a tree over the given leaf hashes.
    ///
    /// # Errors
    ///
    /// `MerkleError::EmptyLeafSet` if `leaves` is empty.
    pub fn build(mut leaves: Vec<Digest32>) -> Result<Self, MerkleError> {
        if leaves.is_empty() {
            return Err(MerkleError::EmptyLeafSet);
        }
        leaves.sort_unstable();

        let mut levels = vec![leaves];
        loop {
            let current = &levels[levels.len() - 1];
            if current.len() <= 1 {
                break;
            }
            let next = parent_level(current);
            levels.push(next);
        }
        Ok(Self { levels })
    }

    /// The root digest.
    pub fn root(&self) -> Digest32 {
        // `build` guarantees at least one level with exactly one node on top.
        self.levels[self.levels.len() - 1][0]
    }

    /// Number of leaves.
    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// Number of hashing levels above the leaves.
    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    /// Leaves in tree order (sorted).
    pub fn leaves(&self) -> &[Digest32] {
        &self.levels[0]
    }

    /// All levels, leaves first.
    pub fn levels(&self) -> &[Vec<Digest32>] {
        &self.levels
    }

    /// Index of the first occurrence of `leaf` in tree order.
    pub fn position(&self, leaf: &Digest32) -> Option<usize> {
        let leaves = self.leaves();
        let idx = leaves.partition_point(|l| l < leaf);
        (idx < leaves.len() && leaves[idx] == *leaf).then_some(idx)
    }

    /// Whether `leaf` is one of the tree's leaves.
    pub fn contains(&self, leaf: &Digest32) -> bool {
        self.position(leaf).is_some()
    }
}

fn parent_level(level: &[Digest32]) -> Vec<Digest32> {
    level
        .chunks(2)
        .map(|pair| match pair {
            [a, b] => node_hash(a, b),
            // Odd tail: promoted unchanged.
            _ => pair[0],
        })
        .collect()
}

/// Number of nodes at each level for a tree of `leaf_count` leaves,
/// leaves first, root last.
pub(crate) fn level_sizes(leaf_count: usize) -> Vec<usize> {
    let mut sizes = vec![leaf_count];
    let mut n = leaf_count;
    while n > 1 {
        n = n.div_ceil(2);
        sizes.push(n);
    }
    sizes
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcom_core::{leaf_hash, BallotRecord, LeafSchema, LEAF_PREFIX};

    fn leaf(n: u8) -> Digest32 {
        Digest32::sha256_prefixed(LEAF_PREFIX, &[&[n]])
    }

    fn leaves(n: u8) -> Vec<Digest32> {
        (0..n).map(leaf).collect()
    }

    #[test]
    fn empty_leaf_set_rejected() {
        assert_eq!(MerkleTree::build(vec![]), Err(MerkleError::EmptyLeafSet));
    }

    #[test]
    fn single_leaf_root_is_leaf() {
        let l = leaf(1);
        let tree = MerkleTree::build(vec![l]).unwrap();
        assert_eq!(tree.root(), l);
        assert_eq!(tree.depth(), 0);
        assert_eq!(tree.leaf_count(), 1);
    }

    #[test]
    fn two_leaves_hash_as_sorted_pair() {
        let (a, b) = (leaf(1), leaf(2));
        let tree = MerkleTree::build(vec![a, b]).unwrap();
        assert_eq!(tree.root(), node_hash(&a, &b));
        assert_eq!(tree.root(), node_hash(&b, &a));
    }

    #[test]
    fn node_hash_is_symmetric_and_domain_separated() {
        let (a, b) = (leaf(1), leaf(2));
        assert_eq!(node_hash(&a, &b), node_hash(&b, &a));
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let expected = Digest32::sha256_prefixed(NODE_PREFIX, &[lo.as_bytes(), hi.as_bytes()]);
        assert_eq!(node_hash(&a, &b), expected);
        let leaf_style = Digest32::sha256_prefixed(LEAF_PREFIX, &[lo.as_bytes(), hi.as_bytes()]);
        assert_ne!(node_hash(&a, &b), leaf_style);
    }

    #[test]
    fn odd_node_is_promoted_not_duplicated() {
        let mut ls = leaves(3);
        ls.sort();
        let tree = MerkleTree::build(ls.clone()).unwrap();
        let expected = node_hash(&node_hash(&ls[0], &ls[1]), &ls[2]);
        assert_eq!(tree.root(), expected);
        let duplicated = node_hash(&node_hash(&ls[0], &ls[1]), &node_hash(&ls[2], &ls[2]));
        assert_ne!(tree.root(), duplicated);
    }

    #[test]
    fn level_sizes_match_built_tree() {
        for n in 1..=17u8 {
            let tree = MerkleTree::build(leaves(n)).unwrap();
            let built: Vec<usize> = tree.levels().iter().map(Vec::len).collect();
            assert_eq!(built, level_sizes(n as usize), "n = {n}");
        }
    }

    #[test]
    fn input_order_does_not_matter() {
        let ls = leaves(9);
        let mut reversed = ls.clone();
        reversed.reverse();
        assert_eq!(
            MerkleTree::build(ls).unwrap().root(),
            MerkleTree::build(reversed).unwrap().root()
        );
    }

    #[test]
    fn duplicates_are_kept() {
        let a = leaf(1);
        let single = MerkleTree::build(vec![a]).unwrap();
        let doubled = MerkleTree::build(vec![a, a]).unwrap();
        assert_eq!(doubled.leaf_count(), 2);
        assert_ne!(single.root(), doubled.root());
    }

    #[test]
    fn position_finds_first_occurrence() {
        let a = leaf(1);
        let b = leaf(2);
        let tree = MerkleTree::build(vec![b, a, b]).unwrap();
        let idx = tree.position(&b).unwrap();
        assert_eq!(tree.leaves()[idx], b);
        assert!(idx == 0 || tree.leaves()[idx - 1] != b);
        assert!(!tree.contains(&leaf(3)));
    }

    #[test]
    fn tree_over_real_ballots() {
        let records = [
            BallotRecord::new("V1", ["C2"], "P1", "2024"),
            BallotRecord::new("V2", ["C1"], "P1", "2024"),
            BallotRecord::new("V3", ["C1", "C3"], "P2", "2024"),
        ];
        let hashes: Vec<_> = records
            .iter()
            .map(|r| leaf_hash(r, LeafSchema::BallotV1).unwrap())
            .collect();
        let tree = MerkleTree::build(hashes).unwrap();
        assert_eq!(tree.leaf_count(), 3);
        assert_eq!(tree.depth(), 2);
    }
}

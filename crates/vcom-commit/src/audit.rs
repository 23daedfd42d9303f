//! # Proof Export and Verification
//!
//! A [`ProofBundle`] lets a voter or auditor check, without access to the
//! vote store, that one ballot is included under the root anchored on the
//! ledger. It carries the canonical leaf text, so the leaf hash is recomputed
//! rather than trusted.
//!
//! Export rebuilds the tree from the current store snapshot with the schema
//! recorded on the commitment and refuses to answer if the rebuilt root no
//! longer matches.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vcom_core::{CycleId, Digest32, LeafSchema, PositionId, TxRef, VoterId, LEAF_PREFIX};
use vcom_crypto::{verify, MerkleError, MerkleProof};
use vcom_ledger::{Ledger, LedgerEntry, LedgerError, TxStatus};
use vcom_store::VoteStore;

use crate::error::{CommitError, Stage};
use crate::pipeline::snapshot_tree;

/// Self-contained inclusion proof for one ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofBundle {
    /// The cycle.
    pub cycle: CycleId,
    /// Leaf schema of the commitment.
    pub schema: LeafSchema,
    /// Position the ballot was cast for.
    pub position: PositionId,
    /// Canonical leaf JSON.
    pub canonical: String,
    /// `SHA256(0x00 || canonical)`.
    pub leaf: Digest32,
    /// Index of the leaf in the sorted leaf level.
    pub leaf_index: usize,
    /// Leaves in the tree.
    pub leaf_count: usize,
    /// Sibling hashes from leaf to root.
    pub siblings: Vec<Digest32>,
    /// Committed root.
    pub root: Digest32,
    /// Transaction that anchored the root.
    pub tx_ref: TxRef,
    /// Ledger the transaction lives on.
    pub ledger: String,
}

/// Why a bundle failed verification.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum VerifyError {
    /// The canonical text does not hash to the stated leaf.
    #[error("canonical leaf hashes to {computed}, bundle states {stated}")]
    LeafMismatch {
        /// Hash of `canonical`.
        computed: Digest32,
        /// `leaf` field.
        stated: Digest32,
    },

    /// The sibling list does not fit the stated tree shape.
    #[error("malformed proof path: {0}")]
    MalformedPath(#[from] MerkleError),

    /// The path does not lead to the stated root.
    #[error("proof does not lead to root {0}")]
    RootMismatch(Digest32),
}

impl ProofBundle {
    /// Recompute the leaf from `canonical` and fold the path to the root.
    pub fn verify(&self) -> Result<(), VerifyError> {
        let computed = Digest32::sha256_prefixed(LEAF_PREFIX, &[self.canonical.as_bytes()]);
        if computed != self.leaf {
            return Err(VerifyError::LeafMismatch {
                computed,
                stated: self.leaf,
            });
        }
        let proof = MerkleProof::from_siblings(self.leaf_index, self.leaf_count, &self.siblings)?;
        if !verify(&self.leaf, &proof, &self.root) {
            return Err(VerifyError::RootMismatch(self.root));
        }
        Ok(())
    }
}

/// Inclusion proofs for `voter`'s ballots in a committed cycle, optionally
/// limited to one position.
pub async fn export_proof<S: VoteStore>(
    store: &S,
    cycle: &CycleId,
    voter: &VoterId,
    position: Option<&PositionId>,
) -> Result<Vec<ProofBundle>, CommitError> {
    let commitment = store
        .commitment(cycle)
        .await
        .map_err(|e| CommitError::store(cycle, Stage::Audit, e))?
        .ok_or_else(|| CommitError::NotCommitted {
            cycle: cycle.clone(),
        })?;

    let tree = snapshot_tree(store, cycle, commitment.schema, Stage::Audit).await?;
    if tree.root() != commitment.root {
        return Err(CommitError::RootMismatch {
            cycle: cycle.clone(),
            committed: commitment.root,
            rebuilt: tree.root(),
        });
    }

    let bundles = tree
        .ballots
        .iter()
        .enumerate()
        .filter(|(_, b)| b.voter == *voter && position.map_or(true, |p| b.position == *p))
        .map(|(i, ballot)| {
            let leaf = tree.leaves[i];
            let proof = tree
                .tree
                .prove_leaf(&leaf)
                .map_err(|source| CommitError::Proof {
                    cycle: cycle.clone(),
                    source,
                })?;
            Ok(ProofBundle {
                cycle: cycle.clone(),
                schema: commitment.schema,
                position: ballot.position.clone(),
                canonical: String::from_utf8_lossy(tree.encoded[i].as_bytes()).into_owned(),
                leaf,
                leaf_index: proof.leaf_index,
                leaf_count: proof.leaf_count,
                siblings: proof.siblings(),
                root: commitment.root,
                tx_ref: commitment.tx_ref.clone(),
                ledger: commitment.ledger.clone(),
            })
        })
        .collect::<Result<Vec<_>, CommitError>>()?;

    if bundles.is_empty() {
        return Err(CommitError::BallotNotFound {
            cycle: cycle.clone(),
        });
    }
    tracing::info!(%cycle, %voter, proofs = bundles.len(), "inclusion proofs exported");
    Ok(bundles)
}

/// What the ledger holds for a bundle's cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnchorCheck {
    /// The ledger anchors the bundle's root in the bundle's transaction.
    Matches(TxStatus),
    /// The ledger anchors something else for the cycle.
    Differs(LedgerEntry),
    /// The ledger has no anchor for the cycle.
    Missing,
}

/// Look up the bundle's cycle on `ledger` and compare with the bundle.
pub async fn check_anchor<L: Ledger>(
    ledger: &L,
    bundle: &ProofBundle,
) -> Result<AnchorCheck, LedgerError> {
    match ledger.find(&bundle.cycle).await? {
        None => Ok(AnchorCheck::Missing),
        Some(entry) if entry.root == bundle.root && entry.tx_ref == bundle.tx_ref => {
            Ok(AnchorCheck::Matches(ledger.status(&entry.tx_ref).await?))
        }
        Some(entry) => Ok(AnchorCheck::Differs(entry)),
    }
}

//! # Commitment Records
//!
//! A [`CommitmentRecord`] ties an election cycle to the Merkle root that was
//! anchored for it and the ledger transaction that anchored it. One record
//! per cycle, created once after ledger confirmation, never mutated.

use serde::{Deserialize, Serialize};

use crate::ballot::LeafSchema;
use crate::digest::Digest32;
use crate::identity::{CycleId, TxRef};
use crate::temporal::Timestamp;

/// Persisted proof that a cycle's root was anchored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentRecord {
    /// The election cycle committed.
    pub cycle: CycleId,
    /// Merkle root over every ballot in the cycle.
    pub root: Digest32,
    /// Confirmed ledger transaction carrying the root.
    pub tx_ref: TxRef,
    /// Identifier of the ledger the transaction lives on.
    pub ledger: String,
    /// Number of leaves the root was built from.
    pub leaf_count: u64,
    /// Leaf schema the root was built under.
    pub schema: LeafSchema,
    /// When the record was created.
    pub created_at: Timestamp,
}

impl CommitmentRecord {
    /// Create a record stamped with the current time.
    pub fn new(
        cycle: CycleId,
        root: Digest32,
        tx_ref: TxRef,
        ledger: impl Into<String>,
        leaf_count: u64,
        schema: LeafSchema,
    ) -> Self {
        Self {
            cycle,
            root,
            tx_ref,
            ledger: ledger.into(),
            leaf_count,
            schema,
            created_at: Timestamp::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_roundtrip_keeps_every_field() {
        let record = CommitmentRecord::new(
            CycleId::new("2024"),
            Digest32::from_bytes([7; 32]),
            TxRef::new("0xfeed"),
            "mock-ledger",
            3,
            LeafSchema::BallotV1,
        );
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"schema\":\"ballot-v1\""));
        let back: CommitmentRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}

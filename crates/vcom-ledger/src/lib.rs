//! # vcom-ledger: Append-Only Ledger Boundary
//!
//! The commitment pipeline anchors one Merkle root per election cycle on an
//! append-only ledger and keeps the returned transaction reference as
//! evidence. This crate defines the boundary and its implementations.
//!
//! ## Architecture
//!
//! The [`Ledger`] trait is **sealed**: only implementations in this crate
//! are permitted. A ledger that reports `Confirmed` for a transaction that
//! was never durably written would let the system claim an anchor that does
//! not exist.
//!
//! - [`MockLedger`]: in-memory, deterministic transaction ids, with fault
//!   injection for tests.
//! - `EvmLedger` (feature `evm`): EVM JSON-RPC. Signing is delegated to the
//!   RPC endpoint.
//! - [`AnyLedger`]: runtime selection between the two.
//!
//! ## Idempotency
//!
//! [`Ledger::find`] looks up an existing anchor for a cycle. The publisher
//! calls it before every submission so a retried or resumed run reuses the
//! first transaction instead of anchoring twice.

pub mod error;
pub mod mock;

#[cfg(feature = "evm")]
pub mod evm;

use std::future::Future;

use serde::{Deserialize, Serialize};
use vcom_core::{CycleId, Digest32, TxRef};

pub use error::LedgerError;
pub use mock::MockLedger;

#[cfg(feature = "evm")]
pub use evm::{EvmLedger, EvmLedgerConfig};

/// A root to anchor for one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootAnchor {
    /// The election cycle.
    pub cycle: CycleId,
    /// The Merkle root over the cycle's ballots.
    pub root: Digest32,
}

impl RootAnchor {
    /// Pair a cycle with its root.
    pub fn new(cycle: CycleId, root: Digest32) -> Self {
        Self { cycle, root }
    }
}

/// Status of a submitted ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    /// Accepted but not yet included, or included with too few confirmations.
    Pending,
    /// Included with the configured number of confirmations.
    Confirmed,
    /// Irreversible.
    Finalized,
    /// Included but failed (reverted).
    Failed,
    /// The ledger has no record of the transaction.
    Unknown,
}

impl TxStatus {
    /// Whether the status meets `required`.
    ///
    /// `Finalized` satisfies `Confirmed`; nothing else satisfies anything.
    pub fn satisfies(self, required: TxStatus) -> bool {
        match required {
            TxStatus::Confirmed => matches!(self, TxStatus::Confirmed | TxStatus::Finalized),
            TxStatus::Finalized => self == TxStatus::Finalized,
            other => self == other,
        }
    }
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Finalized => "finalized",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// An anchor found on the ledger for a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// The cycle the anchor belongs to.
    pub cycle: CycleId,
    /// The anchored root.
    pub root: Digest32,
    /// The transaction that wrote it.
    pub tx_ref: TxRef,
}

/// Append-only ledger that anchors one root per cycle.
///
/// Sealed: only implementations within this crate are permitted.
///
/// ## Invariant
///
/// `status` must only report `Confirmed` or `Finalized` once the anchor is
/// durably recorded on the ledger.
pub trait Ledger: private::Sealed + Send + Sync {
    /// Identifier recorded on every commitment (e.g. `"mock"`, `"base-sepolia"`).
    fn ledger_id(&self) -> &str;

    /// Submit an anchor. Returns the transaction reference once the ledger
    /// has accepted the transaction; it may still be pending.
    fn submit(&self, anchor: &RootAnchor)
        -> impl Future<Output = Result<TxRef, LedgerError>> + Send;

    /// Current status of a submitted transaction.
    fn status(&self, tx: &TxRef) -> impl Future<Output = Result<TxStatus, LedgerError>> + Send;

    /// The earliest non-failed anchor for `cycle`, if any.
    fn find(
        &self,
        cycle: &CycleId,
    ) -> impl Future<Output = Result<Option<LedgerEntry>, LedgerError>> + Send;
}

mod private {
    pub trait Sealed {}
    impl Sealed for super::MockLedger {}
    impl Sealed for super::AnyLedger {}
    #[cfg(feature = "evm")]
    impl Sealed for super::EvmLedger {}
}

/// Runtime-selected ledger.
#[derive(Debug)]
pub enum AnyLedger {
    /// In-memory ledger.
    Mock(MockLedger),
    /// EVM JSON-RPC ledger.
    #[cfg(feature = "evm")]
    Evm(EvmLedger),
}

impl From<MockLedger> for AnyLedger {
    fn from(ledger: MockLedger) -> Self {
        Self::Mock(ledger)
    }
}

#[cfg(feature = "evm")]
impl From<EvmLedger> for AnyLedger {
    fn from(ledger: EvmLedger) -> Self {
        Self::Evm(ledger)
    }
}

impl Ledger for AnyLedger {
    fn ledger_id(&self) -> &str {
        match self {
            Self::Mock(l) => l.ledger_id(),
            #[cfg(feature = "evm")]
            Self::Evm(l) => l.ledger_id(),
        }
    }

    async fn submit(&self, anchor: &RootAnchor) -> Result<TxRef, LedgerError> {
        match self {
            Self::Mock(l) => l.submit(anchor).await,
            #[cfg(feature = "evm")]
            Self::Evm(l) => l.submit(anchor).await,
        }
    }

    async fn status(&self, tx: &TxRef) -> Result<TxStatus, LedgerError> {
        match self {
            Self::Mock(l) => l.status(tx).await,
            #[cfg(feature = "evm")]
            Self::Evm(l) => l.status(tx).await,
        }
    }

    async fn find(&self, cycle: &CycleId) -> Result<Option<LedgerEntry>, LedgerError> {
        match self {
            Self::Mock(l) => l.find(cycle).await,
            #[cfg(feature = "evm")]
            Self::Evm(l) => l.find(cycle).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalized_satisfies_confirmed() {
        assert!(TxStatus::Finalized.satisfies(TxStatus::Confirmed));
        assert!(TxStatus::Confirmed.satisfies(TxStatus::Confirmed));
        assert!(!TxStatus::Confirmed.satisfies(TxStatus::Finalized));
        assert!(!TxStatus::Pending.satisfies(TxStatus::Confirmed));
        assert!(!TxStatus::Failed.satisfies(TxStatus::Confirmed));
    }

    #[test]
    fn status_serde_is_snake_case() {
        let json = serde_json::to_string(&TxStatus::Finalized).unwrap();
        assert_eq!(json, "\"finalized\"");
        let back: TxStatus = serde_json::from_str("\"unknown\"").unwrap();
        assert_eq!(back, TxStatus::Unknown);
    }

    #[tokio::test]
    async fn any_ledger_dispatches_to_mock() {
        let ledger = AnyLedger::from(MockLedger::new("mock"));
        assert_eq!(ledger.ledger_id(), "mock");
        let anchor = RootAnchor::new(CycleId::new("2024"), Digest32::from_bytes([1; 32]));
        let tx = ledger.submit(&anchor).await.unwrap();
        assert_eq!(ledger.status(&tx).await.unwrap(), TxStatus::Finalized);
        let found = ledger.find(&anchor.cycle).await.unwrap().unwrap();
        assert_eq!(found.tx_ref, tx);
        assert_eq!(found.root, anchor.root);
    }
}

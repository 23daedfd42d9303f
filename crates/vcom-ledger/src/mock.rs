//! # Mock Ledger
//!
//! In-memory ledger for development and tests. Transactions are recorded
//! immediately and are `Finalized` unless a fault is injected.
//!
//! Behaves like a write-once contract: a second anchor for a cycle that
//! already has a live anchor is rejected.
//!
//! ## Fault Injection
//!
//! | Method                          | Effect                                                        |
//! |---------------------------------|---------------------------------------------------------------|
//! | [`MockLedger::fail_next_submits`] | next `n` submits return `Unavailable`, nothing recorded      |
//! | [`MockLedger::reject_next_submit`] | next submit returns `Rejected`                              |
//! | [`MockLedger::lose_next_response`] | next submit is recorded but the caller sees `Unavailable`  |
//! | [`MockLedger::fail_next_transaction`] | next recorded transaction reports `Failed`              |
//! | [`MockLedger::with_pending_polls`] | each transaction reports `Pending` for `n` status polls   |
//! | [`MockLedger::with_submit_delay`]  | submit sleeps before answering                             |
//! | [`MockLedger::set_unavailable`]    | every call returns `Unavailable` until cleared             |
//!
//! This implementation provides NO durability. It is suitable only for
//! development, testing and dry runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use vcom_core::{CycleId, TxRef};

use crate::error::LedgerError;
use crate::{Ledger, LedgerEntry, RootAnchor, TxStatus};

#[derive(Debug)]
struct MockTx {
    anchor: RootAnchor,
    failed: bool,
    pending_polls_left: u32,
}

#[derive(Debug, Default)]
struct Faults {
    fail_submits: u32,
    reject_next: Option<String>,
    lose_next_response: bool,
    fail_next_transaction: bool,
    unavailable: bool,
}

#[derive(Debug, Default)]
struct State {
    txs: HashMap<String, MockTx>,
    order: Vec<String>,
    faults: Faults,
}

/// In-memory ledger with deterministic transaction ids.
#[derive(Debug, Default)]
pub struct MockLedger {
    ledger_id: String,
    pending_polls: u32,
    submit_delay: Option<Duration>,
    next_seq: AtomicU64,
    submit_calls: AtomicU64,
    state: Mutex<State>,
}

impl MockLedger {
    /// Create an empty mock ledger.
    pub fn new(ledger_id: impl Into<String>) -> Self {
        Self {
            ledger_id: ledger_id.into(),
            next_seq: AtomicU64::new(1),
            ..Self::default()
        }
    }

    /// Every transaction reports `Pending` for its first `polls` status calls.
    pub fn with_pending_polls(mut self, polls: u32) -> Self {
        self.pending_polls = polls;
        self
    }

    /// Sleep for `delay` inside every submit.
    pub fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = Some(delay);
        self
    }

    /// The next `n` submits fail as `Unavailable` without recording anything.
    pub fn fail_next_submits(&self, n: u32) {
        self.state.lock().faults.fail_submits = n;
    }

    /// The next submit is rejected with `reason`.
    pub fn reject_next_submit(&self, reason: impl Into<String>) {
        self.state.lock().faults.reject_next = Some(reason.into());
    }

    /// The next submit is recorded, but the caller receives `Unavailable`.
    pub fn lose_next_response(&self) {
        self.state.lock().faults.lose_next_response = true;
    }

    /// The next recorded transaction reports `Failed`.
    pub fn fail_next_transaction(&self) {
        self.state.lock().faults.fail_next_transaction = true;
    }

    /// Make every call fail as `Unavailable` until called with `false`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().faults.unavailable = unavailable;
    }

    /// Number of submit calls received, including failed ones.
    pub fn submit_calls(&self) -> u64 {
        self.submit_calls.load(Ordering::SeqCst)
    }

    /// Number of transactions recorded.
    pub fn transaction_count(&self) -> usize {
        self.state.lock().order.len()
    }

    /// All recorded anchors in submission order.
    pub fn anchors(&self) -> Vec<(TxRef, RootAnchor)> {
        let state = self.state.lock();
        state
            .order
            .iter()
            .filter_map(|id| {
                state
                    .txs
                    .get(id)
                    .map(|tx| (TxRef::new(id.clone()), tx.anchor.clone()))
            })
            .collect()
    }

    fn live_entry(state: &State, cycle: &CycleId) -> Option<LedgerEntry> {
        state.order.iter().find_map(|id| {
            let tx = state.txs.get(id)?;
            (!tx.failed && tx.anchor.cycle == *cycle).then(|| LedgerEntry {
                cycle: tx.anchor.cycle.clone(),
                root: tx.anchor.root,
                tx_ref: TxRef::new(id.clone()),
            })
        })
    }

    fn record(&self, anchor: &RootAnchor) -> Result<TxRef, LedgerError> {
        let mut state = self.state.lock();
        let faults = &mut state.faults;
        if faults.unavailable {
            return Err(LedgerError::unavailable(&self.ledger_id, "ledger offline"));
        }
        if faults.fail_submits > 0 {
            faults.fail_submits -= 1;
            return Err(LedgerError::unavailable(&self.ledger_id, "injected outage"));
        }
        if let Some(reason) = faults.reject_next.take() {
            return Err(LedgerError::rejected(&self.ledger_id, reason));
        }
        if let Some(existing) = Self::live_entry(&state, &anchor.cycle) {
            return Err(LedgerError::rejected(
                &self.ledger_id,
                format!(
                    "{} already anchored in {}",
                    anchor.cycle, existing.tx_ref
                ),
            ));
        }

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let hex = anchor.root.to_hex();
        let id = format!("mock-tx-{seq}-{}", hex.get(..16).unwrap_or(&hex));
        let failed = std::mem::take(&mut state.faults.fail_next_transaction);
        state.txs.insert(
            id.clone(),
            MockTx {
                anchor: anchor.clone(),
                failed,
                pending_polls_left: self.pending_polls,
            },
        );
        state.order.push(id.clone());

        if std::mem::take(&mut state.faults.lose_next_response) {
            return Err(LedgerError::unavailable(
                &self.ledger_id,
                "connection reset after submit",
            ));
        }
        Ok(TxRef::new(id))
    }
}

impl Ledger for MockLedger {
    fn ledger_id(&self) -> &str {
        &self.ledger_id
    }

    async fn submit(&self, anchor: &RootAnchor) -> Result<TxRef, LedgerError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.submit_delay {
            tokio::time::sleep(delay).await;
        }
        let result = self.record(anchor);
        tracing::debug!(
            ledger = %self.ledger_id,
            cycle = %anchor.cycle,
            root = %anchor.root,
            ok = result.is_ok(),
            "mock ledger submit"
        );
        result
    }

    async fn status(&self, tx: &TxRef) -> Result<TxStatus, LedgerError> {
        let mut state = self.state.lock();
        if state.faults.unavailable {
            return Err(LedgerError::unavailable(&self.ledger_id, "ledger offline"));
        }
        let Some(entry) = state.txs.get_mut(tx.as_str()) else {
            return Ok(TxStatus::Unknown);
        };
        if entry.failed {
            return Ok(TxStatus::Failed);
        }
        if entry.pending_polls_left > 0 {
            entry.pending_polls_left -= 1;
            return Ok(TxStatus::Pending);
        }
        Ok(TxStatus::Finalized)
    }

    async fn find(&self, cycle: &CycleId) -> Result<Option<LedgerEntry>, LedgerError> {
        let state = self.state.lock();
        if state.faults.unavailable {
            return Err(LedgerError::unavailable(&self.ledger_id, "ledger offline"));
        }
        Ok(Self::live_entry(&state, cycle))
    }
}

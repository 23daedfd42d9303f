//! # EVM JSON-RPC Ledger
//!
//! Anchors cycle roots on an EVM-compatible chain through a small write-once
//! registry contract.
//!
//! ## Contract Interface
//!
//! ```solidity
//! event RootCommitted(bytes32 indexed cycle, bytes32 root);
//! function commitRoot(bytes32 cycle, bytes32 root) external;
//! ```
//!
//! `commitRoot` must revert when `cycle` already has a root.
//!
//! ## How It Works
//!
//! 1. Cycle ids map to `bytes32` as `keccak256(utf8(cycle))`.
//! 2. `submit` calls `commitRoot` via `eth_sendTransaction`. The RPC endpoint
//!    signs for `from_address`; this ledger holds no private keys.
//! 3. `status` reads `eth_getTransactionReceipt` and compares the receipt's
//!    block against `eth_blockNumber` for the confirmation depth.
//! 4. `find` queries `eth_getLogs` for `RootCommitted` with the cycle topic.

use std::time::Duration;

use sha3::{Digest as _, Keccak256};
use vcom_core::{CycleId, Digest32, TxRef};

use crate::error::LedgerError;
use crate::{Ledger, LedgerEntry, RootAnchor, TxStatus};

const COMMIT_ROOT_SIGNATURE: &str = "commitRoot(bytes32,bytes32)";
const ROOT_COMMITTED_SIGNATURE: &str = "RootCommitted(bytes32,bytes32)";

/// Configuration for [`EvmLedger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvmLedgerConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,
    /// Registry contract address (`0x` + 40 hex chars).
    pub contract_address: String,
    /// Sender address signed for by the RPC provider.
    pub from_address: String,
    /// Human-readable chain name, used as the ledger id.
    pub chain_name: String,
    /// EVM chain id (1 for Ethereum mainnet, 8453 for Base).
    pub chain_id: u64,
    /// Confirmations before a transaction reports `Confirmed`.
    pub confirmations_for_confirmed: u64,
    /// Confirmations before a transaction reports `Finalized`.
    pub confirmations_for_finalized: u64,
    /// First block searched by `find`. Set to the contract's deployment
    /// block to keep log queries small.
    pub from_block: u64,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl EvmLedgerConfig {
    /// Configuration with defaults: 1 confirmation for `Confirmed`, 12 for
    /// `Finalized`, logs from block 0, 30s timeout.
    pub fn new(
        rpc_url: impl Into<String>,
        contract_address: impl Into<String>,
        from_address: impl Into<String>,
        chain_name: impl Into<String>,
        chain_id: u64,
    ) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            contract_address: contract_address.into(),
            from_address: from_address.into(),
            chain_name: chain_name.into(),
            chain_id,
            confirmations_for_confirmed: 1,
            confirmations_for_finalized: 12,
            from_block: 0,
            timeout_secs: 30,
        }
    }

    /// Set the finality thresholds.
    pub fn with_finality(mut self, confirmed: u64, finalized: u64) -> Self {
        self.confirmations_for_confirmed = confirmed;
        self.confirmations_for_finalized = finalized;
        self
    }

    /// Set the first block searched for existing anchors.
    pub fn with_from_block(mut self, block: u64) -> Self {
        self.from_block = block;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// | Variable                          | Required | Default |
    /// |-----------------------------------|----------|---------|
    /// | `VCOM_EVM_RPC_URL`                | yes      |         |
    /// | `VCOM_EVM_CONTRACT`               | yes      |         |
    /// | `VCOM_EVM_FROM`                   | yes      |         |
    /// | `VCOM_EVM_CHAIN_NAME`             | no       | `evm`   |
    /// | `VCOM_EVM_CHAIN_ID`               | no       | `1`     |
    /// | `VCOM_EVM_CONFIRMATIONS`          | no       | `1`     |
    /// | `VCOM_EVM_FINALITY_CONFIRMATIONS` | no       | `12`    |
    /// | `VCOM_EVM_FROM_BLOCK`             | no       | `0`     |
    /// | `VCOM_EVM_TIMEOUT_SECS`           | no       | `30`    |
    pub fn from_env() -> Result<Self, LedgerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        get: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, LedgerError> {
        let required = |key: &str| {
            get(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| LedgerError::InvalidConfig(format!("{key} is required")))
        };
        let number = |key: &str, default: u64| -> Result<u64, LedgerError> {
            match get(key) {
                Some(raw) => raw.trim().parse().map_err(|e| {
                    LedgerError::InvalidConfig(format!("{key} must be an integer: {e}"))
                }),
                None => Ok(default),
            }
        };

        Ok(Self {
            rpc_url: required("VCOM_EVM_RPC_URL")?,
            contract_address: required("VCOM_EVM_CONTRACT")?,
            from_address: required("VCOM_EVM_FROM")?,
            chain_name: get("VCOM_EVM_CHAIN_NAME").unwrap_or_else(|| "evm".to_string()),
            chain_id: number("VCOM_EVM_CHAIN_ID", 1)?,
            confirmations_for_confirmed: number("VCOM_EVM_CONFIRMATIONS", 1)?,
            confirmations_for_finalized: number("VCOM_EVM_FINALITY_CONFIRMATIONS", 12)?,
            from_block: number("VCOM_EVM_FROM_BLOCK", 0)?,
            timeout_secs: number("VCOM_EVM_TIMEOUT_SECS", 30)?,
        })
    }
}

/// EVM JSON-RPC ledger.
#[derive(Debug)]
pub struct EvmLedger {
    client: reqwest::Client,
    rpc_url: url::Url,
    config: EvmLedgerConfig,
}

impl EvmLedger {
    /// Validate the configuration and build the HTTP client.
    pub fn new(config: EvmLedgerConfig) -> Result<Self, LedgerError> {
        let rpc_url = url::Url::parse(&config.rpc_url).map_err(|e| {
            LedgerError::InvalidConfig(format!("invalid RPC URL {:?}: {e}", config.rpc_url))
        })?;
        if !matches!(rpc_url.scheme(), "http" | "https") {
            return Err(LedgerError::InvalidConfig(format!(
                "RPC URL must be http(s), got {}",
                rpc_url.scheme()
            )));
        }
        if !is_valid_eth_address(&config.contract_address) {
            return Err(LedgerError::InvalidConfig(format!(
                "invalid contract address: {}",
                config.contract_address
            )));
        }
        if !is_valid_eth_address(&config.from_address) {
            return Err(LedgerError::InvalidConfig(format!(
                "invalid from address: {}",
                config.from_address
            )));
        }
        if config.confirmations_for_finalized < config.confirmations_for_confirmed {
            return Err(LedgerError::InvalidConfig(
                "finality confirmations must be >= confirmations".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                LedgerError::InvalidConfig(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            rpc_url,
            config,
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &EvmLedgerConfig {
        &self.config
    }

    /// Send a JSON-RPC request and return its `result` field.
    async fn rpc_call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, LedgerError> {
        let ledger = &self.config.chain_name;
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let resp = self
            .client
            .post(self.rpc_url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LedgerError::unavailable(ledger, format!("{method}: request timed out"))
                } else {
                    LedgerError::unavailable(ledger, format!("{method}: {e}"))
                }
            })?;

        if !resp.status().is_success() {
            return Err(LedgerError::unavailable(
                ledger,
                format!("{method}: HTTP {}", resp.status()),
            ));
        }

        let json: serde_json::Value = resp.json().await.map_err(|e| {
            LedgerError::unavailable(ledger, format!("{method}: invalid JSON response: {e}"))
        })?;

        if let Some(error) = json.get("error") {
            return Err(rpc_error(ledger, method, error));
        }

        json.get("result").cloned().ok_or_else(|| {
            LedgerError::unavailable(
                ledger,
                format!("{method}: JSON-RPC response missing 'result' field"),
            )
        })
    }

    async fn block_number(&self) -> Result<u64, LedgerError> {
        let value = self.rpc_call("eth_blockNumber", serde_json::json!([])).await?;
        value
            .as_str()
            .and_then(parse_quantity)
            .ok_or_else(|| {
                LedgerError::unavailable(
                    &self.config.chain_name,
                    format!("eth_blockNumber returned {value}"),
                )
            })
    }
}

impl Ledger for EvmLedger {
    fn ledger_id(&self) -> &str {
        &self.config.chain_name
    }

    async fn submit(&self, anchor: &RootAnchor) -> Result<TxRef, LedgerError> {
        let tx = serde_json::json!({
            "from": self.config.from_address,
            "to": self.config.contract_address,
            "data": encode_commit_root(&anchor.cycle, &anchor.root),
        });
        let result = self
            .rpc_call("eth_sendTransaction", serde_json::json!([tx]))
            .await?;
        let hash = result.as_str().ok_or_else(|| {
            LedgerError::unavailable(
                &self.config.chain_name,
                "eth_sendTransaction returned non-string result",
            )
        })?;
        tracing::info!(
            ledger = %self.config.chain_name,
            cycle = %anchor.cycle,
            root = %anchor.root,
            tx = hash,
            "anchor transaction sent"
        );
        Ok(TxRef::new(hash))
    }

    async fn status(&self, tx: &TxRef) -> Result<TxStatus, LedgerError> {
        let receipt = self
            .rpc_call("eth_getTransactionReceipt", serde_json::json!([tx.as_str()]))
            .await?;

        if receipt.is_null() {
            let known = self
                .rpc_call("eth_getTransactionByHash", serde_json::json!([tx.as_str()]))
                .await?;
            return Ok(if known.is_null() {
                TxStatus::Unknown
            } else {
                TxStatus::Pending
            });
        }

        let succeeded = receipt
            .get("status")
            .and_then(|s| s.as_str())
            .and_then(parse_quantity)
            == Some(1);
        if !succeeded {
            return Ok(TxStatus::Failed);
        }

        let Some(tx_block) = receipt
            .get("blockNumber")
            .and_then(|b| b.as_str())
            .and_then(parse_quantity)
        else {
            return Ok(TxStatus::Pending);
        };
        let head = self.block_number().await?;
        // The inclusion block counts as the first confirmation.
        let confirmations = head.saturating_sub(tx_block) + 1;

        Ok(if confirmations >= self.config.confirmations_for_finalized {
            TxStatus::Finalized
        } else if confirmations >= self.config.confirmations_for_confirmed {
            TxStatus::Confirmed
        } else {
            TxStatus::Pending
        })
    }

    async fn find(&self, cycle: &CycleId) -> Result<Option<LedgerEntry>, LedgerError> {
        let filter = serde_json::json!({
            "address": self.config.contract_address,
            "fromBlock": format!("0x{:x}", self.config.from_block),
            "toBlock": "latest",
            "topics": [
                to_hex32(&keccak256(ROOT_COMMITTED_SIGNATURE.as_bytes())),
                to_hex32(&cycle_key(cycle)),
            ],
        });
        let logs = self.rpc_call("eth_getLogs", serde_json::json!([filter])).await?;
        let logs = logs.as_array().ok_or_else(|| {
            LedgerError::unavailable(&self.config.chain_name, "eth_getLogs returned non-array")
        })?;

        for log in logs {
            if log.get("removed").and_then(|r| r.as_bool()) == Some(true) {
                continue;
            }
            let data = log.get("data").and_then(|d| d.as_str()).unwrap_or_default();
            let root = Digest32::from_hex(data).map_err(|e| {
                LedgerError::unavailable(
                    &self.config.chain_name,
                    format!("malformed RootCommitted log data: {e}"),
                )
            })?;
            let tx_hash = log
                .get("transactionHash")
                .and_then(|h| h.as_str())
                .ok_or_else(|| {
                    LedgerError::unavailable(
                        &self.config.chain_name,
                        "RootCommitted log without transactionHash",
                    )
                })?;
            return Ok(Some(LedgerEntry {
                cycle: cycle.clone(),
                root,
                tx_ref: TxRef::new(tx_hash),
            }));
        }
        Ok(None)
    }
}

/// JSON-RPC error codes a node returns when it is overloaded or briefly
/// behind: internal error, resource unavailable, limit exceeded.
const TRANSIENT_RPC_CODES: [i64; 3] = [-32603, -32002, -32005];

/// Messages that geth-style nodes attach to the generic `-32000` code when
/// the request may succeed on retry.
const TRANSIENT_RPC_MESSAGES: [&str; 5] = [
    "header not found",
    "rate limit",
    "too many requests",
    "timeout",
    "busy",
];

/// Map a JSON-RPC `error` object to a ledger error. Overload and lag become
/// [`LedgerError::Unavailable`] so callers retry; the rest are rejections.
fn rpc_error(ledger: &str, method: &str, error: &serde_json::Value) -> LedgerError {
    let code = error.get("code").and_then(|c| c.as_i64());
    let msg = error
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("unknown RPC error");
    let lowered = msg.to_ascii_lowercase();
    let transient = code.is_some_and(|c| TRANSIENT_RPC_CODES.contains(&c))
        || (code == Some(-32000) && TRANSIENT_RPC_MESSAGES.iter().any(|m| lowered.contains(m)));
    let reason = match code {
        Some(code) => format!("{method}: {msg} (code {code})"),
        None => format!("{method}: {msg}"),
    };
    if transient {
        LedgerError::unavailable(ledger, reason)
    } else {
        LedgerError::rejected(ledger, reason)
    }
}

fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(data));
    out
}

/// `bytes32` key for a cycle id.
pub fn cycle_key(cycle: &CycleId) -> [u8; 32] {
    keccak256(cycle.as_str().as_bytes())
}

fn to_hex32(bytes: &[u8; 32]) -> String {
    Digest32::from_bytes(*bytes).to_prefixed_hex()
}

/// ABI calldata for `commitRoot(bytes32 cycle, bytes32 root)`.
fn encode_commit_root(cycle: &CycleId, root: &Digest32) -> String {
    let selector = keccak256(COMMIT_ROOT_SIGNATURE.as_bytes());
    let selector_hex: String = selector[..4].iter().map(|b| format!("{b:02x}")).collect();
    format!(
        "0x{selector_hex}{}{}",
        Digest32::from_bytes(cycle_key(cycle)).to_hex(),
        root.to_hex()
    )
}

/// Parse a JSON-RPC hex quantity (`0x1a`).
fn parse_quantity(s: &str) -> Option<u64> {
    let digits = s.strip_prefix("0x")?;
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, 16).ok()
}

fn is_valid_eth_address(addr: &str) -> bool {
    addr.len() == 42
        && addr.starts_with("0x")
        && addr[2..].chars().all(|c| c.is_ascii_hexdigit())
}

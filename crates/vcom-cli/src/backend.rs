//! Store, ledger and configuration selection shared by every subcommand.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use vcom_commit::{CommitConfig, CommitmentPipeline, Finality, SubmissionJournal};
use vcom_core::LeafSchema;
use vcom_ledger::{AnyLedger, MockLedger};
use vcom_store::{AnyVoteStore, JsonFileStore};

/// Vote store backends.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Append-only JSON files under `--store-dir`.
    File,
    /// Postgres at `--database-url`.
    Postgres,
}

/// Ledger backends.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerKind {
    /// In-process ledger. Anchors vanish when the command exits.
    Mock,
    /// EVM JSON-RPC ledger configured through `VCOM_EVM_*`.
    Evm,
}

/// Backend selection flags.
#[derive(Args, Debug, Clone)]
pub struct BackendArgs {
    /// Vote store backend.
    #[arg(long, value_enum, env = "VCOM_STORE", default_value_t = StoreKind::File, global = true)]
    pub store: StoreKind,

    /// Base directory of the file store.
    #[arg(long, env = "VCOM_STORE_DIR", default_value = "vcom-data", global = true)]
    pub store_dir: PathBuf,

    /// Postgres connection URL.
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    pub database_url: Option<String>,

    /// Ledger backend.
    #[arg(long, value_enum, env = "VCOM_LEDGER", default_value_t = LedgerKind::Mock, global = true)]
    pub ledger: LedgerKind,
}

impl BackendArgs {
    /// Open the selected vote store.
    pub async fn open_store(&self) -> Result<AnyVoteStore> {
        match self.store {
            StoreKind::File => {
                tracing::debug!(dir = %self.store_dir.display(), "using file store");
                Ok(JsonFileStore::new(&self.store_dir).into())
            }
            StoreKind::Postgres => self.open_postgres().await,
        }
    }

    #[cfg(feature = "postgres")]
    async fn open_postgres(&self) -> Result<AnyVoteStore> {
        let url = self
            .database_url
            .as_deref()
            .context("--store postgres needs --database-url or DATABASE_URL")?;
        let store = vcom_store::PgVoteStore::connect(url)
            .await
            .context("connecting to Postgres")?;
        Ok(store.into())
    }

    #[cfg(not(feature = "postgres"))]
    async fn open_postgres(&self) -> Result<AnyVoteStore> {
        anyhow::bail!("this build does not include the `postgres` feature")
    }

    /// Build the selected ledger.
    pub fn open_ledger(&self) -> Result<AnyLedger> {
        match self.ledger {
            LedgerKind::Mock => {
                tracing::warn!("mock ledger selected: anchors are not persisted");
                Ok(MockLedger::new("mock").into())
            }
            LedgerKind::Evm => open_evm(),
        }
    }

    /// Open store, ledger and journal and assemble a pipeline.
    pub async fn pipeline(
        &self,
        config: CommitConfig,
    ) -> Result<CommitmentPipeline<AnyVoteStore, AnyLedger>> {
        let store = self.open_store().await?;
        let ledger = self.open_ledger()?;
        let journal = match &config.journal_path {
            Some(path) => SubmissionJournal::open(path)
                .await
                .with_context(|| format!("opening journal {}", path.display()))?,
            None => SubmissionJournal::in_memory(),
        };
        Ok(CommitmentPipeline::new(store, ledger, journal, config))
    }
}

#[cfg(feature = "evm")]
fn open_evm() -> Result<AnyLedger> {
    let config = vcom_ledger::EvmLedgerConfig::from_env()?;
    tracing::info!(
        chain = %config.chain_name,
        chain_id = config.chain_id,
        contract = %config.contract_address,
        "using EVM ledger"
    );
    Ok(vcom_ledger::EvmLedger::new(config)?.into())
}

#[cfg(not(feature = "evm"))]
fn open_evm() -> Result<AnyLedger> {
    anyhow::bail!("this build does not include the `evm` feature")
}

/// Flags that override the pipeline configuration.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Leaf schema for new commitments (`ballot-v1` or `selection-v1`).
    #[arg(long)]
    pub schema: Option<LeafSchema>,

    /// Commit even if the cycle is not closed.
    #[arg(long)]
    pub allow_open: bool,

    /// Status required before recording (`confirmed` or `finalized`).
    #[arg(long)]
    pub finality: Option<Finality>,

    /// Submission journal file.
    #[arg(long)]
    pub journal: Option<PathBuf>,
}

/// Resolve the configuration: file (or defaults), then `VCOM_*`, then flags.
pub fn load_config(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<CommitConfig> {
    let base = match path {
        Some(path) => CommitConfig::from_yaml_file(path)?,
        None => CommitConfig::default(),
    };
    let mut config = base.with_env_overrides()?;
    if let Some(schema) = overrides.schema {
        config.schema = schema;
    }
    if overrides.allow_open {
        config.allow_open_cycle = true;
    }
    if let Some(finality) = overrides.finality {
        config.finality = finality;
    }
    if let Some(journal) = &overrides.journal {
        config.journal_path = Some(journal.clone());
    }
    config.validate()?;
    tracing::debug!(?config, "configuration resolved");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vcom.yaml");
        std::fs::write(&path, "schema: selection-v1\nmax_attempts: 7\n").unwrap();

        let config = load_config(Some(&path), &ConfigOverrides::default()).unwrap();
        assert_eq!(config.schema, LeafSchema::SelectionV1);
        assert_eq!(config.max_attempts, 7);

        let overrides = ConfigOverrides {
            schema: Some(LeafSchema::BallotV1),
            allow_open: true,
            finality: Some(Finality::Finalized),
            journal: Some(dir.path().join("journal.jsonl")),
        };
        let config = load_config(Some(&path), &overrides).unwrap();
        assert_eq!(config.schema, LeafSchema::BallotV1);
        assert!(config.allow_open_cycle);
        assert_eq!(config.finality, Finality::Finalized);
        assert_eq!(config.max_attempts, 7);
        assert!(config.journal_path.is_some());
    }

    #[test]
    fn mock_ledger_is_available() {
        let args = BackendArgs {
            store: StoreKind::File,
            store_dir: PathBuf::from("unused"),
            database_url: None,
            ledger: LedgerKind::Mock,
        };
        assert!(matches!(args.open_ledger().unwrap(), AnyLedger::Mock(_)));
    }
}

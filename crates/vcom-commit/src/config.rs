//! Commitment pipeline configuration.
//!
//! Defaults suit a small EVM chain. Layers, lowest precedence first:
//! built-in defaults, a YAML file ([`CommitConfig::from_yaml_file`]),
//! `VCOM_*` environment variables ([`CommitConfig::with_env_overrides`]),
//! then command-line flags applied by the caller.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use vcom_core::LeafSchema;
use vcom_ledger::TxStatus;

use crate::retry::RetryPolicy;

/// Ledger status a transaction must reach before the commitment is recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Finality {
    /// Included with the ledger's confirmation depth.
    #[default]
    Confirmed,
    /// Irreversible.
    Finalized,
}

impl Finality {
    /// The matching ledger status.
    pub fn required_status(self) -> TxStatus {
        match self {
            Self::Confirmed => TxStatus::Confirmed,
            Self::Finalized => TxStatus::Finalized,
        }
    }
}

impl std::str::FromStr for Finality {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "confirmed" => Ok(Self::Confirmed),
            "finalized" => Ok(Self::Finalized),
            other => Err(ConfigError::invalid(
                "finality",
                format!("expected \"confirmed\" or \"finalized\", got {other:?}"),
            )),
        }
    }
}

/// Configuration for one commitment pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CommitConfig {
    /// Leaf schema for new commitments.
    pub schema: LeafSchema,
    /// Commit cycles that are not closed yet.
    pub allow_open_cycle: bool,
    /// Status required before recording.
    pub finality: Finality,
    /// Timeout for a single submit call, in seconds.
    pub submit_timeout_secs: u64,
    /// Submit attempts before giving up on transient failures.
    pub max_attempts: u32,
    /// First backoff delay, in milliseconds. Doubles per attempt.
    pub backoff_base_ms: u64,
    /// Backoff ceiling, in milliseconds.
    pub backoff_max_ms: u64,
    /// Maximum time to wait for confirmation, in seconds.
    pub confirm_timeout_secs: u64,
    /// Interval between status polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// Submission journal file. In-memory only when unset.
    pub journal_path: Option<PathBuf>,
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            schema: LeafSchema::default(),
            allow_open_cycle: false,
            finality: Finality::default(),
            submit_timeout_secs: 30,
            max_attempts: 4,
            backoff_base_ms: 500,
            backoff_max_ms: 30_000,
            confirm_timeout_secs: 600,
            poll_interval_ms: 2_000,
            journal_path: None,
        }
    }
}

impl CommitConfig {
    /// Load a YAML file. Missing keys take their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    /// Apply `VCOM_*` environment variables on top of `self`.
    ///
    /// Variables:
    /// - `VCOM_LEAF_SCHEMA` (`ballot-v1` | `selection-v1`)
    /// - `VCOM_ALLOW_OPEN_CYCLE` (`true` | `false`)
    /// - `VCOM_FINALITY` (`confirmed` | `finalized`)
    /// - `VCOM_SUBMIT_TIMEOUT_SECS`, `VCOM_MAX_ATTEMPTS`
    /// - `VCOM_BACKOFF_BASE_MS`, `VCOM_BACKOFF_MAX_MS`
    /// - `VCOM_CONFIRM_TIMEOUT_SECS`, `VCOM_POLL_INTERVAL_MS`
    /// - `VCOM_JOURNAL_PATH`
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    pub(crate) fn with_overrides(
        mut self,
        get: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(v) = get("VCOM_LEAF_SCHEMA") {
            self.schema = v
                .parse()
                .map_err(|e: vcom_core::ParseError| ConfigError::invalid("VCOM_LEAF_SCHEMA", e.to_string()))?;
        }
        if let Some(v) = get("VCOM_ALLOW_OPEN_CYCLE") {
            self.allow_open_cycle = parse_env("VCOM_ALLOW_OPEN_CYCLE", &v)?;
        }
        if let Some(v) = get("VCOM_FINALITY") {
            self.finality = v.parse()?;
        }
        if let Some(v) = get("VCOM_SUBMIT_TIMEOUT_SECS") {
            self.submit_timeout_secs = parse_env("VCOM_SUBMIT_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("VCOM_MAX_ATTEMPTS") {
            self.max_attempts = parse_env("VCOM_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = get("VCOM_BACKOFF_BASE_MS") {
            self.backoff_base_ms = parse_env("VCOM_BACKOFF_BASE_MS", &v)?;
        }
        if let Some(v) = get("VCOM_BACKOFF_MAX_MS") {
            self.backoff_max_ms = parse_env("VCOM_BACKOFF_MAX_MS", &v)?;
        }
        if let Some(v) = get("VCOM_CONFIRM_TIMEOUT_SECS") {
            self.confirm_timeout_secs = parse_env("VCOM_CONFIRM_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("VCOM_POLL_INTERVAL_MS") {
            self.poll_interval_ms = parse_env("VCOM_POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = get("VCOM_JOURNAL_PATH") {
            self.journal_path = (!v.trim().is_empty()).then(|| PathBuf::from(v));
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("max_attempts", "must be at least 1"));
        }
        if self.submit_timeout_secs == 0 {
            return Err(ConfigError::invalid("submit_timeout_secs", "must be positive"));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::invalid("poll_interval_ms", "must be positive"));
        }
        if self.backoff_max_ms < self.backoff_base_ms {
            return Err(ConfigError::invalid(
                "backoff_max_ms",
                "must not be below backoff_base_ms",
            ));
        }
        Ok(())
    }

    /// Submit retry policy.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.backoff_max_ms),
        )
    }

    /// Timeout for one submit call.
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_secs(self.submit_timeout_secs)
    }

    /// Maximum wait for confirmation.
    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    /// Interval between status polls.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn parse_env<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(key, e.to_string()))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A value is out of range or unparsable.
    #[error("invalid configuration value for {key}: {reason}")]
    Invalid {
        /// Key or variable name.
        key: &'static str,
        /// What is wrong with it.
        reason: String,
    },

    /// The config file could not be read.
    #[error("cannot read config file {}: {source}", path.display())]
    Io {
        /// Config file.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The config file is not valid YAML for this schema.
    #[error("invalid config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ConfigError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

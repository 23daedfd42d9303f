use thiserror::Error;

/// Errors from ledger operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The ledger could not be reached or did not answer usefully.
    /// Safe to retry.
    #[error("ledger {ledger} unavailable: {reason}")]
    Unavailable {
        /// Ledger identifier.
        ledger: String,
        /// Transport or protocol failure detail.
        reason: String,
    },

    /// The ledger refused the request. Retrying the same request will not
    /// help.
    #[error("ledger {ledger} rejected the request: {reason}")]
    Rejected {
        /// Ledger identifier.
        ledger: String,
        /// Rejection reason reported by the ledger.
        reason: String,
    },

    /// Ledger configuration is invalid.
    #[error("invalid ledger configuration: {0}")]
    InvalidConfig(String),
}

impl LedgerError {
    /// Whether the failure is transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    pub(crate) fn unavailable(ledger: &str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            ledger: ledger.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn rejected(ledger: &str, reason: impl Into<String>) -> Self {
        Self::Rejected {
            ledger: ledger.to_string(),
            reason: reason.into(),
        }
    }
}

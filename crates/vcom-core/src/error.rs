//! # Error Types
//!
//! Errors raised while validating and encoding ballot records, and while
//! parsing the textual forms of digests and timestamps. All errors use
//! `thiserror`.

use thiserror::Error;

/// Error raised by the leaf encoder.
#[derive(Error, Debug)]
pub enum LeafError {
    /// A required field is empty, or the selection list is empty.
    ///
    /// The whole batch must be rejected when any record is malformed; the
    /// record is never silently dropped from a cycle.
    #[error("malformed ballot record: field `{field}` {reason}")]
    MalformedRecord {
        /// Name of the offending field.
        field: &'static str,
        /// Why the field was rejected.
        reason: String,
    },

    /// JCS serialization failed.
    #[error("canonical serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LeafError {
    pub(crate) fn malformed(field: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedRecord {
            field,
            reason: reason.into(),
        }
    }
}

/// Error parsing the textual form of a core value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Not a 32-byte hex digest.
    #[error("invalid digest: {0}")]
    InvalidDigest(String),

    /// Not an RFC 3339 UTC timestamp.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Unknown leaf schema name.
    #[error("unknown leaf schema {0:?} (expected \"ballot-v1\" or \"selection-v1\")")]
    UnknownSchema(String),
}

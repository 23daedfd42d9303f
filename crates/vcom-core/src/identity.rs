//! # Identifier Newtypes
//!
//! String newtypes for every identifier that flows through the commitment
//! pipeline. Type-level separation stops a position id from being passed
//! where a cycle id is expected.
//!
//! Construction does not validate: records arrive from the vote store as-is
//! and emptiness is reported by the leaf encoder as `MalformedRecord`, with
//! the field name attached.

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier string.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Access the raw identifier string.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True if the identifier is empty or whitespace-only.
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Identifier of the voter who cast a ballot (e.g. a student number).
    VoterId,
    "voter"
);

string_id!(
    /// Identifier of one selectable option (a candidate).
    OptionId,
    "option"
);

string_id!(
    /// Identifier of the position or category a ballot is cast for.
    PositionId,
    "position"
);

string_id!(
    /// Election cycle identifier (e.g. a school year). Exactly one
    /// commitment root is valid per cycle.
    CycleId,
    "cycle"
);

/// Opaque, durable reference to a ledger transaction.
///
/// For EVM ledgers this is the `0x`-prefixed transaction hash. Displayed
/// without a prefix so it can be copied straight into a block explorer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxRef(String);

impl TxRef {
    /// Wrap a ledger-issued transaction reference.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the raw reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TxRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

//! # 32-Byte Digests
//!
//! [`Digest32`] is the fixed-size value used for leaf hashes, interior Merkle
//! nodes and the committed root. It orders bytewise, which is the ordering
//! the canonical pairing rule and the leaf sort rely on.
//!
//! ## Domain Separation
//!
//! - Leaf: `SHA256(LEAF_PREFIX || canonical_leaf_bytes)`
//! - Node: `SHA256(NODE_PREFIX || lo || hi)`
//!
//! A leaf digest can therefore never be reinterpreted as an interior node.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::ParseError;

/// Length of every digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// Prefix byte for leaf hashing.
pub const LEAF_PREFIX: u8 = 0x00;

/// Prefix byte for interior node hashing.
pub const NODE_PREFIX: u8 = 0x01;

/// A 32-byte SHA-256 digest.
///
/// Serializes as 64 lowercase hex characters. Parsing accepts an optional
/// `0x` prefix and either case, so values copied from an EVM explorer parse
/// unchanged.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest32([u8; DIGEST_LEN]);

impl Digest32 {
    /// Wrap raw digest bytes.
    pub const fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Access the raw bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// SHA-256 over a prefix byte followed by each part in order.
    pub fn sha256_prefixed(prefix: u8, parts: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update([prefix]);
        for part in parts {
            hasher.update(part);
        }
        let mut out = [0u8; DIGEST_LEN];
        out.copy_from_slice(&hasher.finalize());
        Self(out)
    }

    /// Render as 64 lowercase hex characters.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Render as `0x`-prefixed hex (EVM `bytes32` form).
    pub fn to_prefixed_hex(&self) -> String {
        format!("0x{}", self.to_hex())
    }

    /// Parse 64 hex characters, with or without a `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, ParseError> {
        let trimmed = s.trim();
        let hex = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if hex.len() != DIGEST_LEN * 2 {
            return Err(ParseError::InvalidDigest(format!(
                "expected 64 hex chars, got {}",
                hex.len()
            )));
        }
        let mut out = [0u8; DIGEST_LEN];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk)
                .map_err(|e| ParseError::InvalidDigest(format!("invalid hex: {e}")))?;
            out[i] = u8::from_str_radix(pair, 16)
                .map_err(|e| ParseError::InvalidDigest(format!("invalid hex at byte {i}: {e}")))?;
        }
        Ok(Self(out))
    }
}

impl std::fmt::Display for Digest32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::fmt::Debug for Digest32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Digest32({})", self.to_hex())
    }
}

impl std::str::FromStr for Digest32 {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl AsRef<[u8]> for Digest32 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Digest32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let d = Digest32::from_bytes([0xab; 32]);
        assert_eq!(d.to_hex().len(), 64);
        assert_eq!(Digest32::from_hex(&d.to_hex()).unwrap(), d);
    }

    #[test]
    fn accepts_evm_prefix_and_uppercase() {
        let d = Digest32::from_bytes([0x0f; 32]);
        let upper = d.to_prefixed_hex().to_uppercase().replacen("0X", "0x", 1);
        assert_eq!(Digest32::from_hex(&upper).unwrap(), d);
        assert_eq!(Digest32::from_hex(&d.to_prefixed_hex()).unwrap(), d);
    }

    #[test]
    fn rejects_wrong_length_and_bad_chars() {
        assert!(Digest32::from_hex("abcd").is_err());
        assert!(Digest32::from_hex(&"zz".repeat(32)).is_err());
        assert!(Digest32::from_hex("").is_err());
    }

    #[test]
    fn known_sha256_vector_with_prefix() {
        // SHA256(0x00) = 6e340b9cffb37a989ca544e6bb780a2c78901d3fb33738768511a30617afa01d
        let d = Digest32::sha256_prefixed(LEAF_PREFIX, &[]);
        assert_eq!(
            d.to_hex(),
            "6e340b9cffb37a989ca544e6bb780a2c78901d3fb33738768511a30617afa01d"
        );
    }

    #[test]
    fn prefix_separates_domains() {
        let leaf = Digest32::sha256_prefixed(LEAF_PREFIX, &[b"x"]);
        let node = Digest32::sha256_prefixed(NODE_PREFIX, &[b"x"]);
        assert_ne!(leaf, node);
    }

    #[test]
    fn ordering_is_bytewise() {
        let lo = Digest32::from_bytes([0x00; 32]);
        let mut hi_bytes = [0x00; 32];
        hi_bytes[0] = 0x01;
        let hi = Digest32::from_bytes(hi_bytes);
        assert!(lo < hi);
    }

    #[test]
    fn serde_as_hex_string() {
        let d = Digest32::from_bytes([0x11; 32]);
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, format!("\"{}\"", "11".repeat(32)));
        let back: Digest32 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }
}

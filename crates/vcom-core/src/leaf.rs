//! # Leaf Encoder
//!
//! Turns one [`BallotRecord`] into [`CanonicalLeafBytes`] and hashes them
//! into a leaf digest.
//!
//! ## Canonical Form
//!
//! The record is projected onto the fields its [`LeafSchema`] commits to,
//! tagged with the schema name, and serialized with RFC 8785 (JCS) via
//! `serde_jcs`: sorted keys, compact separators, no whitespace. Selections
//! are de-duplicated and sorted lexicographically first, so
//!
//! ```text
//! {"cycle":"2024","position":"P2","schema":"ballot-v1","selections":["C1","C3"],"voter":"V3"}
//! ```
//!
//! is produced whether the store held `[C3, C1]`, `[C1, C3]` or `[C1, C3, C1]`.
//! JSON string escaping removes the delimiter ambiguity of joined strings
//! (`"a-b" + "c"` vs `"a" + "b-c"`).
//!
//! ## Validation
//!
//! Every identifier must be non-blank and at least one selection is required,
//! regardless of schema. Violations yield `LeafError::MalformedRecord`.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::ballot::{BallotRecord, LeafSchema};
use crate::digest::{Digest32, LEAF_PREFIX};
use crate::error::LeafError;

/// Deterministic byte encoding of one ballot under one schema.
///
/// The inner buffer is private; [`encode()`] is the only constructor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalLeafBytes(Vec<u8>);

impl CanonicalLeafBytes {
    /// Access the encoded bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length of the encoding.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for a successfully encoded record.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalLeafBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[derive(Serialize)]
struct BallotLeafV1<'a> {
    schema: &'static str,
    cycle: &'a str,
    position: &'a str,
    selections: Vec<&'a str>,
    voter: &'a str,
}

#[derive(Serialize)]
struct SelectionLeafV1<'a> {
    schema: &'static str,
    cycle: &'a str,
    position: &'a str,
    selections: Vec<&'a str>,
}

/// Encode a ballot record into canonical leaf bytes.
///
/// # Errors
///
/// `LeafError::MalformedRecord` if any identifier is blank or there are no
/// selections.
pub fn encode(record: &BallotRecord, schema: LeafSchema) -> Result<CanonicalLeafBytes, LeafError> {
    if record.voter.is_blank() {
        return Err(LeafError::malformed("voter", "must not be empty"));
    }
    if record.position.is_blank() {
        return Err(LeafError::malformed("position", "must not be empty"));
    }
    if record.cycle.is_blank() {
        return Err(LeafError::malformed("cycle", "must not be empty"));
    }
    let selections = normalized_selections(record)?;

    let json = match schema {
        LeafSchema::BallotV1 => serde_jcs::to_string(&BallotLeafV1 {
            schema: schema.as_str(),
            cycle: record.cycle.as_str(),
            position: record.position.as_str(),
            selections,
            voter: record.voter.as_str(),
        })?,
        LeafSchema::SelectionV1 => serde_jcs::to_string(&SelectionLeafV1 {
            schema: schema.as_str(),
            cycle: record.cycle.as_str(),
            position: record.position.as_str(),
            selections,
        })?,
    };
    Ok(CanonicalLeafBytes(json.into_bytes()))
}

/// Hash canonical leaf bytes: `SHA256(0x00 || bytes)`.
pub fn hash_leaf(bytes: &CanonicalLeafBytes) -> Digest32 {
    Digest32::sha256_prefixed(LEAF_PREFIX, &[bytes.as_bytes()])
}

/// Encode and hash in one step.
pub fn leaf_hash(record: &BallotRecord, schema: LeafSchema) -> Result<Digest32, LeafError> {
    encode(record, schema).map(|bytes| hash_leaf(&bytes))
}

/// Sorted, de-duplicated selections. Rejects an empty list or blank entries.
fn normalized_selections(record: &BallotRecord) -> Result<Vec<&str>, LeafError> {
    if record.selections.is_empty() {
        return Err(LeafError::malformed(
            "selections",
            "must contain at least one option",
        ));
    }
    let mut set = BTreeSet::new();
    for (i, option) in record.selections.iter().enumerate() {
        if option.is_blank() {
            return Err(LeafError::malformed(
                "selections",
                format!("entry {i} must not be empty"),
            ));
        }
        set.insert(option.as_str());
    }
    Ok(set.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v3() -> BallotRecord {
        BallotRecord::new("V3", ["C3", "C1"], "P2", "2024")
    }

    #[test]
    fn canonical_form_is_jcs_with_sorted_selections() {
        let bytes = encode(&v3(), LeafSchema::BallotV1).unwrap();
        let s = std::str::from_utf8(bytes.as_bytes()).unwrap();
        assert_eq!(
            s,
            r#"{"cycle":"2024","position":"P2","schema":"ballot-v1","selections":["C1","C3"],"voter":"V3"}"#
        );
    }

    #[test]
    fn selection_schema_omits_voter() {
        let bytes = encode(&v3(), LeafSchema::SelectionV1).unwrap();
        let s = std::str::from_utf8(bytes.as_bytes()).unwrap();
        assert_eq!(
            s,
            r#"{"cycle":"2024","position":"P2","schema":"selection-v1","selections":["C1","C3"]}"#
        );
    }

    #[test]
    fn selection_order_and_duplicates_do_not_matter() {
        let a = BallotRecord::new("V3", ["C1", "C3"], "P2", "2024");
        let b = BallotRecord::new("V3", ["C3", "C1", "C3"], "P2", "2024");
        assert_eq!(
            encode(&a, LeafSchema::BallotV1).unwrap(),
            encode(&b, LeafSchema::BallotV1).unwrap()
        );
    }

    #[test]
    fn schemas_never_collide() {
        let r = v3();
        assert_ne!(
            leaf_hash(&r, LeafSchema::BallotV1).unwrap(),
            leaf_hash(&r, LeafSchema::SelectionV1).unwrap()
        );
    }

    #[test]
    fn selection_schema_equates_identical_choices() {
        let a = BallotRecord::new("V1", ["C1"], "P1", "2024");
        let b = BallotRecord::new("V2", ["C1"], "P1", "2024");
        assert_eq!(
            leaf_hash(&a, LeafSchema::SelectionV1).unwrap(),
            leaf_hash(&b, LeafSchema::SelectionV1).unwrap()
        );
        assert_ne!(
            leaf_hash(&a, LeafSchema::BallotV1).unwrap(),
            leaf_hash(&b, LeafSchema::BallotV1).unwrap()
        );
    }

    #[test]
    fn known_leaf_vector() {
        // SHA256(b"\x00" + b'{"cycle":"2024","position":"P1","schema":"ballot-v1","selections":["C2"],"voter":"V1"}')
        let r = BallotRecord::new("V1", ["C2"], "P1", "2024");
        let expected = Digest32::sha256_prefixed(
            LEAF_PREFIX,
            &[br#"{"cycle":"2024","position":"P1","schema":"ballot-v1","selections":["C2"],"voter":"V1"}"#],
        );
        assert_eq!(leaf_hash(&r, LeafSchema::BallotV1).unwrap(), expected);
    }

    #[test]
    fn delimiter_injection_is_distinct() {
        let a = BallotRecord::new("V1-P1", ["C1"], "P", "2024");
        let b = BallotRecord::new("V1", ["C1"], "P1-P", "2024");
        assert_ne!(
            leaf_hash(&a, LeafSchema::BallotV1).unwrap(),
            leaf_hash(&b, LeafSchema::BallotV1).unwrap()
        );
    }

    #[test]
    fn rejects_blank_fields() {
        let cases = [
            (BallotRecord::new("", ["C1"], "P1", "2024"), "voter"),
            (BallotRecord::new("V1", ["C1"], " ", "2024"), "position"),
            (BallotRecord::new("V1", ["C1"], "P1", ""), "cycle"),
            (BallotRecord::new("V1", ["C1", ""], "P1", "2024"), "selections"),
        ];
        for (record, expected_field) in cases {
            match encode(&record, LeafSchema::BallotV1) {
                Err(LeafError::MalformedRecord { field, .. }) => assert_eq!(field, expected_field),
                other => panic!("expected MalformedRecord for {expected_field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn rejects_empty_selection_list() {
        let r = BallotRecord::new("V1", Vec::<&str>::new(), "P1", "2024");
        let err = encode(&r, LeafSchema::SelectionV1).unwrap_err();
        assert!(matches!(
            err,
            LeafError::MalformedRecord { field: "selections", .. }
        ));
    }

    #[test]
    fn unicode_identifiers_pass_through() {
        let r = BallotRecord::new("José", ["Ñandú"], "Presidente", "2024");
        let bytes = encode(&r, LeafSchema::BallotV1).unwrap();
        let s = std::str::from_utf8(bytes.as_bytes()).unwrap();
        assert!(s.contains("José"));
        assert!(!bytes.is_empty());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn ident() -> impl Strategy<Value = String> {
        "[A-Za-z0-9_-]{1,12}"
    }

    proptest! {
        /// Encoding is a pure function of the selection set, not its order.
        #[test]
        fn selection_permutations_encode_identically(
            voter in ident(),
            position in ident(),
            cycle in ident(),
            selections in prop::collection::vec(ident(), 1..6)
                .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle())),
        ) {
            let (original, shuffled) = selections;
            let a = BallotRecord::new(voter.as_str(), original, position.as_str(), cycle.as_str());
            let b = BallotRecord::new(voter.as_str(), shuffled, position.as_str(), cycle.as_str());
            prop_assert_eq!(
                encode(&a, LeafSchema::BallotV1).unwrap(),
                encode(&b, LeafSchema::BallotV1).unwrap()
            );
        }

        /// Changing the voter changes the leaf hash.
        #[test]
        fn voter_change_changes_leaf(
            voter in ident(),
            other in ident(),
            position in ident(),
            selection in ident(),
        ) {
            prop_assume!(voter != other);
            let a = BallotRecord::new(voter.as_str(), [selection.as_str()], position.as_str(), "2024");
            let b = BallotRecord::new(other.as_str(), [selection.as_str()], position.as_str(), "2024");
            prop_assert_ne!(
                leaf_hash(&a, LeafSchema::BallotV1).unwrap(),
                leaf_hash(&b, LeafSchema::BallotV1).unwrap()
            );
        }

        /// Canonical bytes are always valid JSON.
        #[test]
        fn canonical_bytes_are_json(
            voter in ident(),
            selections in prop::collection::vec(ident(), 1..4),
        ) {
            let r = BallotRecord::new(voter.as_str(), selections, "P1", "2024");
            let bytes = encode(&r, LeafSchema::BallotV1).unwrap();
            let parsed: Result<serde_json::Value, _> = serde_json::from_slice(bytes.as_bytes());
            prop_assert!(parsed.is_ok());
        }
    }
}

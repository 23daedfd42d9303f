//! # Ballot Records and Leaf Schemas
//!
//! A [`BallotRecord`] is one voter's selection(s) for one position in one
//! election cycle, exactly as the vote store returns it. Records are never
//! mutated after they are cast.
//!
//! [`LeafSchema`] decides which fields of a record are committed to. The
//! schema is chosen per deployment and stored on each commitment record, so
//! an inclusion proof is always rebuilt with the schema its root was built
//! under.

use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::identity::{CycleId, OptionId, PositionId, VoterId};

/// One cast ballot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BallotRecord {
    /// Who cast the ballot.
    pub voter: VoterId,
    /// Selected options. May arrive in any order and may contain duplicates;
    /// the encoder normalizes both.
    pub selections: Vec<OptionId>,
    /// Position or category voted on.
    pub position: PositionId,
    /// Election cycle the ballot belongs to.
    pub cycle: CycleId,
}

impl BallotRecord {
    /// Build a record from plain strings.
    pub fn new<I, S>(
        voter: impl Into<VoterId>,
        selections: I,
        position: impl Into<PositionId>,
        cycle: impl Into<CycleId>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OptionId>,
    {
        Self {
            voter: voter.into(),
            selections: selections.into_iter().map(Into::into).collect(),
            position: position.into(),
            cycle: cycle.into(),
        }
    }
}

/// Which fields of a ballot are committed to in its leaf.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeafSchema {
    /// Voter, position, cycle and selections. One distinct leaf per ballot.
    #[default]
    #[serde(rename = "ballot-v1")]
    BallotV1,
    /// Position, cycle and selections only. Ballots with identical choices
    /// share a leaf value; the tree keeps every copy.
    #[serde(rename = "selection-v1")]
    SelectionV1,
}

impl LeafSchema {
    /// Returns the schema tag embedded in every encoded leaf.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BallotV1 => "ballot-v1",
            Self::SelectionV1 => "selection-v1",
        }
    }
}

impl std::fmt::Display for LeafSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LeafSchema {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ballot-v1" => Ok(Self::BallotV1),
            "selection-v1" => Ok(Self::SelectionV1),
            other => Err(ParseError::UnknownSchema(other.to_string())),
        }
    }
}

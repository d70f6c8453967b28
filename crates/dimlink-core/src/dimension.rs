//! Dimension types: the common taxonomy warehouse columns are mapped into

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Semantic category of a warehouse column
///
/// Every native warehouse type collapses into exactly one of these. Anything
/// that is not clearly numeric, temporal or boolean is a `String`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DimensionType {
    /// Integer, floating point and decimal types
    Number,

    /// Calendar date (no time component)
    Date,

    /// Time of day or date with time
    Timestamp,

    /// Boolean type
    Boolean,

    /// Text and everything without a better category
    String,
}

impl DimensionType {
    /// All dimension types in declaration order
    pub const ALL: [DimensionType; 5] = [
        Self::Number,
        Self::Date,
        Self::Timestamp,
        Self::Boolean,
        Self::String,
    ];

    /// Stable upper-case identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Number => "NUMBER",
            Self::Date => "DATE",
            Self::Timestamp => "TIMESTAMP",
            Self::Boolean => "BOOLEAN",
            Self::String => "STRING",
        }
    }

    /// Whether values of this type are time based
    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::Date | Self::Timestamp)
    }
}

impl Default for DimensionType {
    fn default() -> Self {
        Self::String
    }
}

impl std::fmt::Display for DimensionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Returned when a string is not one of the dimension type names
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown dimension type: {0}")]
pub struct ParseDimensionTypeError(pub String);

impl FromStr for DimensionType {
    type Err = ParseDimensionTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseDimensionTypeError(s.to_string()))
    }
}

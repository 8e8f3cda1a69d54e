use serde::{Deserialize, Serialize};
use std::fmt;

/// A single place served by a ZIP code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub city: String,
    pub state: String,
    #[serde(default)]
    pub county: String,
}

impl Location {
    pub fn new(city: impl Into<String>, state: impl Into<String>, county: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            state: state.into(),
            county: county.into(),
        }
    }

    /// Two records describe the same place when city and state match; county is ignored.
    pub fn same_place(&self, other: &Location) -> bool {
        self.city == other.city && self.state == other.state
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.county.is_empty() {
            write!(f, "{}, {}", self.city, self.state)
        } else {
            write!(f, "{}, {} ({})", self.city, self.state, self.county)
        }
    }
}

/// Result of a successful lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupResult {
    pub zip: String,
    pub locations: Vec<Location>,
    pub has_multiple: bool,
}

impl LookupResult {
    pub fn new(zip: impl Into<String>, locations: Vec<Location>) -> Self {
        let has_multiple = locations.len() > 1;
        Self {
            zip: zip.into(),
            locations,
            has_multiple,
        }
    }

    /// First location, used when a single answer is wanted
    pub fn primary(&self) -> Option<&Location> {
        self.locations.first()
    }
}

/// Error descriptor returned in place of a result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupFailure {
    pub error: String,
    pub zip: String,
}

/// One slot of a batch response; order matches the request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchEntry {
    Found(LookupResult),
    Failed(LookupFailure),
}

impl BatchEntry {
    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    pub fn found(&self) -> Option<&LookupResult> {
        match self {
            Self::Found(result) => Some(result),
            Self::Failed(_) => None,
        }
    }
}

/// Artifact value: either one record or an array of records
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ArtifactEntry {
    Single(Location),
    Multiple(Vec<Location>),
}

impl ArtifactEntry {
    pub fn into_vec(self) -> Vec<Location> {
        match self {
            Self::Single(location) => vec![location],
            Self::Multiple(locations) => locations,
        }
    }
}

/// Table size figures reported by `/health`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableStats {
    pub zip_codes: usize,
    pub states: usize,
}

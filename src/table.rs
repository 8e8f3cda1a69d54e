//! Immutable in-memory ZIP table.
//!
//! Entries live in a vector in first-occurrence order with a `HashMap` index
//! beside it, so iteration order never depends on hash ordering. The table is
//! built once and never mutated, which makes it safe to share across threads
//! behind an `Arc` without locking.

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;

use crate::error::{LookupError, Result};
use crate::types::{ArtifactEntry, Location, LookupResult, TableStats};
use crate::zipcode::is_valid_zip;

#[derive(Debug, Clone)]
struct Entry {
    zip: String,
    locations: Vec<Location>,
}

#[derive(Debug, Clone, Default)]
pub struct LookupTable {
    entries: Vec<Entry>,
    index: HashMap<String, usize>,
    states: Vec<String>,
}

impl LookupTable {
    /// Build a table from `(zip, location)` records in source order.
    ///
    /// Records with a malformed key or a blank city/state are skipped. A
    /// location already present for the same code (same city and state) is
    /// dropped, so the first occurrence wins.
    pub fn from_records<I>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, Location)>,
    {
        let mut table = Self::default();
        let mut skipped = 0usize;

        for (zip, location) in records {
            if !is_valid_zip(&zip) || location.city.is_empty() || location.state.is_empty() {
                skipped += 1;
                continue;
            }
            table.insert(zip, location);
        }

        if skipped > 0 {
            tracing::warn!("Skipped {} malformed ZIP records", skipped);
        }
        if table.entries.is_empty() {
            return Err(LookupError::DataLoad(
                "artifact contains no usable ZIP records".to_string(),
            ));
        }

        table.states = table
            .entries
            .iter()
            .flat_map(|e| e.locations.iter().map(|l| l.state.clone()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        Ok(table)
    }

    /// Parse the JSON artifact: an object keyed by ZIP whose values are a
    /// location object or an array of them.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| LookupError::DataLoad(format!("invalid artifact JSON: {e}")))?;
        let Value::Object(map) = value else {
            return Err(LookupError::DataLoad(
                "artifact must be a JSON object keyed by ZIP code".to_string(),
            ));
        };

        let mut records = Vec::with_capacity(map.len());
        for (zip, raw) in map {
            let entry: ArtifactEntry = serde_json::from_value(raw)
                .map_err(|e| LookupError::DataLoad(format!("invalid entry for {zip}: {e}")))?;
            for location in entry.into_vec() {
                records.push((zip.clone(), location));
            }
        }

        Self::from_records(records)
    }

    fn insert(&mut self, zip: String, location: Location) {
        match self.index.get(&zip) {
            Some(&pos) => {
                let locations = &mut self.entries[pos].locations;
                if !locations.iter().any(|l| l.same_place(&location)) {
                    locations.push(location);
                }
            }
            None => {
                self.index.insert(zip.clone(), self.entries.len());
                self.entries.push(Entry {
                    zip,
                    locations: vec![location],
                });
            }
        }
    }

    /// Locations for an already-normalized code
    pub fn get(&self, zip: &str) -> Option<&[Location]> {
        self.index
            .get(zip)
            .map(|&pos| self.entries[pos].locations.as_slice())
    }

    pub fn resolve(&self, zip: &str) -> Option<LookupResult> {
        self.get(zip)
            .map(|locations| LookupResult::new(zip, locations.to_vec()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct state codes, sorted
    pub fn states(&self) -> &[String] {
        &self.states
    }

    /// Codes in first-occurrence order
    pub fn zips(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.zip.as_str())
    }

    pub fn stats(&self) -> TableStats {
        TableStats {
            zip_codes: self.entries.len(),
            states: self.states.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ARTIFACT: &str = r#"{
        "12345": [
            {"city": "Schenectady", "state": "NY", "county": "Schenectady"},
            {"city": "Rotterdam", "state": "NY", "county": "Schenectady"}
        ],
        "90210": {"city": "Beverly Hills", "state": "CA", "county": "Los Angeles"}
    }"#;

    #[test]
    fn test_accepts_single_and_array_shapes() {
        let table = LookupTable::from_json(ARTIFACT).unwrap();
        assert_eq!(table.len(), 2);

        let multi = table.resolve("12345").unwrap();
        assert!(multi.has_multiple);
        assert_eq!(multi.locations[0].city, "Schenectady");
        assert_eq!(multi.locations[1].city, "Rotterdam");

        let single = table.resolve("90210").unwrap();
        assert!(!single.has_multiple);
        assert_eq!(single.locations.len(), 1);
    }

    #[test]
    fn test_dedup_ignores_county_and_keeps_first() {
        let table = LookupTable::from_records(vec![
            ("10001".to_string(), Location::new("New York", "NY", "New York")),
            ("10001".to_string(), Location::new("New York", "NY", "Kings")),
            ("10001".to_string(), Location::new("Manhattan", "NY", "New York")),
        ])
        .unwrap();

        let locations = table.get("10001").unwrap();
        assert_eq!(locations.len(), 2);
        assert_eq!(locations[0].county, "New York");
        assert_eq!(locations[1].city, "Manhattan");
    }

    #[test]
    fn test_skips_malformed_records() {
        let table = LookupTable::from_records(vec![
            ("1234".to_string(), Location::new("Short", "XX", "")),
            ("ABCDE".to_string(), Location::new("Letters", "XX", "")),
            ("55555".to_string(), Location::new("", "MN", "")),
            ("55401".to_string(), Location::new("Minneapolis", "MN", "Hennepin")),
        ])
        .unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.zips().collect::<Vec<_>>(), vec!["55401"]);
    }

    #[test]
    fn test_states_are_distinct_and_sorted() {
        let table = LookupTable::from_records(vec![
            ("90210".to_string(), Location::new("Beverly Hills", "CA", "")),
            ("10001".to_string(), Location::new("New York", "NY", "")),
            ("94105".to_string(), Location::new("San Francisco", "CA", "")),
        ])
        .unwrap();

        assert_eq!(table.states(), ["CA", "NY"]);
        let stats = table.stats();
        assert_eq!(stats.zip_codes, 3);
        assert_eq!(stats.states, 2);
    }

    #[test]
    fn test_rejects_bad_artifacts() {
        assert!(matches!(
            LookupTable::from_json("not json"),
            Err(LookupError::DataLoad(_))
        ));
        assert!(matches!(
            LookupTable::from_json("[1, 2, 3]"),
            Err(LookupError::DataLoad(_))
        ));
        assert!(matches!(
            LookupTable::from_json(r#"{"12345": "Schenectady"}"#),
            Err(LookupError::DataLoad(_))
        ));
        assert!(matches!(
            LookupTable::from_json("{}"),
            Err(LookupError::DataLoad(_))
        ));
    }

    #[test]
    fn test_absent_code() {
        let table = LookupTable::from_json(ARTIFACT).unwrap();
        assert!(table.get("99999").is_none());
        assert!(table.resolve("99999").is_none());
    }
}

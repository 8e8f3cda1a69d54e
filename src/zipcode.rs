use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::types::{Location, LookupResult};

/// Length of a canonical ZIP code
pub const ZIP_LEN: usize = 5;

static ZIP_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^[0-9]{5}$").ok());

/// Normalize raw input into a canonical 5-digit ZIP code.
///
/// Input is trimmed, left-padded with `0` up to five characters and then cut
/// to the first five. Anything that is not five ASCII digits afterwards is
/// rejected. Note that long input is truncated rather than rejected, so
/// `"1234567"` normalizes to `"12345"`.
pub fn normalize_zip(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let width = trimmed.chars().count();
    let mut padded = String::with_capacity(ZIP_LEN.max(trimmed.len()));
    for _ in width..ZIP_LEN {
        padded.push('0');
    }
    padded.push_str(trimmed);

    let candidate: String = padded.chars().take(ZIP_LEN).collect();
    if is_valid_zip(&candidate) {
        Some(candidate)
    } else {
        None
    }
}

/// True for exactly five ASCII digits
pub fn is_valid_zip(zip: &str) -> bool {
    ZIP_RE.as_ref().is_some_and(|re| re.is_match(zip))
}

/// String form of an arbitrary JSON value, as fed to `normalize_zip`.
///
/// Numbers keep their decimal rendering so `501` becomes `"00501"` after
/// normalization; every other non-string value renders as JSON text and
/// therefore fails validation.
pub fn coerce_input(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render a lookup result for display, e.g. `Beverly Hills, CA (Los Angeles)`
pub fn format_location(result: &LookupResult) -> String {
    result
        .locations
        .iter()
        .map(Location::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// All records from the dataset shipped with the `zipcodes` crate, in dataset order.
///
/// That dataset carries no county, so bundled locations have an empty `county`.
pub fn bundled_records() -> Option<Vec<(String, Location)>> {
    // Avoid zipcodes::matching to suppress debug_print output.
    let results =
        zipcodes::filter_by(vec![|z: &zipcodes::Zipcode| !z.zip_code.is_empty()], None).ok()?;
    Some(
        results
            .into_iter()
            .map(|info| {
                let location = Location::new(info.city.clone(), info.state.clone(), "");
                (info.zip_code.clone(), location)
            })
            .collect(),
    )
}

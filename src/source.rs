use std::path::PathBuf;
use std::time::Duration;

use crate::error::{LookupError, Result};
use crate::table::LookupTable;
use crate::zipcode;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Where the lookup artifact comes from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DataSource {
    /// JSON artifact served over HTTP(S)
    Url(String),
    /// JSON artifact on local disk
    File(PathBuf),
    /// Dataset compiled into the `zipcodes` crate
    #[default]
    Bundled,
}

impl DataSource {
    /// Parse a source string:
    /// - bundled
    /// - http://host/zips.json or https://host/zips.json
    /// - file:///path/zips.json
    /// - /path/zips.json
    pub fn parse(source: &str) -> Option<Self> {
        let source = source.trim();
        if source.is_empty() {
            return None;
        }

        if source.eq_ignore_ascii_case("bundled") {
            Some(Self::Bundled)
        } else if source.starts_with("http://") || source.starts_with("https://") {
            Some(Self::Url(source.to_string()))
        } else if let Some(path) = source.strip_prefix("file://") {
            (!path.is_empty()).then(|| Self::File(PathBuf::from(path)))
        } else {
            Some(Self::File(PathBuf::from(source)))
        }
    }

    /// Fetch and parse the artifact into a table.
    ///
    /// Remote fetches fail after a fixed transport timeout instead of hanging.
    pub async fn fetch(&self) -> Result<LookupTable> {
        match self {
            Self::Url(url) => {
                tracing::info!("Fetching ZIP data from {}", url);
                let client = reqwest::Client::builder()
                    .timeout(FETCH_TIMEOUT)
                    .build()
                    .map_err(|e| LookupError::DataLoad(e.to_string()))?;
                let response = client
                    .get(url)
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(|e| LookupError::DataLoad(format!("request to {url} failed: {e}")))?;
                let body = response
                    .text()
                    .await
                    .map_err(|e| LookupError::DataLoad(format!("reading {url} failed: {e}")))?;
                LookupTable::from_json(&body)
            }
            Self::File(path) => {
                tracing::info!("Reading ZIP data from {}", path.display());
                let body = tokio::fs::read_to_string(path).await.map_err(|e| {
                    LookupError::DataLoad(format!("reading {} failed: {e}", path.display()))
                })?;
                LookupTable::from_json(&body)
            }
            Self::Bundled => {
                tracing::info!("Building ZIP table from bundled dataset");
                tokio::task::spawn_blocking(|| {
                    let records = zipcode::bundled_records().ok_or_else(|| {
                        LookupError::DataLoad("bundled dataset unavailable".to_string())
                    })?;
                    LookupTable::from_records(records)
                })
                .await
                .map_err(|e| LookupError::DataLoad(format!("bundled load task failed: {e}")))?
            }
        }
    }
}

//! ZIP lookup service with a load-once table.
//!
//! The table is loaded lazily and exactly once. Callers that arrive while a
//! load is in flight await the same shared future, so they all observe the
//! same outcome and only one fetch is issued. A failed load leaves the
//! service unloaded and the next call starts a fresh attempt.
//!
//! # Example
//!
//! ```no_run
//! use zipfill_rs::{DataSource, ZipLookup};
//!
//! #[tokio::main]
//! async fn main() {
//!     let service = ZipLookup::new();
//!     service.load(&DataSource::Bundled).await.unwrap();
//!
//!     if let Some(result) = service.lookup("90210") {
//!         println!("{} locations", result.locations.len());
//!     }
//! }
//! ```

use std::future::Future;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde_json::Value;

use crate::error::{LookupError, Result};
use crate::source::DataSource;
use crate::table::LookupTable;
use crate::types::{BatchEntry, LookupFailure, LookupResult, TableStats};
use crate::zipcode::{coerce_input, normalize_zip};

/// Largest batch accepted by [`ZipLookup::batch`]
pub const MAX_BATCH_SIZE: usize = 100;

type LoadFuture = Shared<BoxFuture<'static, Result<Arc<LookupTable>>>>;

#[derive(Default)]
pub struct ZipLookup {
    table: OnceLock<Arc<LookupTable>>,
    in_flight: Mutex<Option<LoadFuture>>,
}

impl ZipLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Service over an already-built table
    pub fn with_table(table: LookupTable) -> Self {
        let service = Self::new();
        let _ = service.table.set(Arc::new(table));
        service
    }

    /// Load the table from `source`. Returns immediately once loaded.
    pub async fn load(&self, source: &DataSource) -> Result<()> {
        let source = source.clone();
        self.load_with(move || async move { source.fetch().await })
            .await
    }

    /// Load the table using a custom fetch.
    ///
    /// `fetch` runs only if no table is loaded and no other load is in
    /// flight; otherwise it is dropped and the caller joins the existing load.
    pub async fn load_with<F, Fut>(&self, fetch: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<LookupTable>> + Send + 'static,
    {
        if self.is_loaded() {
            return Ok(());
        }

        let shared = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            if self.is_loaded() {
                return Ok(());
            }
            match in_flight.as_ref() {
                Some(pending) => pending.clone(),
                None => {
                    let pending = fetch().map(|r| r.map(Arc::new)).boxed().shared();
                    *in_flight = Some(pending.clone());
                    pending
                }
            }
        };

        let outcome = shared.clone().await;

        {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            match &outcome {
                Ok(table) => {
                    if self.table.set(table.clone()).is_ok() {
                        tracing::info!("Loaded {} ZIP codes", table.len());
                    }
                }
                Err(e) => tracing::error!("ZIP data load failed: {}", e),
            }
            if in_flight.as_ref().is_some_and(|p| p.ptr_eq(&shared)) {
                *in_flight = None;
            }
        }

        outcome.map(|_| ())
    }

    pub fn is_loaded(&self) -> bool {
        self.table.get().is_some()
    }

    pub fn table(&self) -> Option<&Arc<LookupTable>> {
        self.table.get()
    }

    /// Resolve a raw code, reporting why nothing was found.
    pub fn try_lookup(&self, raw: &str) -> Result<LookupResult> {
        let table = self.table.get().ok_or(LookupError::NotReady)?;
        let zip = normalize_zip(raw)
            .ok_or_else(|| LookupError::Validation("Invalid ZIP code format".to_string()))?;
        table
            .resolve(&zip)
            .ok_or(LookupError::NotFound { zip })
    }

    /// Resolve a raw code; `None` when unloaded, invalid or absent.
    pub fn lookup(&self, raw: &str) -> Option<LookupResult> {
        match self.try_lookup(raw) {
            Ok(result) => Some(result),
            Err(LookupError::NotReady) => {
                tracing::warn!("lookup called before ZIP data was loaded");
                None
            }
            Err(_) => None,
        }
    }

    /// Resolve an arbitrary JSON value (string or number)
    pub fn lookup_value(&self, raw: &Value) -> Option<LookupResult> {
        self.lookup(&coerce_input(raw))
    }

    /// Resolve many codes, preserving input order.
    ///
    /// More than [`MAX_BATCH_SIZE`] codes is rejected outright.
    pub fn batch(&self, codes: &[Value]) -> Result<Vec<BatchEntry>> {
        if codes.len() > MAX_BATCH_SIZE {
            return Err(LookupError::Capacity {
                max: MAX_BATCH_SIZE,
                actual: codes.len(),
            });
        }

        Ok(codes
            .iter()
            .map(|code| {
                let raw = coerce_input(code);
                match self.try_lookup(&raw) {
                    Ok(result) => BatchEntry::Found(result),
                    Err(e) => BatchEntry::Failed(failure_for(&raw, &e)),
                }
            })
            .collect())
    }

    /// Distinct states in the loaded table
    pub fn states(&self) -> Vec<String> {
        self.table
            .get()
            .map(|t| t.states().to_vec())
            .unwrap_or_default()
    }

    pub fn stats(&self) -> TableStats {
        self.table
            .get()
            .map(|t| t.stats())
            .unwrap_or(TableStats {
                zip_codes: 0,
                states: 0,
            })
    }
}

/// Error descriptor for a failed lookup of `raw`
pub fn failure_for(raw: &str, error: &LookupError) -> LookupFailure {
    match error {
        LookupError::NotFound { zip } => LookupFailure {
            error: "ZIP code not found".to_string(),
            zip: zip.clone(),
        },
        LookupError::Validation(msg) => LookupFailure {
            error: msg.clone(),
            zip: raw.trim().to_string(),
        },
        other => LookupFailure {
            error: other.to_string(),
            zip: raw.trim().to_string(),
        },
    }
}

pub mod api;
pub mod autofill;
pub mod error;
pub mod metrics;
pub mod service;
pub mod source;
pub mod table;
pub mod types;
pub mod zipcode;

pub use api::{AppState, build_app};
pub use autofill::{Autofill, AutofillEvent, AutofillForm, AutofillOptions};
pub use error::LookupError;
pub use metrics::Metrics;
pub use service::{MAX_BATCH_SIZE, ZipLookup};
pub use source::DataSource;
pub use table::LookupTable;
pub use types::{BatchEntry, Location, LookupFailure, LookupResult};
pub use zipcode::{format_location, normalize_zip};

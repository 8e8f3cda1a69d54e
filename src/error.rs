use thiserror::Error;

/// Errors surfaced by the lookup core.
///
/// `NotFound` is an ordinary negative answer rather than a failure; callers
/// should not log it as an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    /// Malformed or missing input.
    #[error("{0}")]
    Validation(String),
    /// Valid code with no record.
    #[error("ZIP code not found: {zip}")]
    NotFound { zip: String },
    /// The artifact could not be fetched or parsed.
    #[error("failed to load ZIP data: {0}")]
    DataLoad(String),
    /// Batch larger than the allowed maximum; nothing was processed.
    #[error("batch of {actual} exceeds the maximum of {max} ZIP codes")]
    Capacity { max: usize, actual: usize },
    /// `lookup` was called before `load` completed.
    #[error("ZIP data has not been loaded")]
    NotReady,
}

pub type Result<T> = std::result::Result<T, LookupError>;

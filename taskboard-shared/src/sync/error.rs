/// Consistency engine errors
///
/// Every variant except `Store` is raised before the primary write, so an
/// engine call that fails with one of them has not mutated anything.

use crate::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The primary record, or a record it references, does not exist
    #[error("{0}")]
    NotFound(String),

    /// Input rejected by a referential or schema check
    #[error("{0}")]
    Validation(String),

    /// Unique field collision
    #[error("{field} already exists")]
    Duplicate { field: String },

    /// Backend or decoding failure
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for SyncError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(message) => SyncError::Validation(message),
            StoreError::Duplicate { field } => SyncError::Duplicate { field },
            other => SyncError::Store(other),
        }
    }
}

/// Engine result type alias
pub type SyncResult<T> = Result<T, SyncError>;

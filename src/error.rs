// Error handling module
// Defines storage and reporting-protocol error types

use thiserror::Error;

/// Errors reported by a storage backend
#[derive(Error, Debug)]
pub enum StoreError {
    /// The key does not exist
    #[error("Key not found in store")]
    NotFound,

    /// The backend does not implement this capability
    #[error("Call not supported by backend: {0}")]
    NotSupported(&'static str),

    /// A compare-and-swap lost against a concurrent modification
    #[error("Unable to complete atomic operation, key modified")]
    KeyModified,

    /// A create-only atomic put found an existing key
    #[error("Previous K/V pair exists, cannot complete atomic operation")]
    KeyExists,

    /// The backend could not be contacted
    #[error("Backend not reachable: {0}")]
    NotReachable(String),

    /// No constructor is registered under this name
    #[error("Backend storage not supported yet: {0}")]
    UnknownBackend(String),

    /// Any other backend failure
    #[error("Backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// True when the error signals a missing capability rather than a fault.
    /// Callers that need the capability must fail fast instead of retrying.
    pub fn is_not_supported(&self) -> bool {
        matches!(self, StoreError::NotSupported(_))
    }

    /// True for a missing key, which is an expected outcome of `get`
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            StoreError::NotReachable(err.to_string())
        } else {
            StoreError::Backend(err.to_string())
        }
    }
}

/// Result type alias for storage operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors decoding a line of the reporting protocol
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProtocolError {
    /// The line ended before all three fields were read
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// A count field is not an unsigned integer
    #[error("Invalid {field} count: {value:?}")]
    InvalidCount { field: &'static str, value: String },

    /// More than three fields on the line
    #[error("Unexpected trailing data: {0:?}")]
    TrailingData(String),
}

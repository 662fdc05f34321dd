//! Error types for the core library.

use thiserror::Error;

use crate::backend::BackendError;
use crate::paging::PageError;
use crate::search::ValidationError;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Request rejected before any backend call.
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    /// Backend operation failed (after retries, where retrying applies).
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// The requested folder does not exist on the backend.
    #[error("Folder not found: {0}")]
    FolderNotFound(String),

    /// No cached message at the requested position.
    #[error("No email at position {position}; {size} emails are loaded")]
    PositionNotFound {
        /// Requested 1-based position.
        position: usize,
        /// Number of cached messages at the time of the lookup.
        size: usize,
    },

    /// Requested page cannot be served.
    #[error(transparent)]
    Page(#[from] PageError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

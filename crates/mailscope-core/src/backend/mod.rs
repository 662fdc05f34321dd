//! Mail backend collaborator interface.
//!
//! The backend is slow, may fail transiently and may not support filtered
//! enumeration. Everything this crate needs from it is expressed through
//! [`MailBackend`]; "not found" and "unsupported" are ordinary return
//! values, not errors.

mod retry;

use std::fmt;
use std::future::Future;

use futures::stream::BoxStream;

pub use retry::{RetryPolicy, with_backoff};

/// Stream of backend items for one enumeration.
///
/// An `Err` element is a failure reading one item; the stream may continue
/// after it.
pub type ItemStream = BoxStream<'static, Result<RawItem, BackendError>>;

/// Errors reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// Connection drop, timeout or similar; worth retrying.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The backend cannot perform this operation.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Any other failure; retrying will not help.
    #[error("{0}")]
    Permanent(String),
}

impl BackendError {
    /// Returns true if the operation may succeed when retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Opaque handle to a resolved folder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FolderHandle {
    /// Backend-specific folder identifier.
    pub id: String,
    /// Path the folder was resolved from.
    pub path: String,
}

impl FolderHandle {
    /// Creates a folder handle.
    #[must_use]
    pub fn new(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }
}

/// A folder as listed by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderInfo {
    /// Full path (including hierarchy).
    pub path: String,
    /// Total message count (if known).
    pub total: Option<u64>,
    /// Unread message count (if known).
    pub unread: Option<u64>,
}

/// Result of a restricted enumeration request.
pub enum Restricted {
    /// Matching items, newest first when sorting was requested.
    Items(ItemStream),
    /// The backend cannot evaluate this filter; filter client-side instead.
    Unsupported,
}

impl fmt::Debug for Restricted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Items(_) => f.write_str("Restricted::Items(..)"),
            Self::Unsupported => f.write_str("Restricted::Unsupported"),
        }
    }
}

/// Sender as reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RawSender {
    /// No sender information.
    #[default]
    Missing,
    /// A single display string such as `"Alice <alice@example.com>"`.
    Text(String),
    /// Separate display name and address.
    Structured {
        /// Display name.
        name: String,
        /// Email address.
        address: String,
    },
}

/// Attachment metadata as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAttachment {
    /// File name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
}

/// A message as reported by the backend, before normalization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawItem {
    /// Stable identifier.
    pub id: String,
    /// Subject, if any.
    pub subject: Option<String>,
    /// Sender.
    pub sender: RawSender,
    /// Received time in the backend's own format.
    pub received: Option<String>,
    /// Unread flag.
    pub unread: bool,
    /// Number of attachments.
    pub attachment_count: u32,
    /// Size in bytes.
    pub size: u64,
    /// To recipients as one delimited string.
    pub to: String,
    /// CC recipients as one delimited string.
    pub cc: String,
    /// Plain text body (only on detail fetch).
    pub body: Option<String>,
    /// Attachment metadata (only on detail fetch).
    pub attachments: Option<Vec<RawAttachment>>,
}

/// The mail backend.
pub trait MailBackend: Send + Sync {
    /// Lists all folders.
    fn list_folders(&self) -> impl Future<Output = Result<Vec<FolderInfo>, BackendError>> + Send;

    /// Resolves a folder by name or path; `None` if it does not exist.
    fn resolve_folder(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<Option<FolderHandle>, BackendError>> + Send;

    /// Enumerates items matching a backend-native filter expression.
    fn enumerate_restricted(
        &self,
        folder: &FolderHandle,
        filter: &str,
        sort_desc_by_time: bool,
    ) -> impl Future<Output = Result<Restricted, BackendError>> + Send;

    /// Enumerates every item of a folder, in no particular order.
    fn enumerate_all(
        &self,
        folder: &FolderHandle,
    ) -> impl Future<Output = Result<ItemStream, BackendError>> + Send;

    /// Fetches one item with body and attachment metadata; `None` if it is gone.
    fn fetch_by_id(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<RawItem>, BackendError>> + Send;

    /// Number of items in a folder.
    fn count(&self, folder: &FolderHandle)
    -> impl Future<Output = Result<u64, BackendError>> + Send;
}

//! # mailscope-core
//!
//! Core of `MailScope`: browse and search a slow mail backend with as few
//! round-trips as possible.
//!
//! This crate provides:
//! - **Ordered cache** - messages keyed by identifier, kept newest-first, with a size cap
//! - **Snapshot persistence** - batched background saves plus a synchronous flush path
//! - **Filter builder** - backend-native filter expressions from search terms
//! - **Search orchestrator** - restricted search with widening and cross-field escalation
//! - **Pagination** - page arithmetic and rendering over the cached order
//!
//! The mail backend itself is a collaborator, consumed through [`MailBackend`].
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailscope_core::{Config, MailCache, SearchRequest};
//!
//! let mail = MailCache::open(Config::default(), backend).await?;
//! mail.clear_cache().await;
//! let outcome = mail.search(&SearchRequest::new("invoice").with_days(7)).await?;
//! println!("{}", outcome.note);
//! println!("{}", mail.view_page(1, None)?.render());
//! mail.shutdown().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod backend;
pub mod cache;
pub mod config;
mod error;
pub mod filter;
pub mod model;
pub mod paging;
pub mod persist;
pub mod search;
pub mod service;
pub mod time;

pub use backend::{
    BackendError, FolderHandle, FolderInfo, ItemStream, MailBackend, RawAttachment, RawItem,
    RawSender, Restricted, RetryPolicy,
};
pub use cache::{OrderedCache, Snapshot};
pub use config::{CacheConfig, Config, ConfigBuilder, PagingConfig, PersistConfig, SearchConfig};
pub use error::{Error, Result};
pub use filter::{Filter, SearchField};
pub use model::{AttachmentInfo, ConversionError, MessageSummary, Recipient};
pub use paging::{Page, PageError, PageInfo};
pub use persist::{Persister, SnapshotStore};
pub use search::{
    ListOutcome, MatchMode, SearchOrchestrator, SearchOutcome, SearchRequest, SearchStage,
    StopSignal, Truncation, ValidationError,
};
pub use service::{DetailStatus, MailCache, MessageDetail};
pub use time::{Clock, MockClock, SystemClock};

//! High-level mail cache service.
//!
//! [`MailCache`] ties the backend, the ordered cache, persistence and the
//! search orchestrator together behind the operations a tool layer needs.

use std::sync::Arc;

use tracing::{info, warn};

use crate::backend::{FolderInfo, MailBackend, with_backoff};
use crate::cache::OrderedCache;
use crate::config::Config;
use crate::model::MessageSummary;
use crate::paging::{self, Page};
use crate::persist::Persister;
use crate::search::{
    ListOutcome, SearchOrchestrator, SearchOutcome, SearchRequest, StopSignal, ValidationError,
};
use crate::time::{Clock, SystemClock};
use crate::{Error, Result};

/// Where the details of a looked-up message came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailStatus {
    /// Already complete in the cache.
    Cached,
    /// Fetched from the backend just now.
    Fetched,
    /// Details could not be fetched; the cached summary is returned.
    Unavailable(String),
}

/// A message looked up by position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDetail {
    /// 1-based position in the cached order.
    pub position: usize,
    /// The message, with details when they could be loaded.
    pub message: Arc<MessageSummary>,
    /// Origin of the details.
    pub status: DetailStatus,
}

impl MessageDetail {
    /// Renders the message for display.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = format!("Email #{}\n{}", self.position, self.message.render_detail());
        if let DetailStatus::Unavailable(reason) = &self.status {
            out.push_str("\n\n(Details unavailable: ");
            out.push_str(reason);
            out.push(')');
        }
        out
    }
}

/// Mail cache service over a backend.
///
/// # Example
///
/// ```ignore
/// let mail = MailCache::open(Config::load("mailscope.toml")?, backend).await?;
/// let listed = mail.list_recent(Some("Inbox"), Some(7)).await?;
/// println!("{}", listed.note);
/// println!("{}", mail.view_page(1, Some(5))?.render());
/// println!("{}", mail.get_by_position(1).await?.render());
/// ```
#[derive(Debug)]
pub struct MailCache<B> {
    backend: B,
    config: Config,
    clock: Arc<dyn Clock>,
    cache: Arc<OrderedCache>,
    persister: Persister,
}

impl<B: MailBackend> MailCache<B> {
    /// Opens the service, restoring a fresh snapshot if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub async fn open(config: Config, backend: B) -> Result<Self> {
        Self::open_with_clock(config, backend, Arc::new(SystemClock)).await
    }

    /// Opens the service with an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub async fn open_with_clock(config: Config, backend: B, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        let (cache, persister) = Persister::spawn(&config, Arc::clone(&clock));
        let restored = persister.load().await;
        info!(
            restored,
            snapshot = %persister.store().path().display(),
            "Mail cache opened"
        );
        Ok(Self {
            backend,
            config,
            clock,
            cache,
            persister,
        })
    }

    /// The ordered cache.
    #[must_use]
    pub fn cache(&self) -> &OrderedCache {
        &self.cache
    }

    /// The backend.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// The active configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Number of cached messages.
    #[must_use]
    pub fn size(&self) -> usize {
        self.cache.len()
    }

    fn orchestrator(&self) -> SearchOrchestrator<'_, B> {
        SearchOrchestrator::new(&self.backend, &self.cache, &self.config, self.clock.as_ref())
    }

    /// Lists recent messages of a folder into the cache, then saves.
    ///
    /// # Errors
    ///
    /// See [`SearchOrchestrator::list`].
    pub async fn list_recent(&self, folder: Option<&str>, days: Option<u32>) -> Result<ListOutcome> {
        self.list_recent_until(folder, days, &StopSignal::never()).await
    }

    /// Like [`MailCache::list_recent`], stopping early when `stop` fires.
    ///
    /// # Errors
    ///
    /// See [`SearchOrchestrator::list`].
    pub async fn list_recent_until(
        &self,
        folder: Option<&str>,
        days: Option<u32>,
        stop: &StopSignal,
    ) -> Result<ListOutcome> {
        let mut outcome = self.orchestrator().list(folder, days, stop).await?;
        self.save_after(&mut outcome.note).await;
        Ok(outcome)
    }

    /// Searches with escalation, then saves.
    ///
    /// # Errors
    ///
    /// See [`SearchOrchestrator::search`].
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchOutcome> {
        self.search_until(request, &StopSignal::never()).await
    }

    /// Like [`MailCache::search`], stopping early when `stop` fires.
    ///
    /// # Errors
    ///
    /// See [`SearchOrchestrator::search`].
    pub async fn search_until(&self, request: &SearchRequest, stop: &StopSignal) -> Result<SearchOutcome> {
        let mut outcome = self.orchestrator().search(request, stop).await?;
        self.save_after(&mut outcome.note).await;
        Ok(outcome)
    }

    async fn save_after(&self, note: &mut String) {
        if let Err(e) = self.persister.save_now().await {
            warn!(error = %e, "Failed to save cache snapshot");
            note.push_str(" Cache could not be saved: ");
            note.push_str(&e.to_string());
            note.push('.');
        }
    }

    /// Serves a page of the cached order; `page_size` defaults to the
    /// configured page size.
    ///
    /// # Errors
    ///
    /// See [`paging::page`].
    pub fn view_page(&self, page: usize, page_size: Option<usize>) -> Result<Page> {
        let size = page_size.unwrap_or(self.config.paging.default_page_size);
        paging::page(&self.cache, page, size, &self.config.paging)
    }

    /// Looks up the message at 1-based `position`, fetching its body and
    /// attachments from the backend when they are not cached yet.
    ///
    /// A failed fetch is not an error: the cached summary is returned with
    /// [`DetailStatus::Unavailable`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for position zero and
    /// [`Error::PositionNotFound`] past the end of the cache.
    pub async fn get_by_position(&self, position: usize) -> Result<MessageDetail> {
        if position == 0 {
            return Err(ValidationError::ZeroPosition.into());
        }
        let Some(message) = self.cache.get_by_position(position) else {
            return Err(Error::PositionNotFound {
                position,
                size: self.cache.len(),
            });
        };
        if !message.needs_detail() {
            return Ok(MessageDetail {
                position,
                message,
                status: DetailStatus::Cached,
            });
        }

        let backend = &self.backend;
        let id = message.id.as_str();
        let fetched = with_backoff(&self.config.retry, "fetch_by_id", move || backend.fetch_by_id(id)).await;

        let reason = match fetched {
            Ok(Some(raw)) => match MessageSummary::from_raw(raw) {
                Ok(detail) => {
                    let mut merged = (*message).clone();
                    merged.merge_detail(detail);
                    self.cache.put(merged.clone());
                    return Ok(MessageDetail {
                        position,
                        message: Arc::new(merged),
                        status: DetailStatus::Fetched,
                    });
                }
                Err(e) => e.to_string(),
            },
            Ok(None) => "the message no longer exists on the server".to_string(),
            Err(e) => e.to_string(),
        };
        warn!(id = %message.id, %reason, "Could not load message details");
        Ok(MessageDetail {
            position,
            message,
            status: DetailStatus::Unavailable(reason),
        })
    }

    /// Empties the cache and removes the snapshot. Never fails; a snapshot
    /// that cannot be removed is logged.
    pub async fn clear_cache(&self) {
        self.cache.clear();
        if let Err(e) = self.persister.delete().await {
            warn!(error = %e, "Failed to delete cache snapshot");
        }
        info!("Cache cleared");
    }

    /// Lists the backend's folders.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Backend`] once retries are exhausted.
    pub async fn list_folders(&self) -> Result<Vec<FolderInfo>> {
        let backend = &self.backend;
        with_backoff(&self.config.retry, "list_folders", move || backend.list_folders())
            .await
            .map_err(Error::from)
    }

    /// Number of messages in a folder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FolderNotFound`] for an unknown folder and
    /// [`Error::Backend`] once retries are exhausted.
    pub async fn folder_count(&self, path: &str) -> Result<u64> {
        let backend = &self.backend;
        let retry = &self.config.retry;
        let folder = with_backoff(retry, "resolve_folder", move || backend.resolve_folder(path))
            .await?
            .ok_or_else(|| Error::FolderNotFound(path.to_string()))?;
        let folder = &folder;
        with_backoff(retry, "count", move || backend.count(folder))
            .await
            .map_err(Error::from)
    }

    /// Writes the snapshot now.
    ///
    /// # Errors
    ///
    /// Returns the I/O or serialization error of the write.
    pub async fn save_now(&self) -> Result<()> {
        self.persister.save_now().await
    }

    /// Flushes pending writes and stops the background worker.
    ///
    /// # Errors
    ///
    /// Returns the error of the final flush.
    pub async fn shutdown(self) -> Result<()> {
        self.persister.shutdown().await
    }
}

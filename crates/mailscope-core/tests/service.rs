//! End-to-end tests for the mail cache service.
//!
//! These tests use an in-memory backend that records every call, so the
//! number and order of backend round-trips can be checked.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use futures::stream;

use mailscope_core::{
    BackendError, Clock, Config, DetailStatus, Error, FolderHandle, FolderInfo, ItemStream,
    MailBackend, MailCache, MockClock, PageError, RawAttachment, RawItem, RawSender, Restricted,
    RetryPolicy, SearchField, SearchRequest, SearchStage,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("mailscope_core=debug")
        .with_test_writer()
        .try_init();
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 24, 10, 0, 0).unwrap()
}

fn item(id: &str, subject: &str, hours_ago: i64) -> RawItem {
    RawItem {
        id: id.to_string(),
        subject: Some(subject.to_string()),
        sender: RawSender::Structured {
            name: "Billing".to_string(),
            address: "billing@example.com".to_string(),
        },
        received: Some((now() - TimeDelta::hours(hours_ago)).to_rfc3339()),
        unread: true,
        size: 2048,
        to: "Me <me@example.com>".to_string(),
        ..RawItem::default()
    }
}

/// A backend call, as recorded by [`MemoryBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Resolve(String),
    Restricted(String),
    All,
    Fetch(String),
    Count,
    Folders,
}

/// In-memory backend.
///
/// Restricted enumerations answer from `script` in order; once the script
/// is exhausted the backend reports restriction as unsupported, so the
/// service falls back to filtering `items` locally.
#[derive(Default)]
struct MemoryBackend {
    items: Vec<RawItem>,
    script: Mutex<VecDeque<Vec<RawItem>>>,
    details: HashMap<String, RawItem>,
    fetch_failures: Mutex<u32>,
    calls: Mutex<Vec<Call>>,
}

impl MemoryBackend {
    fn with_items(items: Vec<RawItem>) -> Self {
        Self {
            items,
            ..Self::default()
        }
    }

    fn script(self, answers: Vec<Vec<RawItem>>) -> Self {
        *self.script.lock().unwrap() = answers.into();
        self
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn restricted_filters(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Restricted(filter) => Some(filter),
                _ => None,
            })
            .collect()
    }

    fn fetches(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Fetch(_)))
            .count()
    }
}

impl MailBackend for MemoryBackend {
    async fn list_folders(&self) -> Result<Vec<FolderInfo>, BackendError> {
        self.record(Call::Folders);
        Ok(vec![FolderInfo {
            path: "Inbox".to_string(),
            total: Some(self.items.len() as u64),
            unread: None,
        }])
    }

    async fn resolve_folder(&self, path: &str) -> Result<Option<FolderHandle>, BackendError> {
        self.record(Call::Resolve(path.to_string()));
        Ok(path
            .eq_ignore_ascii_case("inbox")
            .then(|| FolderHandle::new("folder-1", "Inbox")))
    }

    async fn enumerate_restricted(
        &self,
        _folder: &FolderHandle,
        filter: &str,
        _sort_desc_by_time: bool,
    ) -> Result<Restricted, BackendError> {
        self.record(Call::Restricted(filter.to_string()));
        let answer = self.script.lock().unwrap().pop_front();
        Ok(answer.map_or(Restricted::Unsupported, |items| {
            Restricted::Items(Box::pin(stream::iter(items.into_iter().map(Ok))))
        }))
    }

    async fn enumerate_all(&self, _folder: &FolderHandle) -> Result<ItemStream, BackendError> {
        self.record(Call::All);
        Ok(Box::pin(stream::iter(self.items.clone().into_iter().map(Ok))))
    }

    async fn fetch_by_id(&self, id: &str) -> Result<Option<RawItem>, BackendError> {
        self.record(Call::Fetch(id.to_string()));
        {
            let mut failures = self.fetch_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(BackendError::Transient("connection reset".into()));
            }
        }
        Ok(self.details.get(id).cloned())
    }

    async fn count(&self, _folder: &FolderHandle) -> Result<u64, BackendError> {
        self.record(Call::Count);
        Ok(self.items.len() as u64)
    }
}

fn config(snapshot: &Path) -> Config {
    Config::builder()
        .snapshot_path(snapshot)
        .retry(RetryPolicy {
            max_attempts: 3,
            initial_delay_ms: 1,
            multiplier: 2,
            max_delay_ms: 5,
        })
        .build()
}

fn clock() -> Arc<MockClock> {
    Arc::new(MockClock::starting_at(now()))
}

/// Twelve messages inside the last week, plus two older ones.
fn inbox() -> Vec<RawItem> {
    let mut items: Vec<RawItem> = (0..12)
        .map(|i| item(&format!("recent-{i:02}"), &format!("Update {i}"), 2 + i * 10))
        .collect();
    items.push(item("old-1", "Ancient", 24 * 9));
    items.push(item("old-2", "Older", 24 * 12));
    items
}

#[tokio::test]
async fn test_list_page_and_lookup() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let backend = MemoryBackend::with_items(inbox());
    let mail = MailCache::open_with_clock(config(&dir.path().join("cache.json")), backend, clock())
        .await
        .unwrap();

    mail.clear_cache().await;
    let listed = mail.list_recent(Some("Inbox"), Some(7)).await.unwrap();
    assert_eq!(listed.count, 12);
    assert!(listed.client_side);
    assert!(listed.note.starts_with("Loaded 12 emails from Inbox"), "{}", listed.note);
    assert_eq!(mail.size(), 12);

    let page = mail.view_page(1, Some(5)).unwrap();
    let ids: Vec<&str> = page.items.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["recent-00", "recent-01", "recent-02", "recent-03", "recent-04"]);
    assert_eq!(page.info.total_pages, 3);

    let err = mail.get_by_position(13).await.unwrap_err();
    assert!(matches!(err, Error::PositionNotFound { position: 13, size: 12 }));
    assert!(err.to_string().contains("12 emails are loaded"));

    let calls = mail.backend().calls();
    assert_eq!(calls[0], Call::Resolve("Inbox".to_string()));
    assert!(matches!(calls[1], Call::Restricted(_)));
    assert_eq!(calls[2], Call::All);
    assert_eq!(calls.len(), 3);

    mail.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_search_widens_window() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let invoices = vec![
        item("inv-1", "Invoice January", 24 * 10),
        item("inv-2", "Invoice December", 24 * 20),
        item("inv-3", "Invoice overdue", 24 * 12),
    ];
    let backend = MemoryBackend::default().script(vec![Vec::new(), invoices]);
    let mail = MailCache::open_with_clock(config(&dir.path().join("cache.json")), backend, clock())
        .await
        .unwrap();

    let request = SearchRequest::new("invoice")
        .with_days(7)
        .with_field(SearchField::Subject);
    let outcome = mail.search(&request).await.unwrap();

    assert_eq!(outcome.len(), 3);
    assert_eq!(outcome.stage, SearchStage::Widened);
    assert_eq!(outcome.days, 28);
    assert!(outcome.note.contains("widened to 28 days"), "{}", outcome.note);
    let ids: Vec<&str> = outcome.matches.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["inv-1", "inv-3", "inv-2"]);

    let filters = mail.backend().restricted_filters();
    assert_eq!(filters.len(), 2);
    assert_eq!(
        filters[0],
        "@SQL=\"urn:schemas:httpmail:subject\" LIKE '%invoice%' AND \"urn:schemas:httpmail:datereceived\" >= '2026-01-17 10:00'"
    );
    assert!(filters[1].ends_with(">= '2025-12-27 10:00'"), "{}", filters[1]);
    assert_eq!(mail.size(), 3);
}

#[tokio::test]
async fn test_escalation_reaches_cross_field() {
    let dir = tempfile::tempdir().unwrap();
    let backend = MemoryBackend::default().script(vec![
        Vec::new(),
        Vec::new(),
        vec![item("body-hit", "Re: your order", 24 * 3)],
    ]);
    let mail = MailCache::open_with_clock(config(&dir.path().join("cache.json")), backend, clock())
        .await
        .unwrap();

    let outcome = mail
        .search(&SearchRequest::new("tracking number"))
        .await
        .unwrap();
    assert_eq!(outcome.stage, SearchStage::CrossField);
    assert_eq!(outcome.field, SearchField::Body);
    assert_eq!(outcome.matches[0].id, "body-hit");

    let filters = mail.backend().restricted_filters();
    assert_eq!(filters.len(), 3);
    assert!(filters[0].contains("'%tracking%' AND"));
    assert!(filters[1].contains("'%tracking%' OR"));
    assert!(filters[2].contains("urn:schemas:httpmail:textdescription"));
}

#[tokio::test]
async fn test_details_are_fetched_once() {
    let dir = tempfile::tempdir().unwrap();
    let mut backend = MemoryBackend::with_items(inbox());
    let mut detail = item("recent-00", "Update 0", 2);
    detail.body = Some("Full text".to_string());
    detail.attachments = Some(vec![RawAttachment {
        name: "report.pdf".to_string(),
        size: 1024,
    }]);
    detail.unread = false;
    backend.details.insert("recent-00".to_string(), detail);
    *backend.fetch_failures.lock().unwrap() = 1;

    let mail = MailCache::open_with_clock(config(&dir.path().join("cache.json")), backend, clock())
        .await
        .unwrap();
    mail.list_recent(None, None).await.unwrap();

    let first = mail.get_by_position(1).await.unwrap();
    assert_eq!(first.status, DetailStatus::Fetched);
    assert_eq!(first.message.body.as_deref(), Some("Full text"));
    assert!(first.message.has_attachments);
    assert!(first.render().contains("report.pdf"));

    let again = mail.get_by_position(1).await.unwrap();
    assert_eq!(again.status, DetailStatus::Cached);
    // One transient failure, one successful retry, nothing on the second lookup.
    assert_eq!(mail.backend().fetches(), 2);
    assert_eq!(mail.cache().ordered_ids()[0], "recent-00");
}

#[tokio::test]
async fn test_missing_details_are_reported_not_raised() {
    let dir = tempfile::tempdir().unwrap();
    let backend = MemoryBackend::with_items(inbox());
    let mail = MailCache::open_with_clock(config(&dir.path().join("cache.json")), backend, clock())
        .await
        .unwrap();
    mail.list_recent(None, None).await.unwrap();

    let detail = mail.get_by_position(2).await.unwrap();
    assert!(matches!(detail.status, DetailStatus::Unavailable(_)));
    assert_eq!(detail.message.id, "recent-01");
    assert!(detail.render().contains("Details unavailable"));
}

#[tokio::test]
async fn test_snapshot_survives_restart_until_expiry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");
    let clock = clock();

    let mail = MailCache::open_with_clock(config(&path), MemoryBackend::with_items(inbox()), clock.clone())
        .await
        .unwrap();
    mail.list_recent(None, Some(7)).await.unwrap();
    let order = mail.cache().ordered_ids();
    let first = mail.cache().get("recent-00").unwrap();
    mail.shutdown().await.unwrap();
    assert!(path.exists());

    let expiry = config(&path).cache.expiry();
    clock.advance(expiry - Duration::from_secs(1));
    let reopened = MailCache::open_with_clock(config(&path), MemoryBackend::default(), clock.clone())
        .await
        .unwrap();
    assert_eq!(reopened.size(), 12);
    assert_eq!(reopened.cache().ordered_ids(), order);
    assert_eq!(reopened.cache().get("recent-00").unwrap(), first);
    assert!(reopened.backend().calls().is_empty());
    drop(reopened);

    clock.advance(Duration::from_secs(2));
    let expired = MailCache::open_with_clock(config(&path), MemoryBackend::default(), clock.clone())
        .await
        .unwrap();
    assert_eq!(expired.size(), 0);
    let err = expired.view_page(1, None).unwrap_err();
    assert!(matches!(err, Error::Page(PageError::NothingLoaded)));
}

#[tokio::test]
async fn test_corrupt_snapshot_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");
    std::fs::write(&path, "{\"version\":1,\"savedAt\":").unwrap();

    let mail = MailCache::open_with_clock(config(&path), MemoryBackend::default(), clock())
        .await
        .unwrap();
    assert_eq!(mail.size(), 0);
}

#[tokio::test]
async fn test_clear_cache_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.json");
    let mail = MailCache::open_with_clock(config(&path), MemoryBackend::with_items(inbox()), clock())
        .await
        .unwrap();
    mail.list_recent(None, None).await.unwrap();
    assert!(path.exists());

    mail.clear_cache().await;
    assert_eq!(mail.size(), 0);
    assert!(!path.exists());
    mail.clear_cache().await;
    assert_eq!(mail.size(), 0);
}

#[tokio::test]
async fn test_unknown_folder_and_counts() {
    let dir = tempfile::tempdir().unwrap();
    let mail = MailCache::open_with_clock(
        config(&dir.path().join("cache.json")),
        MemoryBackend::with_items(inbox()),
        clock(),
    )
    .await
    .unwrap();

    let err = mail.list_recent(Some("Archive"), None).await.unwrap_err();
    assert!(matches!(err, Error::FolderNotFound(ref f) if f == "Archive"));

    assert_eq!(mail.folder_count("inbox").await.unwrap(), 14);
    assert!(matches!(
        mail.folder_count("Nope").await,
        Err(Error::FolderNotFound(_))
    ));
    let folders = mail.list_folders().await.unwrap();
    assert_eq!(folders[0].path, "Inbox");
}

#[tokio::test]
async fn test_save_failure_is_noted_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("file");
    std::fs::write(&blocker, "").unwrap();

    let mail = MailCache::open_with_clock(
        config(&blocker.join("cache.json")),
        MemoryBackend::with_items(inbox()),
        clock(),
    )
    .await
    .unwrap();
    let listed = mail.list_recent(None, None).await.unwrap();
    assert_eq!(listed.count, 12);
    assert!(listed.note.contains("Cache could not be saved"), "{}", listed.note);
    assert!(mail.save_now().await.is_err());
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let config = Config::builder().max_entries(0).build();
    let result = MailCache::open(config, MemoryBackend::default()).await;
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_clock_is_object_safe() {
    let clock: Arc<dyn Clock> = clock();
    assert_eq!(clock.now(), now());
}

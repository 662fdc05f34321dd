//! Runtime configuration.
//!
//! Every section has defaults; a TOML document only needs to name the
//! values it overrides:
//!
//! ```toml
//! [cache]
//! max_entries = 2000
//!
//! [search]
//! max_days = 60
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::RetryPolicy;
use crate::filter::SearchField;
use crate::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ordered cache settings.
    pub cache: CacheConfig,
    /// Snapshot persistence settings.
    pub persist: PersistConfig,
    /// Search orchestration settings.
    pub search: SearchConfig,
    /// Pagination settings.
    pub paging: PagingConfig,
    /// Backend retry policy.
    pub retry: RetryPolicy,
}

impl Config {
    /// Creates a configuration builder seeded with the defaults.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    /// Parses a TOML document, filling unspecified values with defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not valid TOML, does not match the
    /// configuration schema, or fails [`Config::validate`].
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or does not parse.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(Error::Config(msg.to_string()));

        if self.cache.max_entries == 0 {
            return invalid("cache.max_entries must be at least 1");
        }
        if self.persist.batch_size == 0 {
            return invalid("persist.batch_size must be at least 1");
        }
        if self.persist.queue_capacity == 0 {
            return invalid("persist.queue_capacity must be at least 1");
        }
        if self.search.min_days == 0 || self.search.min_days > self.search.max_days {
            return invalid("search.min_days must be between 1 and search.max_days");
        }
        if self.search.widen_factor == 0 {
            return invalid("search.widen_factor must be at least 1");
        }
        if self.search.max_items_per_attempt == 0 {
            return invalid("search.max_items_per_attempt must be at least 1");
        }
        if !(self.search.item_failure_ratio > 0.0 && self.search.item_failure_ratio <= 1.0) {
            return invalid("search.item_failure_ratio must be in (0, 1]");
        }
        if self.search.default_folder.trim().is_empty() {
            return invalid("search.default_folder must not be empty");
        }
        if self.paging.max_page_size == 0 || self.paging.default_page_size == 0 {
            return invalid("paging sizes must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1");
        }
        Ok(())
    }
}

/// Ordered cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached messages; the oldest are evicted beyond this.
    pub max_entries: usize,
    /// Below this size, insertion uses a linear scan instead of binary search.
    pub linear_scan_threshold: usize,
    /// Location of the snapshot file.
    pub snapshot_path: PathBuf,
    /// Snapshots older than this are ignored on load.
    pub expiry_secs: u64,
}

impl CacheConfig {
    /// Snapshot expiry window.
    #[must_use]
    pub const fn expiry(&self) -> Duration {
        Duration::from_secs(self.expiry_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            linear_scan_threshold: 64,
            snapshot_path: default_snapshot_path(),
            expiry_secs: 24 * 60 * 60,
        }
    }
}

/// Default snapshot location under the user cache directory.
fn default_snapshot_path() -> PathBuf {
    dirs::cache_dir().map_or_else(
        || PathBuf::from("mailscope-cache.json"),
        |dir| dir.join("mailscope").join("cache.json"),
    )
}

/// Snapshot persistence settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    /// Pending writes that trigger a background save.
    pub batch_size: usize,
    /// Minimum time between two non-forced background saves.
    pub min_save_interval_ms: u64,
    /// Capacity of the save request queue.
    pub queue_capacity: usize,
}

impl PersistConfig {
    /// Minimum interval between non-forced saves.
    #[must_use]
    pub const fn min_save_interval(&self) -> Duration {
        Duration::from_millis(self.min_save_interval_ms)
    }
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            batch_size: 25,
            min_save_interval_ms: 5_000,
            queue_capacity: 8,
        }
    }
}

/// Search orchestration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Smallest accepted lookback window in days.
    pub min_days: u32,
    /// Largest accepted lookback window in days.
    pub max_days: u32,
    /// Window used when the caller does not give one.
    pub default_days: u32,
    /// Multiplier applied to the window on the widened attempt.
    pub widen_factor: u32,
    /// Upper bound of the widened window (never above `max_days`).
    pub max_widened_days: u32,
    /// Folder searched when the request names none.
    pub default_folder: String,
    /// Raw backend items processed per attempt before stopping early.
    pub max_items_per_attempt: usize,
    /// Per-item failures tolerated before the failure ratio is considered.
    pub item_failure_floor: usize,
    /// Failure ratio above which an attempt is abandoned.
    pub item_failure_ratio: f64,
    /// Field tried on cross-field escalation when the request already used subject.
    pub secondary_field: SearchField,
}

impl SearchConfig {
    /// Clamps a lookback window into `[min_days, max_days]`.
    #[must_use]
    pub fn clamp_days(&self, days: u32) -> u32 {
        days.clamp(self.min_days, self.max_days.max(self.min_days))
    }

    /// Computes the widened window for an escalated attempt.
    #[must_use]
    pub fn widened_days(&self, days: u32) -> u32 {
        let cap = self.max_widened_days.min(self.max_days).max(days);
        days.saturating_mul(self.widen_factor).min(cap)
    }

    /// Whether `failures` out of `seen` items exceeds the tolerance.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // counts stay far below 2^52
    pub fn exceeds_failure_tolerance(&self, failures: usize, seen: usize) -> bool {
        if failures < self.item_failure_floor.max(1) || seen == 0 {
            return false;
        }
        failures as f64 / seen as f64 > self.item_failure_ratio
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_days: 1,
            max_days: 30,
            default_days: 7,
            widen_factor: 4,
            max_widened_days: 30,
            default_folder: "Inbox".to_string(),
            max_items_per_attempt: 5_000,
            item_failure_floor: 5,
            item_failure_ratio: 0.5,
            secondary_field: SearchField::Body,
        }
    }
}

/// Pagination settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagingConfig {
    /// Page size used when the caller does not give one.
    pub default_page_size: usize,
    /// Largest page size served; bigger requests are clamped.
    pub max_page_size: usize,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            default_page_size: 10,
            max_page_size: 50,
        }
    }
}

/// Builder for [`Config`].
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of cached messages.
    #[must_use]
    pub const fn max_entries(mut self, max_entries: usize) -> Self {
        self.config.cache.max_entries = max_entries;
        self
    }

    /// Sets the size below which insertion uses a linear scan.
    #[must_use]
    pub const fn linear_scan_threshold(mut self, threshold: usize) -> Self {
        self.config.cache.linear_scan_threshold = threshold;
        self
    }

    /// Sets the snapshot file location.
    #[must_use]
    pub fn snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.cache.snapshot_path = path.into();
        self
    }

    /// Sets the snapshot expiry window.
    #[must_use]
    pub const fn expiry(mut self, expiry: Duration) -> Self {
        self.config.cache.expiry_secs = expiry.as_secs();
        self
    }

    /// Sets the pending-write count that triggers a background save.
    #[must_use]
    pub const fn batch_size(mut self, batch_size: usize) -> Self {
        self.config.persist.batch_size = batch_size;
        self
    }

    /// Sets the minimum interval between non-forced saves.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)] // intervals are far below u64::MAX ms
    pub const fn min_save_interval(mut self, interval: Duration) -> Self {
        self.config.persist.min_save_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Sets the lookback window bounds.
    #[must_use]
    pub const fn days_range(mut self, min_days: u32, max_days: u32) -> Self {
        self.config.search.min_days = min_days;
        self.config.search.max_days = max_days;
        self
    }

    /// Sets the widening multiplier and cap.
    #[must_use]
    pub const fn widening(mut self, factor: u32, max_widened_days: u32) -> Self {
        self.config.search.widen_factor = factor;
        self.config.search.max_widened_days = max_widened_days;
        self
    }

    /// Sets the folder used when requests name none.
    #[must_use]
    pub fn default_folder(mut self, folder: impl Into<String>) -> Self {
        self.config.search.default_folder = folder.into();
        self
    }

    /// Sets the per-attempt raw item cap.
    #[must_use]
    pub const fn max_items_per_attempt(mut self, cap: usize) -> Self {
        self.config.search.max_items_per_attempt = cap;
        self
    }

    /// Sets the per-item failure tolerance.
    #[must_use]
    pub const fn item_failure_tolerance(mut self, floor: usize, ratio: f64) -> Self {
        self.config.search.item_failure_floor = floor;
        self.config.search.item_failure_ratio = ratio;
        self
    }

    /// Sets the maximum page size.
    #[must_use]
    pub const fn max_page_size(mut self, size: usize) -> Self {
        self.config.paging.max_page_size = size;
        self
    }

    /// Sets the backend retry policy.
    #[must_use]
    pub const fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> Config {
        self.config
    }
}

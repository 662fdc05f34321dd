//! In-memory ordered message store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::snapshot::{SNAPSHOT_VERSION, Snapshot};
use crate::config::CacheConfig;
use crate::model::{MessageSummary, TimestampMemo};
use crate::persist::SaveSignal;

/// Message cache ordered by received time, newest first.
///
/// The map and the order list always hold the same identifiers. All
/// structural operations take one mutex for their duration; readers copy
/// what they need and release it before doing anything slow.
#[derive(Debug)]
pub struct OrderedCache {
    max_entries: usize,
    linear_scan_threshold: usize,
    state: Mutex<CacheState>,
    signal: Option<SaveSignal>,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, Arc<MessageSummary>>,
    order: Arc<Vec<String>>,
    memo: TimestampMemo,
}

impl OrderedCache {
    /// Creates an empty cache that is not connected to persistence.
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            max_entries: config.max_entries.max(1),
            linear_scan_threshold: config.linear_scan_threshold,
            state: Mutex::new(CacheState::default()),
            signal: None,
        }
    }

    /// Creates an empty cache that notifies `signal` on mutation.
    pub(crate) fn with_signal(config: &CacheConfig, signal: SaveSignal) -> Self {
        Self {
            signal: Some(signal),
            ..Self::new(config)
        }
    }

    /// Maximum number of entries.
    #[must_use]
    pub const fn max_entries(&self) -> usize {
        self.max_entries
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // Mutations never leave map and order half-updated, so a poisoned
        // lock still guards a consistent state.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts or replaces a record, returning the identifiers evicted to
    /// stay within the size cap.
    ///
    /// A replacement is removed from its old position and re-inserted at the
    /// position of its received time, after any records with the same time.
    pub fn put(&self, record: MessageSummary) -> Vec<String> {
        let evicted = {
            let mut state = self.lock();
            state.insert(record, self.linear_scan_threshold);
            state.evict_to(self.max_entries)
        };
        if !evicted.is_empty() {
            debug!(count = evicted.len(), "Evicted oldest cache entries");
        }
        if let Some(signal) = &self.signal {
            signal.request_save(false);
        }
        evicted
    }

    /// Looks up a record by identifier.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<MessageSummary>> {
        self.lock().entries.get(id).cloned()
    }

    /// Looks up a record by 1-based position in the order list.
    #[must_use]
    pub fn get_by_position(&self, position: usize) -> Option<Arc<MessageSummary>> {
        let state = self.lock();
        let id = state.order.get(position.checked_sub(1)?)?;
        state.entries.get(id).cloned()
    }

    /// Returns the current order list (newest first).
    ///
    /// The list is shared; later mutations copy it rather than change it.
    #[must_use]
    pub fn ordered_ids(&self) -> Arc<Vec<String>> {
        Arc::clone(&self.lock().order)
    }

    /// Returns the records of `ids` that are still cached, in the given order.
    #[must_use]
    pub fn get_many(&self, ids: &[String]) -> Vec<Arc<MessageSummary>> {
        let state = self.lock();
        ids.iter()
            .filter_map(|id| state.entries.get(id).cloned())
            .collect()
    }

    /// Parses a received time through the cache's timestamp memo.
    #[must_use]
    pub fn received_at(&self, raw: &str) -> Option<DateTime<Utc>> {
        self.lock().memo.parse(raw)
    }

    /// Removes every record and asks persistence to delete the snapshot.
    pub fn clear(&self) {
        {
            let mut state = self.lock();
            state.entries.clear();
            state.order = Arc::new(Vec::new());
        }
        if let Some(signal) = &self.signal {
            signal.request_delete();
        }
    }

    /// Number of cached records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    /// Returns true if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies the current contents into a snapshot stamped `saved_at`.
    #[must_use]
    pub fn snapshot(&self, saved_at: DateTime<Utc>) -> Snapshot {
        let state = self.lock();
        Snapshot {
            version: SNAPSHOT_VERSION,
            saved_at,
            cache: state.entries.clone(),
            order: Arc::clone(&state.order),
        }
    }

    /// Replaces the contents with a loaded snapshot, returning the number of
    /// records kept.
    ///
    /// Inconsistent snapshots are rejected and leave the cache untouched.
    /// Records beyond the size cap are evicted from the oldest end.
    pub fn restore(&self, snapshot: Snapshot) -> usize {
        if !snapshot.is_consistent() {
            debug!("Refusing to restore an inconsistent snapshot");
            return 0;
        }
        let mut state = self.lock();
        state.entries = snapshot.cache;
        state.order = snapshot.order;
        let evicted = state.evict_to(self.max_entries);
        if !evicted.is_empty() {
            debug!(count = evicted.len(), "Trimmed restored snapshot to size cap");
        }
        state.order.len()
    }
}

impl CacheState {
    fn insert(&mut self, record: MessageSummary, linear_scan_threshold: usize) {
        let key = self.memo.parse(&record.received);
        let replaced = self.entries.contains_key(&record.id);

        let order = Arc::make_mut(&mut self.order);
        if replaced && let Some(pos) = order.iter().position(|id| *id == record.id) {
            order.remove(pos);
        }

        let entries = &self.entries;
        let memo = &mut self.memo;
        let mut key_of = |id: &String| {
            entries
                .get(id)
                .and_then(|r| memo.parse(&r.received))
        };

        // First position holding something strictly older; equal times stay
        // in insertion order.
        let pos = if order.len() < linear_scan_threshold {
            order
                .iter()
                .position(|id| key_of(id) < key)
                .unwrap_or(order.len())
        } else {
            order.partition_point(|id| key_of(id) >= key)
        };

        order.insert(pos, record.id.clone());
        self.entries.insert(record.id.clone(), Arc::new(record));
    }

    fn evict_to(&mut self, max_entries: usize) -> Vec<String> {
        let mut evicted = Vec::new();
        if self.order.len() <= max_entries {
            return evicted;
        }
        let order = Arc::make_mut(&mut self.order);
        while order.len() > max_entries {
            if let Some(victim) = order.pop() {
                self.entries.remove(&victim);
                evicted.push(victim);
            }
        }
        evicted
    }
}

//! Serializable cache snapshot.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::MessageSummary;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Point-in-time copy of the cache contents.
///
/// Records are shared with the live cache, so taking a snapshot under the
/// cache lock only copies pointers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Format version.
    pub version: u32,
    /// When the snapshot was taken.
    #[serde(rename = "savedAt")]
    pub saved_at: DateTime<Utc>,
    /// Records keyed by identifier.
    pub cache: HashMap<String, Arc<MessageSummary>>,
    /// Identifiers, newest first.
    pub order: Arc<Vec<String>>,
}

impl Snapshot {
    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if the snapshot holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Checks that map and order list describe the same set of records.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        if self.order.len() != self.cache.len() {
            return false;
        }
        if self.cache.iter().any(|(id, record)| *id != record.id) {
            return false;
        }
        let mut seen = HashSet::with_capacity(self.order.len());
        self.order
            .iter()
            .all(|id| self.cache.contains_key(id) && seen.insert(id.as_str()))
    }
}

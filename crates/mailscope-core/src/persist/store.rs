//! Snapshot file I/O.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::Result;
use crate::cache::{OrderedCache, SNAPSHOT_VERSION, Snapshot};

/// Reads, writes and deletes the snapshot file.
///
/// Writes go to a sibling temporary file that is renamed over the snapshot,
/// so readers see either the previous or the new document. Writers are
/// serialized by an internal async mutex.
#[derive(Debug)]
pub struct SnapshotStore {
    path: PathBuf,
    expiry: Duration,
    write_lock: Mutex<()>,
}

impl SnapshotStore {
    /// Creates a store for `path`; snapshots older than `expiry` are ignored.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, expiry: Duration) -> Self {
        Self {
            path: path.into(),
            expiry,
            write_lock: Mutex::new(()),
        }
    }

    /// Snapshot file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Writes `snapshot` atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any file operation fails.
    pub async fn write(&self, snapshot: &Snapshot) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_locked(snapshot).await
    }

    /// Captures `cache` and writes it, or removes the file when the cache is
    /// empty. Returns the number of records saved.
    ///
    /// The capture happens under the write lock, so the file always ends up
    /// holding the contents seen by the last save or delete to take the lock.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or any file operation fails.
    pub async fn save(&self, cache: &OrderedCache, now: DateTime<Utc>) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let snapshot = cache.snapshot(now);
        if snapshot.is_empty() {
            self.remove_locked().await?;
        } else {
            self.write_locked(&snapshot).await?;
        }
        Ok(snapshot.len())
    }

    async fn write_locked(&self, snapshot: &Snapshot) -> Result<()> {
        let contents = serde_json::to_vec(snapshot)?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp = self.temp_path();
        let mut file = tokio::fs::File::create(&temp).await?;
        file.write_all(&contents).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&temp, &self.path).await?;

        debug!(path = %self.path.display(), entries = snapshot.len(), "Snapshot written");
        Ok(())
    }

    /// Reads the snapshot if it exists, parses and is not expired at `now`.
    ///
    /// Anything unusable is reported as `None`.
    pub async fn load(&self, now: DateTime<Utc>) -> Option<Snapshot> {
        let contents = match tokio::fs::read(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Cannot read snapshot");
                return None;
            }
        };

        let snapshot: Snapshot = match serde_json::from_slice(&contents) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring corrupt snapshot");
                return None;
            }
        };

        if snapshot.version != SNAPSHOT_VERSION {
            warn!(version = snapshot.version, "Ignoring snapshot with unknown version");
            return None;
        }
        if !snapshot.is_consistent() {
            warn!(path = %self.path.display(), "Ignoring inconsistent snapshot");
            return None;
        }

        let age = (now - snapshot.saved_at).to_std().unwrap_or(Duration::ZERO);
        if age > self.expiry {
            info!(age_secs = age.as_secs(), "Snapshot expired");
            return None;
        }

        Some(snapshot)
    }

    /// Removes the snapshot file; a missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub async fn delete(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.remove_locked().await
    }

    async fn remove_locked(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "Snapshot deleted");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

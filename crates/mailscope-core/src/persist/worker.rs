//! Background snapshot worker.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::SnapshotStore;
use crate::Result;
use crate::cache::OrderedCache;
use crate::config::Config;
use crate::time::Clock;

/// Sentinel for "no save has completed yet".
const NEVER: i64 = i64::MIN;

/// Lower bound for the delay before retrying a failed background save.
const MIN_RETRY_DELAY: Duration = Duration::from_secs(1);

/// State shared between the cache, the worker and the synchronous path.
#[derive(Debug)]
struct SaveShared {
    pending: AtomicUsize,
    force: AtomicBool,
    delete: AtomicBool,
    last_save_ms: AtomicI64,
    batch_size: usize,
    min_interval: Duration,
    clock: Arc<dyn Clock>,
}

impl SaveShared {
    /// Time left until the minimum interval since the last save has passed.
    fn interval_remaining(&self) -> Option<Duration> {
        let last = self.last_save_ms.load(Ordering::Acquire);
        if last == NEVER {
            return None;
        }
        let elapsed = self.clock.now().timestamp_millis().saturating_sub(last);
        let elapsed = Duration::from_millis(u64::try_from(elapsed).unwrap_or(0));
        self.min_interval
            .checked_sub(elapsed)
            .filter(|left| !left.is_zero())
    }

    fn mark_saved(&self) {
        self.last_save_ms
            .store(self.clock.now().timestamp_millis(), Ordering::Release);
    }
}

/// Handle through which the cache asks for saves.
///
/// Requests never block; the channel only wakes the worker, the work
/// itself is described by the shared counters.
#[derive(Debug, Clone)]
pub(crate) struct SaveSignal {
    shared: Arc<SaveShared>,
    wake: mpsc::Sender<()>,
}

impl SaveSignal {
    /// Records one pending write and wakes the worker if a save is due.
    pub(crate) fn request_save(&self, force: bool) {
        let pending = self.shared.pending.fetch_add(1, Ordering::AcqRel) + 1;
        if force {
            self.shared.force.store(true, Ordering::Release);
        }
        if force
            || pending >= self.shared.batch_size
            || self.shared.interval_remaining().is_none()
        {
            self.wake();
        }
    }

    /// Asks the worker to remove the snapshot file.
    pub(crate) fn request_delete(&self) {
        self.shared.pending.store(0, Ordering::Release);
        self.shared.delete.store(true, Ordering::Release);
        self.wake();
    }

    fn wake(&self) {
        match self.wake.try_send(()) {
            // A queued wake-up already covers this request.
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Closed(())) => {
                debug!("Persistence worker stopped, save request left pending");
            }
        }
    }
}

/// Owns the snapshot store and the background save worker.
///
/// Dropping the persister stops the worker without a final flush; call
/// [`Persister::shutdown`] to flush first.
#[derive(Debug)]
pub struct Persister {
    cache: Arc<OrderedCache>,
    store: Arc<SnapshotStore>,
    signal: SaveSignal,
    stop: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl Persister {
    /// Creates an empty cache wired to a new background worker.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    #[must_use]
    pub fn spawn(config: &Config, clock: Arc<dyn Clock>) -> (Arc<OrderedCache>, Self) {
        let store = Arc::new(SnapshotStore::new(
            config.cache.snapshot_path.clone(),
            config.cache.expiry(),
        ));
        let (wake, wake_rx) = mpsc::channel(config.persist.queue_capacity.max(1));
        let shared = Arc::new(SaveShared {
            pending: AtomicUsize::new(0),
            force: AtomicBool::new(false),
            delete: AtomicBool::new(false),
            last_save_ms: AtomicI64::new(NEVER),
            batch_size: config.persist.batch_size.max(1),
            min_interval: config.persist.min_save_interval(),
            clock,
        });
        let signal = SaveSignal { shared, wake };
        let cache = Arc::new(OrderedCache::with_signal(&config.cache, signal.clone()));
        let stop = CancellationToken::new();

        let worker = tokio::spawn(run_worker(
            Arc::clone(&signal.shared),
            Arc::clone(&store),
            Arc::downgrade(&cache),
            wake_rx,
            stop.clone(),
        ));

        let persister = Self {
            cache: Arc::clone(&cache),
            store,
            signal,
            stop,
            worker: Some(worker),
        };
        (cache, persister)
    }

    /// Snapshot store used by this persister.
    #[must_use]
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Records a pending write; see [`OrderedCache::put`] for the usual caller.
    pub fn request_save(&self, force: bool) {
        self.signal.request_save(force);
    }

    /// Writes the current cache contents immediately.
    ///
    /// An empty cache removes the snapshot instead.
    ///
    /// # Errors
    ///
    /// Returns the I/O or serialization error of the write.
    pub async fn save_now(&self) -> Result<()> {
        let shared = &self.signal.shared;
        let cleared = shared.delete.swap(false, Ordering::AcqRel);
        let taken = shared.pending.swap(0, Ordering::AcqRel);

        match write_current(shared, &self.store, &self.cache).await {
            Ok(()) => Ok(()),
            Err(e) => {
                requeue(shared, taken, cleared);
                Err(e)
            }
        }
    }

    /// Loads a fresh snapshot into the cache, returning the number of
    /// records restored (zero when there is nothing usable).
    pub async fn load(&self) -> usize {
        let now = self.signal.shared.clock.now();
        let Some(snapshot) = self.store.load(now).await else {
            return 0;
        };
        let restored = self.cache.restore(snapshot);
        info!(entries = restored, "Restored cache snapshot");
        restored
    }

    /// Removes the snapshot file.
    ///
    /// A delete requested by [`OrderedCache::clear`] stays queued for the
    /// worker, which re-saves whatever the cache holds by then.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub async fn delete(&self) -> Result<()> {
        self.store.delete().await
    }

    /// Stops the worker, then flushes whatever it left pending.
    ///
    /// # Errors
    ///
    /// Returns the error of the final flush.
    pub async fn shutdown(mut self) -> Result<()> {
        self.stop.cancel();
        if let Some(worker) = self.worker.take()
            && let Err(e) = worker.await
        {
            warn!(error = %e, "Persistence worker ended abnormally");
        }

        let shared = &self.signal.shared;
        if shared.delete.load(Ordering::Acquire) || shared.pending.load(Ordering::Acquire) > 0 {
            self.save_now().await?;
        }
        debug!("Persistence shut down");
        Ok(())
    }
}

impl Drop for Persister {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

/// Saves the cache as it is when the store lock is taken.
async fn write_current(
    shared: &SaveShared,
    store: &SnapshotStore,
    cache: &OrderedCache,
) -> Result<()> {
    store.save(cache, shared.clock.now()).await?;
    shared.mark_saved();
    Ok(())
}

/// Puts back the work of a failed save.
fn requeue(shared: &SaveShared, taken: usize, cleared: bool) {
    shared.pending.fetch_add(taken, Ordering::AcqRel);
    if cleared {
        shared.delete.store(true, Ordering::Release);
    }
}

async fn run_worker(
    shared: Arc<SaveShared>,
    store: Arc<SnapshotStore>,
    cache: Weak<OrderedCache>,
    mut wake: mpsc::Receiver<()>,
    stop: CancellationToken,
) {
    let mut deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            biased;
            () = stop.cancelled() => break,
            woke = next_wake(&mut wake, deadline) => {
                if !woke {
                    break;
                }
            }
        }
        while wake.try_recv().is_ok() {}

        let Some(cache) = cache.upgrade() else {
            break;
        };
        deadline = process(&shared, &store, &cache)
            .await
            .map(|delay| Instant::now() + delay);
    }

    debug!("Persistence worker stopped");
}

/// Waits for a wake-up or the deadline; false once every sender is gone.
async fn next_wake(wake: &mut mpsc::Receiver<()>, deadline: Option<Instant>) -> bool {
    match deadline {
        Some(at) => match tokio::time::timeout_at(at, wake.recv()).await {
            Ok(message) => message.is_some(),
            Err(_) => true,
        },
        None => wake.recv().await.is_some(),
    }
}

/// Performs the work described by the shared flags and returns when the
/// worker should look again without being woken.
async fn process(
    shared: &SaveShared,
    store: &SnapshotStore,
    cache: &OrderedCache,
) -> Option<Duration> {
    // A clear is saved right away; the save removes the file unless new
    // records arrived since.
    let cleared = shared.delete.swap(false, Ordering::AcqRel);
    if !cleared && shared.pending.load(Ordering::Acquire) == 0 {
        shared.force.store(false, Ordering::Release);
        return None;
    }

    let forced = shared.force.swap(false, Ordering::AcqRel) || cleared;
    if !forced && let Some(left) = shared.interval_remaining() {
        return Some(left);
    }

    let taken = shared.pending.swap(0, Ordering::AcqRel);
    match write_current(shared, store, cache).await {
        Ok(()) => None,
        Err(e) => {
            warn!(error = %e, pending = taken, cleared, "Background snapshot save failed");
            requeue(shared, taken, cleared);
            Some(shared.min_interval.max(MIN_RETRY_DELAY))
        }
    }
}

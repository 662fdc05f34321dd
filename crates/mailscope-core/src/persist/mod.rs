//! Snapshot persistence.
//!
//! [`SnapshotStore`] does the file work: atomic writes, tolerant loads and
//! deletes. [`Persister`] owns a background worker that saves in batches
//! when the cache signals changes, plus a synchronous [`Persister::save_now`]
//! for call sites that need the snapshot on disk before they return.
//!
//! Background save failures are logged and retried; the in-memory cache
//! stays authoritative.

mod store;
mod worker;

pub use store::SnapshotStore;
pub(crate) use worker::SaveSignal;
pub use worker::Persister;

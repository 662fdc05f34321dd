//! Ordered message cache.
//!
//! [`OrderedCache`] keeps message summaries keyed by identifier together
//! with an order list sorted newest first. [`Snapshot`] is its serialized
//! form, written and read by [`crate::persist`].

mod snapshot;
mod store;

pub use snapshot::{SNAPSHOT_VERSION, Snapshot};
pub use store::OrderedCache;

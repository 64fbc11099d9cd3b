//! Durable event storage
//!
//! [`SqliteEventLog`] is the synchronous append-only log; the
//! [`DistributedEventStore`] wraps it for async callers with per-aggregate
//! locking, retry, and a read-through cache.

mod distributed;
mod sqlite;
mod traits;

pub use distributed::DistributedEventStore;
pub use sqlite::SqliteEventLog;
pub use traits::{EventStore, EventStoreConfig, StoreError, StoreResult};

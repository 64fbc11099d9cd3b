//! Event store trait definitions

use crate::event::{ChainError, EventEnvelope, EventPayload};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during store operations
#[derive(Debug, Error)]
pub enum StoreError {
    /// Expected and retryable: reload the current version and retry.
    #[error("version conflict: expected {expected}, actual {actual}")]
    VersionConflict { expected: u64, actual: u64 },

    /// Durable storage unavailable after the internal retry budget.
    #[error("durable storage failure: {0}")]
    IoFailure(#[from] rusqlite::Error),

    /// A blocking storage task failed to complete.
    #[error("storage task failed: {0}")]
    TaskFailure(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Fatal: the aggregate's history can no longer be trusted.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// A stored record could not be decoded back into an envelope.
    #[error("corrupt record for aggregate {aggregate_id} at sequence {sequence}: {message}")]
    CorruptRecord {
        aggregate_id: String,
        sequence: u64,
        message: String,
    },
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Configuration for the distributed event store
#[derive(Debug, Clone)]
pub struct EventStoreConfig {
    /// Entries in the per-aggregate envelope cache
    pub cache_size: usize,
    /// Retries for transient storage failures before surfacing IoFailure
    pub max_retries: u32,
    /// Base backoff between retries (multiplied by attempt number)
    pub retry_backoff: Duration,
}

impl Default for EventStoreConfig {
    fn default() -> Self {
        Self {
            cache_size: 1024,
            max_retries: 3,
            retry_backoff: Duration::from_millis(50),
        }
    }
}

/// Durable, append-only event store keyed by aggregate identifier.
///
/// Implementations must serialize operations against the same aggregate so
/// the optimistic-concurrency version check is race-free; operations across
/// different aggregates may run concurrently.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append a batch of events, checking `expected_version` against the
    /// aggregate's current version (the count of stored events).
    ///
    /// Atomic across the batch: either every payload is appended, in order,
    /// each chained to the previous CID, and the version advances by
    /// `events.len()` — or nothing is appended.
    async fn append(
        &self,
        aggregate_id: &str,
        expected_version: u64,
        events: Vec<EventPayload>,
    ) -> StoreResult<Vec<EventEnvelope>>;

    /// All events for an aggregate in sequence order (full replay)
    async fn load(&self, aggregate_id: &str) -> StoreResult<Vec<EventEnvelope>>;

    /// Events with sequence greater than `after_sequence` (incremental
    /// catch-up)
    async fn load_from(
        &self,
        aggregate_id: &str,
        after_sequence: u64,
    ) -> StoreResult<Vec<EventEnvelope>>;

    /// Current version: the number of events stored for the aggregate
    /// (0 for an unknown aggregate)
    async fn current_version(&self, aggregate_id: &str) -> StoreResult<u64>;

    /// Recompute every CID from the persisted payload bytes and confirm
    /// chain continuity
    async fn verify_chain(&self, aggregate_id: &str) -> StoreResult<()>;

    /// All aggregate ids with at least one stored event
    async fn list_aggregates(&self) -> StoreResult<Vec<String>>;
}

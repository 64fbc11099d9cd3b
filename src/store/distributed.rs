//! Asynchronous event store over the durable log
//!
//! Wraps [`SqliteEventLog`] for async callers: same-aggregate operations
//! are serialized through a per-aggregate lock (making the optimistic
//! version check race-free), different aggregates proceed concurrently,
//! and a bounded LRU cache short-circuits repeated full loads. The log is
//! the single source of truth; the cache never is.

use crate::event::{EventEnvelope, EventPayload};
use crate::store::sqlite::SqliteEventLog;
use crate::store::traits::{EventStore, EventStoreConfig, StoreError, StoreResult};
use async_trait::async_trait;
use dashmap::DashMap;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Distributed event store: async facade over the append-only log
pub struct DistributedEventStore {
    log: Arc<SqliteEventLog>,
    config: EventStoreConfig,
    /// Serializes operations per aggregate id
    locks: DashMap<String, Arc<Mutex<()>>>,
    /// Read-through cache of full event lists, invalidated on append
    cache: Mutex<LruCache<String, Vec<EventEnvelope>>>,
}

impl DistributedEventStore {
    pub fn new(log: Arc<SqliteEventLog>, config: EventStoreConfig) -> Self {
        let capacity = NonZeroUsize::new(config.cache_size.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            log,
            config,
            locks: DashMap::new(),
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>, config: EventStoreConfig) -> StoreResult<Self> {
        Ok(Self::new(Arc::new(SqliteEventLog::open(path)?), config))
    }

    /// Create an in-memory store (useful for testing)
    pub fn open_in_memory(config: EventStoreConfig) -> StoreResult<Self> {
        Ok(Self::new(Arc::new(SqliteEventLog::open_in_memory()?), config))
    }

    fn aggregate_lock(&self, aggregate_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(aggregate_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run a blocking log operation off the async executor, retrying
    /// transient failures up to the configured budget.
    async fn run_blocking<T, F>(&self, op: F) -> StoreResult<T>
    where
        F: Fn() -> StoreResult<T> + Send + Sync + Clone + 'static,
        T: Send + 'static,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let this_attempt = op.clone();
            let result = tokio::task::spawn_blocking(this_attempt)
                .await
                .map_err(|e| StoreError::TaskFailure(e.to_string()))?;
            match result {
                Err(err) if is_transient(&err) && attempt <= self.config.max_retries => {
                    warn!(attempt, error = %err, "transient storage failure, retrying");
                    tokio::time::sleep(self.config.retry_backoff * attempt).await;
                }
                other => return other,
            }
        }
    }
}

/// SQLITE_BUSY / SQLITE_LOCKED are worth retrying; everything else is not.
fn is_transient(err: &StoreError) -> bool {
    match err {
        StoreError::IoFailure(rusqlite::Error::SqliteFailure(e, _)) => matches!(
            e.code,
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
        ),
        _ => false,
    }
}

#[async_trait]
impl EventStore for DistributedEventStore {
    async fn append(
        &self,
        aggregate_id: &str,
        expected_version: u64,
        events: Vec<EventPayload>,
    ) -> StoreResult<Vec<EventEnvelope>> {
        let lock = self.aggregate_lock(aggregate_id);
        let _guard = lock.lock().await;

        // Invalidate before the durable write: the blocking task runs to
        // completion even if this future is dropped, and a cancelled caller
        // must not leave a cache entry that predates the commit. A spurious
        // pop on a failed append just costs one re-read.
        self.cache.lock().await.pop(aggregate_id);

        let log = Arc::clone(&self.log);
        let id = aggregate_id.to_string();
        let appended = self
            .run_blocking(move || log.append(&id, expected_version, &events))
            .await?;

        info!(
            aggregate_id,
            count = appended.len(),
            version = expected_version + appended.len() as u64,
            "events appended"
        );
        Ok(appended)
    }

    async fn load(&self, aggregate_id: &str) -> StoreResult<Vec<EventEnvelope>> {
        let lock = self.aggregate_lock(aggregate_id);
        let _guard = lock.lock().await;

        if let Some(cached) = self.cache.lock().await.get(aggregate_id) {
            return Ok(cached.clone());
        }

        let log = Arc::clone(&self.log);
        let id = aggregate_id.to_string();
        let envelopes = self.run_blocking(move || log.load(&id)).await?;

        self.cache
            .lock()
            .await
            .put(aggregate_id.to_string(), envelopes.clone());
        Ok(envelopes)
    }

    async fn load_from(
        &self,
        aggregate_id: &str,
        after_sequence: u64,
    ) -> StoreResult<Vec<EventEnvelope>> {
        // Reuses the cached full list; the slice is cheap by comparison.
        let all = self.load(aggregate_id).await?;
        Ok(all
            .into_iter()
            .filter(|e| e.sequence > after_sequence)
            .collect())
    }

    async fn current_version(&self, aggregate_id: &str) -> StoreResult<u64> {
        let log = Arc::clone(&self.log);
        let id = aggregate_id.to_string();
        self.run_blocking(move || log.version(&id)).await
    }

    async fn verify_chain(&self, aggregate_id: &str) -> StoreResult<()> {
        // Deliberately bypasses the cache: verification must read what is
        // actually persisted.
        let log = Arc::clone(&self.log);
        let id = aggregate_id.to_string();
        self.run_blocking(move || log.verify(&id)).await
    }

    async fn list_aggregates(&self) -> StoreResult<Vec<String>> {
        let log = Arc::clone(&self.log);
        self.run_blocking(move || log.aggregates()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn payload(n: u64) -> EventPayload {
        EventPayload::new("test", json!({ "n": n }))
    }

    fn store() -> DistributedEventStore {
        DistributedEventStore::open_in_memory(EventStoreConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn append_and_load() {
        let store = store();
        let appended = store
            .append("g1", 0, vec![payload(0), payload(1)])
            .await
            .unwrap();
        assert_eq!(appended.len(), 2);

        let loaded = store.load("g1").await.unwrap();
        assert_eq!(loaded, appended);
        assert_eq!(store.current_version("g1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn unknown_aggregate_is_empty_at_version_zero() {
        let store = store();
        assert_eq!(store.current_version("nope").await.unwrap(), 0);
        assert!(store.load("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cache_is_invalidated_by_append() {
        let store = store();
        store.append("g1", 0, vec![payload(0)]).await.unwrap();
        // Prime the cache.
        assert_eq!(store.load("g1").await.unwrap().len(), 1);

        store.append("g1", 1, vec![payload(1)]).await.unwrap();
        let reloaded = store.load("g1").await.unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded[1].sequence, 1);
    }

    #[tokio::test]
    async fn dropped_append_future_does_not_leave_stale_cache() {
        let store = store();
        store.append("g1", 0, vec![payload(0)]).await.unwrap();
        // Prime the cache.
        assert_eq!(store.load("g1").await.unwrap().len(), 1);

        // Drop the append future early; the dispatched blocking write still
        // runs to completion.
        let fut = store.append("g1", 1, vec![payload(1)]);
        let _ = tokio::time::timeout(Duration::from_millis(1), fut).await;

        // Wait for the write to land, then the cache must not serve the
        // pre-append history.
        for _ in 0..100 {
            if store.current_version("g1").await.unwrap() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.current_version("g1").await.unwrap(), 2);
        assert_eq!(store.load("g1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn transient_lock_is_retried_until_the_holder_releases() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.db");
        let config = EventStoreConfig {
            cache_size: 16,
            max_retries: 5,
            retry_backoff: Duration::from_millis(100),
        };
        let store = DistributedEventStore::open(&path, config).unwrap();
        store.append("g1", 0, vec![payload(0)]).await.unwrap();

        // A second connection holds the write lock, so the first append
        // attempt sees SQLITE_BUSY.
        let blocker = rusqlite::Connection::open(&path).unwrap();
        blocker.execute_batch("BEGIN IMMEDIATE").unwrap();
        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            blocker.execute_batch("COMMIT").unwrap();
        });

        // Succeeds on a retry once the holder commits.
        store.append("g1", 1, vec![payload(1)]).await.unwrap();
        release.await.unwrap();
        assert_eq!(store.current_version("g1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn persistent_lock_surfaces_io_failure_after_retries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.db");
        let config = EventStoreConfig {
            cache_size: 16,
            max_retries: 2,
            retry_backoff: Duration::from_millis(10),
        };
        let store = DistributedEventStore::open(&path, config).unwrap();

        let blocker = rusqlite::Connection::open(&path).unwrap();
        blocker.execute_batch("BEGIN IMMEDIATE").unwrap();

        let err = store.append("g1", 0, vec![payload(0)]).await.unwrap_err();
        assert!(matches!(err, StoreError::IoFailure(_)));

        // The failure was not durable damage: releasing the lock lets the
        // same append through.
        blocker.execute_batch("COMMIT").unwrap();
        store.append("g1", 0, vec![payload(0)]).await.unwrap();
        assert_eq!(store.current_version("g1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn load_from_supports_catch_up() {
        let store = store();
        store
            .append("g1", 0, vec![payload(0), payload(1), payload(2)])
            .await
            .unwrap();

        let tail = store.load_from("g1", 0).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].sequence, 1);
    }

    #[tokio::test]
    async fn concurrent_appends_same_expected_version_one_wins() {
        let store = Arc::new(store());
        store.append("g1", 0, vec![payload(0)]).await.unwrap();

        let a = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.append("g1", 1, vec![payload(1)]).await })
        };
        let b = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.append("g1", 1, vec![payload(2)]).await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let wins = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);

        let conflict = results.into_iter().find(|r| r.is_err()).unwrap().unwrap_err();
        match conflict {
            StoreError::VersionConflict { expected, actual } => {
                assert_eq!(expected, 1);
                assert_eq!(actual, 2);
            }
            other => panic!("expected VersionConflict, got {other:?}"),
        }
        assert_eq!(store.current_version("g1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn different_aggregates_do_not_conflict() {
        let store = Arc::new(store());
        let a = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.append("g1", 0, vec![payload(0)]).await })
        };
        let b = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.append("g2", 0, vec![payload(0)]).await })
        };
        assert!(a.await.unwrap().is_ok());
        assert!(b.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn verify_chain_passes_for_clean_store() {
        let store = store();
        store
            .append("g1", 0, vec![payload(0), payload(1)])
            .await
            .unwrap();
        store.verify_chain("g1").await.unwrap();
    }

    #[tokio::test]
    async fn list_aggregates_reports_all() {
        let store = store();
        store.append("b", 0, vec![payload(0)]).await.unwrap();
        store.append("a", 0, vec![payload(0)]).await.unwrap();
        assert_eq!(store.list_aggregates().await.unwrap(), vec!["a", "b"]);
    }
}

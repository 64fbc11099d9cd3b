//! SQLite-backed append-only event log
//!
//! The durable half of the event store: one `events` table, WAL mode,
//! whole-batch appends inside an IMMEDIATE transaction with the version
//! check re-run against the table, so a conflict can never slip through
//! even if two connections race.

use crate::cid::Cid;
use crate::event::{ChainError, ChainValidator, ChainedEvent, EventEnvelope, EventPayload};
use crate::store::traits::{StoreError, StoreResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

/// Append-only event log on a single SQLite database.
///
/// Thread-safe via an internal mutex on the connection. Callers never
/// mutate history: the only write path is `append`.
pub struct SqliteEventLog {
    conn: Mutex<Connection>,
}

impl SqliteEventLog {
    /// Open or create a log at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory log (useful for testing)
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> StoreResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                aggregate_id TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                event_type TEXT NOT NULL,
                cid TEXT NOT NULL,
                previous_cid TEXT,
                payload BLOB NOT NULL,
                payload_codec TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                PRIMARY KEY (aggregate_id, sequence)
            );

            CREATE INDEX IF NOT EXISTS idx_events_type
                ON events(aggregate_id, event_type);

            -- WAL mode for concurrent reads during writes
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    /// Append a batch with an expected-version check.
    ///
    /// The version is re-read inside an IMMEDIATE transaction; either the
    /// whole batch commits and the version advances by `events.len()`, or
    /// nothing is written.
    pub fn append(
        &self,
        aggregate_id: &str,
        expected_version: u64,
        events: &[EventPayload],
    ) -> StoreResult<Vec<EventEnvelope>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let actual: u64 = tx.query_row(
            "SELECT COUNT(*) FROM events WHERE aggregate_id = ?1",
            params![aggregate_id],
            |row| row.get::<_, i64>(0),
        )? as u64;
        if actual != expected_version {
            // Dropping the transaction rolls it back.
            return Err(StoreError::VersionConflict {
                expected: expected_version,
                actual,
            });
        }

        let mut previous: Option<Cid> = if actual == 0 {
            None
        } else {
            let text: String = tx.query_row(
                "SELECT cid FROM events WHERE aggregate_id = ?1 ORDER BY sequence DESC LIMIT 1",
                params![aggregate_id],
                |row| row.get(0),
            )?;
            Some(Cid::parse(&text).map_err(|e| StoreError::CorruptRecord {
                aggregate_id: aggregate_id.to_string(),
                sequence: actual - 1,
                message: e.to_string(),
            })?)
        };

        let mut out = Vec::with_capacity(events.len());
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO events
                 (aggregate_id, sequence, event_type, cid, previous_cid, payload, payload_codec, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;

            for (i, payload) in events.iter().enumerate() {
                let bytes = payload.to_bytes()?;
                let cid = Cid::from_chained(&bytes, previous.as_ref());
                let sequence = actual + i as u64;
                let timestamp = Utc::now();

                stmt.execute(params![
                    aggregate_id,
                    sequence as i64,
                    payload.event_type,
                    cid.to_string(),
                    previous.map(|c| c.to_string()),
                    bytes,
                    crate::event::CODEC_JSON,
                    timestamp.to_rfc3339(),
                ])?;

                out.push(EventEnvelope {
                    aggregate_id: aggregate_id.to_string(),
                    sequence,
                    event: ChainedEvent {
                        payload: payload.clone(),
                        cid,
                        previous_cid: previous,
                    },
                    timestamp,
                });
                previous = Some(cid);
            }
        }

        tx.commit()?;
        debug!(aggregate_id, count = events.len(), "appended batch");
        Ok(out)
    }

    /// All events for an aggregate in sequence order
    pub fn load(&self, aggregate_id: &str) -> StoreResult<Vec<EventEnvelope>> {
        self.load_after(aggregate_id, None)
    }

    /// Events with sequence strictly greater than `after`
    pub fn load_from(&self, aggregate_id: &str, after: u64) -> StoreResult<Vec<EventEnvelope>> {
        self.load_after(aggregate_id, Some(after))
    }

    fn load_after(&self, aggregate_id: &str, after: Option<u64>) -> StoreResult<Vec<EventEnvelope>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT sequence, cid, previous_cid, payload, timestamp
             FROM events
             WHERE aggregate_id = ?1 AND sequence > ?2
             ORDER BY sequence ASC",
        )?;
        // -1 sentinel selects from the beginning.
        let floor = after.map(|s| s as i64).unwrap_or(-1);
        let rows = stmt.query_map(params![aggregate_id, floor], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Vec<u8>>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (sequence, cid_text, previous_text, payload_bytes, timestamp_text) = row?;
            let sequence = sequence as u64;
            out.push(Self::decode_row(
                aggregate_id,
                sequence,
                &cid_text,
                previous_text.as_deref(),
                &payload_bytes,
                &timestamp_text,
            )?);
        }
        Ok(out)
    }

    fn decode_row(
        aggregate_id: &str,
        sequence: u64,
        cid_text: &str,
        previous_text: Option<&str>,
        payload_bytes: &[u8],
        timestamp_text: &str,
    ) -> StoreResult<EventEnvelope> {
        let corrupt = |message: String| StoreError::CorruptRecord {
            aggregate_id: aggregate_id.to_string(),
            sequence,
            message,
        };
        let cid = Cid::parse(cid_text).map_err(|e| corrupt(e.to_string()))?;
        let previous_cid = previous_text
            .map(Cid::parse)
            .transpose()
            .map_err(|e| corrupt(e.to_string()))?;
        let payload =
            EventPayload::from_bytes(payload_bytes).map_err(|e| corrupt(e.to_string()))?;
        let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(timestamp_text)
            .map_err(|e| corrupt(e.to_string()))?
            .with_timezone(&Utc);
        Ok(EventEnvelope {
            aggregate_id: aggregate_id.to_string(),
            sequence,
            event: ChainedEvent {
                payload,
                cid,
                previous_cid,
            },
            timestamp,
        })
    }

    /// Current version: the count of events stored for the aggregate
    pub fn version(&self, aggregate_id: &str) -> StoreResult<u64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM events WHERE aggregate_id = ?1",
            params![aggregate_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Recompute every CID from the persisted payload bytes and confirm the
    /// chain. The persisted blobs are the authority: this catches any
    /// out-of-band modification of the log.
    pub fn verify(&self, aggregate_id: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "SELECT sequence, cid, previous_cid, payload
             FROM events WHERE aggregate_id = ?1 ORDER BY sequence ASC",
        )?;
        let rows = stmt.query_map(params![aggregate_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Vec<u8>>(3)?,
            ))
        })?;

        let mut expected_sequence = 0u64;
        let mut actual_previous: Option<Cid> = None;
        for row in rows {
            let (sequence, cid_text, previous_text, payload_bytes) = row?;
            let sequence = sequence as u64;
            if sequence != expected_sequence {
                return Err(ChainError::SequenceGap {
                    expected: expected_sequence,
                    got: sequence,
                }
                .into());
            }
            // A stored CID that no longer parses counts as tampering.
            let stored_cid = Cid::parse(&cid_text)
                .map_err(|_| ChainError::TamperedAt(sequence))?;
            let stored_previous = previous_text
                .as_deref()
                .map(Cid::parse)
                .transpose()
                .map_err(|_| ChainError::TamperedAt(sequence))?;

            ChainValidator::validate_entry(
                sequence,
                &payload_bytes,
                stored_cid,
                stored_previous,
                actual_previous,
            )?;

            actual_previous = Some(stored_cid);
            expected_sequence += 1;
        }
        Ok(())
    }

    /// Last stored CID for an aggregate, if any
    pub fn last_cid(&self, aggregate_id: &str) -> StoreResult<Option<Cid>> {
        let conn = self.conn.lock().unwrap();
        let text: Option<String> = conn
            .query_row(
                "SELECT cid FROM events WHERE aggregate_id = ?1 ORDER BY sequence DESC LIMIT 1",
                params![aggregate_id],
                |row| row.get(0),
            )
            .optional()?;
        match text {
            None => Ok(None),
            Some(text) => {
                let version = {
                    let count: i64 = conn.query_row(
                        "SELECT COUNT(*) FROM events WHERE aggregate_id = ?1",
                        params![aggregate_id],
                        |row| row.get(0),
                    )?;
                    count as u64
                };
                Cid::parse(&text)
                    .map(Some)
                    .map_err(|e| StoreError::CorruptRecord {
                        aggregate_id: aggregate_id.to_string(),
                        sequence: version.saturating_sub(1),
                        message: e.to_string(),
                    })
            }
        }
    }

    /// All aggregate ids with at least one event
    pub fn aggregates(&self) -> StoreResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare_cached("SELECT DISTINCT aggregate_id FROM events ORDER BY aggregate_id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}

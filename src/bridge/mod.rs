//! Async/sync event bridge
//!
//! Connects the async store side to synchronous consumers (render loops,
//! CLI polls) without blocking either. Events flow async -> sync over a
//! bounded tokio channel, so a slow consumer exerts backpressure on
//! publishers instead of growing an unbounded queue. Commands flow
//! sync -> async over a crossbeam channel the sync side can send on
//! without an executor.

use crate::event::{EventEnvelope, EventPayload};
use crate::store::{EventStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// How long the command poll sleeps when the queue is empty
const COMMAND_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Errors from bridge endpoints
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BridgeError {
    /// The other side of the bridge has been dropped.
    #[error("bridge disconnected")]
    Disconnected,
}

/// A mutation request submitted from the sync side
#[derive(Debug, Clone)]
pub struct BridgeCommand {
    pub command_id: Uuid,
    pub aggregate_id: String,
    pub expected_version: u64,
    pub events: Vec<EventPayload>,
}

/// Receipt for a submitted command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandTicket {
    pub command_id: Uuid,
}

/// Constructor for a connected publisher/consumer pair
pub struct EventBridge;

impl EventBridge {
    /// Create a bridge with the given event-channel capacity.
    ///
    /// Capacity bounds how far the async side can run ahead of the
    /// consumer before `publish` starts awaiting.
    pub fn bounded(capacity: usize) -> (BridgePublisher, BridgeConsumer) {
        let (event_tx, event_rx) = tokio::sync::mpsc::channel(capacity);
        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        (
            BridgePublisher {
                event_tx,
                command_rx,
            },
            BridgeConsumer {
                event_rx,
                command_tx,
                disconnected: false,
            },
        )
    }
}

/// Async endpoint: publishes events, receives commands
pub struct BridgePublisher {
    event_tx: tokio::sync::mpsc::Sender<EventEnvelope>,
    command_rx: crossbeam_channel::Receiver<BridgeCommand>,
}

impl BridgePublisher {
    /// Push an envelope to the sync side.
    ///
    /// Awaits while the channel is full, so a slow consumer slows the
    /// publisher rather than losing events.
    pub async fn publish(&self, envelope: EventEnvelope) -> Result<(), BridgeError> {
        self.event_tx
            .send(envelope)
            .await
            .map_err(|_| BridgeError::Disconnected)
    }

    /// Next command from the sync side, or `None` once the consumer is gone.
    ///
    /// Polls the crossbeam queue with a short sleep between checks; a
    /// blocking `recv` here would pin an executor thread.
    pub async fn next_command(&self) -> Option<BridgeCommand> {
        loop {
            match self.command_rx.try_recv() {
                Ok(command) => return Some(command),
                Err(crossbeam_channel::TryRecvError::Empty) => {
                    tokio::time::sleep(COMMAND_POLL_INTERVAL).await;
                }
                Err(crossbeam_channel::TryRecvError::Disconnected) => return None,
            }
        }
    }
}

/// Sync endpoint: drains events, submits commands
pub struct BridgeConsumer {
    event_rx: tokio::sync::mpsc::Receiver<EventEnvelope>,
    command_tx: crossbeam_channel::Sender<BridgeCommand>,
    disconnected: bool,
}

impl BridgeConsumer {
    /// Collect every currently-buffered envelope without blocking.
    ///
    /// Events already buffered are always returned, even after the
    /// publisher disconnects; `Err(Disconnected)` is reported only once
    /// the queue is empty with no publisher left, and every later call
    /// repeats it.
    pub fn drain(&mut self) -> Result<Vec<EventEnvelope>, BridgeError> {
        let mut drained = Vec::new();
        loop {
            match self.event_rx.try_recv() {
                Ok(envelope) => drained.push(envelope),
                Err(tokio::sync::mpsc::error::TryRecvError::Empty) => break,
                Err(tokio::sync::mpsc::error::TryRecvError::Disconnected) => {
                    self.disconnected = true;
                    break;
                }
            }
        }
        if drained.is_empty() && self.disconnected {
            return Err(BridgeError::Disconnected);
        }
        Ok(drained)
    }

    /// Submit a mutation command toward the async side
    pub fn submit_command(
        &self,
        aggregate_id: impl Into<String>,
        expected_version: u64,
        events: Vec<EventPayload>,
    ) -> Result<CommandTicket, BridgeError> {
        let command = BridgeCommand {
            command_id: Uuid::new_v4(),
            aggregate_id: aggregate_id.into(),
            expected_version,
            events,
        };
        let ticket = CommandTicket {
            command_id: command.command_id,
        };
        self.command_tx
            .send(command)
            .map_err(|_| BridgeError::Disconnected)?;
        Ok(ticket)
    }
}

/// Drive commands from the bridge into a store, publishing results back.
///
/// Runs until the sync side drops its command sender. A version conflict
/// is an expected outcome and is logged at warn; the loop keeps serving
/// later commands either way.
pub async fn run_command_worker<S: EventStore>(publisher: BridgePublisher, store: Arc<S>) {
    info!("command worker started");
    while let Some(command) = publisher.next_command().await {
        debug!(
            command_id = %command.command_id,
            aggregate_id = %command.aggregate_id,
            "processing command"
        );
        match store
            .append(
                &command.aggregate_id,
                command.expected_version,
                command.events,
            )
            .await
        {
            Ok(envelopes) => {
                for envelope in envelopes {
                    if publisher.publish(envelope).await.is_err() {
                        info!("event consumer gone, command worker stopping");
                        return;
                    }
                }
            }
            Err(StoreError::VersionConflict { expected, actual }) => {
                warn!(
                    command_id = %command.command_id,
                    aggregate_id = %command.aggregate_id,
                    expected,
                    actual,
                    "command rejected: version conflict"
                );
            }
            Err(err) => {
                error!(
                    command_id = %command.command_id,
                    aggregate_id = %command.aggregate_id,
                    error = %err,
                    "command failed"
                );
            }
        }
    }
    info!("command sender dropped, command worker stopping");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ChainedEvent;
    use crate::store::{DistributedEventStore, EventStoreConfig};
    use serde_json::json;

    fn envelope(sequence: u64, previous: Option<&crate::cid::Cid>) -> EventEnvelope {
        let payload = EventPayload::new("test", json!({ "seq": sequence }));
        let chained = ChainedEvent::new(payload, previous).unwrap();
        EventEnvelope::new("g1", sequence, chained)
    }

    #[tokio::test]
    async fn drain_returns_events_in_publish_order_exactly_once() {
        let (publisher, mut consumer) = EventBridge::bounded(8);

        let first = envelope(0, None);
        let second = envelope(1, Some(&first.event.cid));
        publisher.publish(first.clone()).await.unwrap();
        publisher.publish(second.clone()).await.unwrap();

        let drained = consumer.drain().unwrap();
        assert_eq!(drained, vec![first, second]);

        // Nothing left: a second drain is empty, not a repeat.
        assert!(consumer.drain().unwrap().is_empty());
    }

    #[tokio::test]
    async fn full_channel_exerts_backpressure() {
        let (publisher, mut consumer) = EventBridge::bounded(1);
        publisher.publish(envelope(0, None)).await.unwrap();

        // Channel is full: the next publish must not complete yet.
        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            publisher.publish(envelope(1, None)),
        );
        assert!(blocked.await.is_err());

        // Draining makes room.
        assert_eq!(consumer.drain().unwrap().len(), 1);
        tokio::time::timeout(
            Duration::from_millis(50),
            publisher.publish(envelope(1, None)),
        )
        .await
        .unwrap()
        .unwrap();
    }

    #[tokio::test]
    async fn drain_reports_disconnect_only_after_buffer_is_empty() {
        let (publisher, mut consumer) = EventBridge::bounded(8);
        publisher.publish(envelope(0, None)).await.unwrap();
        drop(publisher);

        // Buffered event still comes out.
        assert_eq!(consumer.drain().unwrap().len(), 1);
        // Then the disconnect is sticky.
        assert_eq!(consumer.drain().unwrap_err(), BridgeError::Disconnected);
        assert_eq!(consumer.drain().unwrap_err(), BridgeError::Disconnected);
    }

    #[tokio::test]
    async fn publish_after_consumer_drop_fails() {
        let (publisher, consumer) = EventBridge::bounded(8);
        drop(consumer);
        assert_eq!(
            publisher.publish(envelope(0, None)).await,
            Err(BridgeError::Disconnected)
        );
    }

    #[tokio::test]
    async fn submit_after_publisher_drop_fails() {
        let (publisher, consumer) = EventBridge::bounded(8);
        drop(publisher);
        let err = consumer
            .submit_command("g1", 0, vec![EventPayload::new("test", json!({}))])
            .unwrap_err();
        assert_eq!(err, BridgeError::Disconnected);
    }

    #[tokio::test]
    async fn command_worker_appends_and_publishes() {
        let store =
            Arc::new(DistributedEventStore::open_in_memory(EventStoreConfig::default()).unwrap());
        let (publisher, mut consumer) = EventBridge::bounded(8);
        let worker = tokio::spawn(run_command_worker(publisher, Arc::clone(&store)));

        let ticket = consumer
            .submit_command(
                "g1",
                0,
                vec![
                    EventPayload::new("test", json!({ "n": 0 })),
                    EventPayload::new("test", json!({ "n": 1 })),
                ],
            )
            .unwrap();
        assert!(!ticket.command_id.is_nil());

        let mut received = Vec::new();
        for _ in 0..100 {
            received.extend(consumer.drain().unwrap());
            if received.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(received.len(), 2);
        assert_eq!(received[0].sequence, 0);
        assert_eq!(received[1].sequence, 1);
        assert_eq!(received[1].event.previous_cid, Some(received[0].event.cid));

        assert_eq!(store.current_version("g1").await.unwrap(), 2);
        drop(consumer);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn command_worker_survives_version_conflict() {
        let store =
            Arc::new(DistributedEventStore::open_in_memory(EventStoreConfig::default()).unwrap());
        let (publisher, mut consumer) = EventBridge::bounded(8);
        let worker = tokio::spawn(run_command_worker(publisher, Arc::clone(&store)));

        // Stale expected version: rejected, nothing published.
        consumer
            .submit_command("g1", 5, vec![EventPayload::new("test", json!({}))])
            .unwrap();
        // A correct command afterwards still goes through.
        consumer
            .submit_command("g1", 0, vec![EventPayload::new("test", json!({}))])
            .unwrap();

        let mut received = Vec::new();
        for _ in 0..100 {
            received.extend(consumer.drain().unwrap());
            if !received.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].sequence, 0);
        assert_eq!(store.current_version("g1").await.unwrap(), 1);

        drop(consumer);
        worker.await.unwrap();
    }
}

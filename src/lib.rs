//! Chronograph: content-addressed, event-sourced context graph store
//!
//! Every graph mutation is an immutable event addressed by a CID computed
//! over its payload and the CID of the event before it, so each aggregate's
//! history forms a tamper-evident hash chain. Graphs themselves are
//! projections: replaying a history from empty state always rebuilds the
//! same [`ContextGraph`].
//!
//! # Core concepts
//!
//! - **[`ContextGraph`]**: a typed graph whose nodes and edges carry caller
//!   values plus type-keyed components, nestable through [`Subgraph`]
//! - **[`ChainedEvent`]**: a payload bound to its [`Cid`] and the previous
//!   event's CID
//! - **[`DistributedEventStore`]**: durable append-only log with optimistic
//!   concurrency per aggregate
//! - **[`EventBridge`]**: bounded channel pair linking the async store side
//!   to synchronous consumers
//!
//! # Example
//!
//! ```
//! use chronograph::ContextGraph;
//!
//! let mut graph: ContextGraph<&str, &str> = ContextGraph::new();
//! let a = graph.add_node("a");
//! let b = graph.add_node("b");
//! let edge = graph.add_edge(a, b, "a->b").unwrap();
//! assert_eq!(graph.get_edge(edge).unwrap().source(), a);
//! ```

pub mod bridge;
pub mod cid;
pub mod event;
pub mod graph;
pub mod store;

pub use bridge::{
    run_command_worker, BridgeCommand, BridgeConsumer, BridgeError, BridgePublisher,
    CommandTicket, EventBridge,
};
pub use cid::{Cid, CidError};
pub use event::{
    replay, ChainError, ChainValidator, ChainedEvent, EventEnvelope, EventPayload, GraphEvent,
    Projection, WireEnvelope,
};
pub use graph::{
    Acyclic, Component, ComponentStorage, Connected, ContextGraph, EdgeEntry, EdgeId, GraphError,
    GraphLike, GraphMetadata, GraphResult, Invariant, NodeEntry, NodeId, Subgraph,
};
pub use store::{
    DistributedEventStore, EventStore, EventStoreConfig, SqliteEventLog, StoreError, StoreResult,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

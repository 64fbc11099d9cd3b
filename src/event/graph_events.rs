//! Graph mutation events and replay
//!
//! The store treats payloads as opaque bytes; this module gives graph
//! aggregates a concrete event vocabulary and the projection logic that
//! rebuilds a [`ContextGraph`] from an event history. Consumers replay
//! their own private projection, so replaying the same history twice from
//! empty state yields identical graphs.

use super::chained::{EventEnvelope, EventPayload};
use crate::graph::{ContextGraph, EdgeId, GraphError, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// A graph projection with JSON values, the common denominator for replay
pub type Projection = ContextGraph<serde_json::Value, serde_json::Value>;

/// Named annotations attached to a node during replay.
///
/// Stored as a single component so repeated `ComponentAttached` events
/// accumulate keys instead of shadowing each other.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotations(pub BTreeMap<String, serde_json::Value>);

/// Errors from replaying an event history
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("event decode failed at sequence {sequence}: {message}")]
    Decode { sequence: u64, message: String },

    #[error("event apply failed at sequence {sequence}: {source}")]
    Apply {
        sequence: u64,
        #[source]
        source: GraphError,
    },
}

/// The mutation vocabulary for graph aggregates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GraphEvent {
    NodeAdded {
        node_id: NodeId,
        value: serde_json::Value,
    },
    NodeRemoved {
        node_id: NodeId,
    },
    EdgeAdded {
        edge_id: EdgeId,
        source: NodeId,
        target: NodeId,
        value: serde_json::Value,
    },
    EdgeRemoved {
        edge_id: EdgeId,
    },
    ComponentAttached {
        node_id: NodeId,
        key: String,
        value: serde_json::Value,
    },
}

impl GraphEvent {
    /// The type tag used in payloads and transport subjects
    pub fn event_type(&self) -> &'static str {
        match self {
            GraphEvent::NodeAdded { .. } => "node_added",
            GraphEvent::NodeRemoved { .. } => "node_removed",
            GraphEvent::EdgeAdded { .. } => "edge_added",
            GraphEvent::EdgeRemoved { .. } => "edge_removed",
            GraphEvent::ComponentAttached { .. } => "component_attached",
        }
    }

    /// Encode as an opaque store payload
    pub fn to_payload(&self) -> Result<EventPayload, serde_json::Error> {
        Ok(EventPayload::new(
            self.event_type(),
            serde_json::to_value(self)?,
        ))
    }

    /// Decode from an opaque store payload
    pub fn from_payload(payload: &EventPayload) -> Result<Self, serde_json::Error> {
        serde_json::from_value(payload.data.clone())
    }

    /// Apply this event to a projection
    pub fn apply(&self, graph: &mut Projection) -> Result<(), GraphError> {
        match self {
            GraphEvent::NodeAdded { node_id, value } => {
                graph.add_node_with_id(*node_id, value.clone())?;
            }
            GraphEvent::NodeRemoved { node_id } => {
                graph.remove_node(*node_id)?;
            }
            GraphEvent::EdgeAdded {
                edge_id,
                source,
                target,
                value,
            } => {
                graph.add_edge_with_id(*edge_id, *source, *target, value.clone())?;
            }
            GraphEvent::EdgeRemoved { edge_id } => {
                graph.remove_edge(*edge_id)?;
            }
            GraphEvent::ComponentAttached {
                node_id,
                key,
                value,
            } => {
                let mut annotations = graph
                    .get_node(*node_id)?
                    .components()
                    .get::<Annotations>()
                    .cloned()
                    .unwrap_or_default();
                annotations.0.insert(key.clone(), value.clone());
                graph.attach_node_component(*node_id, annotations)?;
            }
        }
        Ok(())
    }
}

/// Rebuild a projection from an event history, in envelope order
pub fn replay(envelopes: &[EventEnvelope]) -> Result<Projection, ReplayError> {
    let mut graph = Projection::new();
    for envelope in envelopes {
        let event = GraphEvent::from_payload(&envelope.event.payload).map_err(|e| {
            ReplayError::Decode {
                sequence: envelope.sequence,
                message: e.to_string(),
            }
        })?;
        event.apply(&mut graph).map_err(|e| ReplayError::Apply {
            sequence: envelope.sequence,
            source: e,
        })?;
    }
    Ok(graph)
}

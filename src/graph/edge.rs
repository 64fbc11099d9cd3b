//! Edge identity and entries

use super::component::ComponentStorage;
use super::node::NodeId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(Uuid);

impl EdgeId {
    /// Create a new random EdgeId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an EdgeId from an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EdgeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EdgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A directed edge between two nodes of the same graph.
///
/// An edge never outlives its endpoints: removing either endpoint removes
/// the edge (see `ContextGraph::remove_node`).
#[derive(Debug, Clone)]
pub struct EdgeEntry<E> {
    id: EdgeId,
    source: NodeId,
    target: NodeId,
    value: E,
    components: ComponentStorage,
}

impl<E> EdgeEntry<E> {
    /// Create an entry with a fresh identity
    pub fn new(source: NodeId, target: NodeId, value: E) -> Self {
        Self::with_id(EdgeId::new(), source, target, value)
    }

    /// Create an entry with a caller-supplied identity (used by replay)
    pub fn with_id(id: EdgeId, source: NodeId, target: NodeId, value: E) -> Self {
        Self {
            id,
            source,
            target,
            value,
            components: ComponentStorage::new(),
        }
    }

    pub fn id(&self) -> EdgeId {
        self.id
    }

    pub fn source(&self) -> NodeId {
        self.source
    }

    pub fn target(&self) -> NodeId {
        self.target
    }

    pub fn value(&self) -> &E {
        &self.value
    }

    /// Consume the entry, yielding the value
    pub fn into_value(self) -> E {
        self.value
    }

    pub fn components(&self) -> &ComponentStorage {
        &self.components
    }

    pub fn components_mut(&mut self) -> &mut ComponentStorage {
        &mut self.components
    }

    /// True if this edge touches the given node
    pub fn is_incident_to(&self, node: NodeId) -> bool {
        self.source == node || self.target == node
    }
}

//! Node identity and entries

use super::component::ComponentStorage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(Uuid);

impl NodeId {
    /// Create a new random NodeId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a NodeId from an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A node in a context graph: identity, an owned value, and an append-only
/// component bag.
///
/// The value is immutable once attached. Changing it means removing the node
/// and adding a new one, which produces new events downstream.
#[derive(Debug, Clone)]
pub struct NodeEntry<N> {
    id: NodeId,
    value: N,
    components: ComponentStorage,
}

impl<N> NodeEntry<N> {
    /// Create an entry with a fresh identity
    pub fn new(value: N) -> Self {
        Self::with_id(NodeId::new(), value)
    }

    /// Create an entry with a caller-supplied identity (used by replay)
    pub fn with_id(id: NodeId, value: N) -> Self {
        Self {
            id,
            value,
            components: ComponentStorage::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn value(&self) -> &N {
        &self.value
    }

    /// Consume the entry, yielding the value
    pub fn into_value(self) -> N {
        self.value
    }

    pub fn components(&self) -> &ComponentStorage {
        &self.components
    }

    pub fn components_mut(&mut self) -> &mut ComponentStorage {
        &mut self.components
    }
}

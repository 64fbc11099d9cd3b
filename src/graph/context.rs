//! ContextGraph: the generic, recursively composable graph

use super::component::{Component, Subgraph};
use super::edge::{EdgeEntry, EdgeId};
use super::invariant::Invariant;
use super::node::{NodeEntry, NodeId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors from graph operations
///
/// All local and non-retryable: the mutation is rejected, prior state kept.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    #[error("node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("edge not found: {0}")]
    EdgeNotFound(EdgeId),

    #[error("duplicate node id: {0}")]
    DuplicateNode(NodeId),

    #[error("duplicate edge id: {0}")]
    DuplicateEdge(EdgeId),

    #[error("invariant violated: {0}")]
    InvariantViolated(String),
}

/// Result type for graph operations
pub type GraphResult<T> = Result<T, GraphError>;

/// Graph-level metadata
#[derive(Debug, Clone, Default)]
pub struct GraphMetadata {
    /// Human-readable name
    pub name: Option<String>,
    /// When the graph was created
    pub created_at: Option<DateTime<Utc>>,
    /// When the graph was last mutated
    pub updated_at: Option<DateTime<Utc>>,
    /// Tags for categorization
    pub tags: Vec<String>,
}

/// Count/visit access to a graph without knowing its value types.
///
/// Lets callers hold heterogeneous graphs behind `Box<dyn GraphLike>` when
/// they only need structural information.
pub trait GraphLike {
    fn node_count(&self) -> usize;
    fn edge_count(&self) -> usize;
    fn total_node_count(&self) -> usize;
}

/// A generic graph of nodes and edges with attachable components.
///
/// `N` and `E` are the node and edge value types; the graph imposes no
/// constraint on them beyond what individual operations need. Recursive
/// nesting goes through the [`Subgraph`] component: a node owns an entire
/// nested `ContextGraph<N, E>`.
///
/// Structural invariant, enforced by construction: every edge's endpoints
/// exist in the node map at all times.
pub struct ContextGraph<N, E> {
    nodes: HashMap<NodeId, NodeEntry<N>>,
    edges: HashMap<EdgeId, EdgeEntry<E>>,
    metadata: GraphMetadata,
    invariants: Vec<Arc<dyn Invariant<N, E>>>,
}

impl<N, E> Default for ContextGraph<N, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: Clone, E: Clone> Clone for ContextGraph<N, E> {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
            metadata: self.metadata.clone(),
            invariants: self.invariants.clone(),
        }
    }
}

impl<N, E> std::fmt::Debug for ContextGraph<N, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextGraph")
            .field("name", &self.metadata.name)
            .field("nodes", &self.nodes.len())
            .field("edges", &self.edges.len())
            .field("invariants", &self.invariants.len())
            .finish()
    }
}

impl<N, E> ContextGraph<N, E> {
    /// Create an empty graph
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            metadata: GraphMetadata {
                created_at: Some(Utc::now()),
                ..Default::default()
            },
            invariants: Vec::new(),
        }
    }

    /// Create an empty graph with a name
    pub fn with_name(name: impl Into<String>) -> Self {
        let mut graph = Self::new();
        graph.metadata.name = Some(name.into());
        graph
    }

    pub fn metadata(&self) -> &GraphMetadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut GraphMetadata {
        &mut self.metadata
    }

    /// Register an invariant, checked after subsequent structural mutations.
    ///
    /// The graph must already satisfy it; otherwise registration fails and
    /// the invariant is not kept.
    pub fn register_invariant(
        &mut self,
        invariant: impl Invariant<N, E> + 'static,
    ) -> GraphResult<()> {
        if !invariant.check(self) {
            return Err(GraphError::InvariantViolated(invariant.name().to_string()));
        }
        self.invariants.push(Arc::new(invariant));
        Ok(())
    }

    /// Add a node with a fresh identity. Always succeeds.
    ///
    /// Registered invariants are not consulted here: the operation is
    /// infallible by contract. Use
    /// [`add_node_with_id`](Self::add_node_with_id) when node insertion
    /// must be gated by invariants.
    pub fn add_node(&mut self, value: N) -> NodeId {
        let entry = NodeEntry::new(value);
        let id = entry.id();
        self.nodes.insert(id, entry);
        self.touch();
        id
    }

    /// Add a node with a caller-supplied identity (replay path). Fails if
    /// the id is taken or a registered invariant rejects the result (the
    /// node is rolled back).
    pub fn add_node_with_id(&mut self, id: NodeId, value: N) -> GraphResult<NodeId> {
        if self.nodes.contains_key(&id) {
            return Err(GraphError::DuplicateNode(id));
        }
        self.nodes.insert(id, NodeEntry::with_id(id, value));
        if let Some(name) = self.violated_invariant() {
            self.nodes.remove(&id);
            return Err(GraphError::InvariantViolated(name));
        }
        self.touch();
        Ok(id)
    }

    /// Add a directed edge. Fails if either endpoint is absent or a
    /// registered invariant rejects the result (the edge is rolled back).
    pub fn add_edge(&mut self, source: NodeId, target: NodeId, value: E) -> GraphResult<EdgeId> {
        self.insert_edge(EdgeEntry::new(source, target, value))
    }

    /// Add an edge with a caller-supplied identity (replay path)
    pub fn add_edge_with_id(
        &mut self,
        id: EdgeId,
        source: NodeId,
        target: NodeId,
        value: E,
    ) -> GraphResult<EdgeId> {
        if self.edges.contains_key(&id) {
            return Err(GraphError::DuplicateEdge(id));
        }
        self.insert_edge(EdgeEntry::with_id(id, source, target, value))
    }

    fn insert_edge(&mut self, entry: EdgeEntry<E>) -> GraphResult<EdgeId> {
        if !self.nodes.contains_key(&entry.source()) {
            return Err(GraphError::UnknownNode(entry.source()));
        }
        if !self.nodes.contains_key(&entry.target()) {
            return Err(GraphError::UnknownNode(entry.target()));
        }
        let id = entry.id();
        self.edges.insert(id, entry);
        if let Some(name) = self.violated_invariant() {
            self.edges.remove(&id);
            return Err(GraphError::InvariantViolated(name));
        }
        self.touch();
        Ok(id)
    }

    /// Remove a node, cascading removal of all incident edges.
    ///
    /// Returns the removed entry; removed edges are discarded. Use
    /// [`remove_node_with_edges`](Self::remove_node_with_edges) to get them.
    pub fn remove_node(&mut self, id: NodeId) -> GraphResult<NodeEntry<N>> {
        self.remove_node_with_edges(id).map(|(node, _)| node)
    }

    /// Remove a node and return it together with its cascaded edges
    pub fn remove_node_with_edges(
        &mut self,
        id: NodeId,
    ) -> GraphResult<(NodeEntry<N>, Vec<EdgeEntry<E>>)> {
        let node = self
            .nodes
            .remove(&id)
            .ok_or(GraphError::NodeNotFound(id))?;

        let incident: Vec<EdgeId> = self
            .edges
            .values()
            .filter(|e| e.is_incident_to(id))
            .map(|e| e.id())
            .collect();
        let mut removed_edges = Vec::with_capacity(incident.len());
        for edge_id in incident {
            if let Some(edge) = self.edges.remove(&edge_id) {
                removed_edges.push(edge);
            }
        }

        if let Some(name) = self.violated_invariant() {
            // Roll back: restore the node and every cascaded edge.
            self.nodes.insert(id, node);
            for edge in removed_edges {
                let edge_id = edge.id();
                self.edges.insert(edge_id, edge);
            }
            return Err(GraphError::InvariantViolated(name));
        }

        self.touch();
        Ok((node, removed_edges))
    }

    /// Remove a single edge
    pub fn remove_edge(&mut self, id: EdgeId) -> GraphResult<EdgeEntry<E>> {
        let edge = self
            .edges
            .remove(&id)
            .ok_or(GraphError::EdgeNotFound(id))?;
        if let Some(name) = self.violated_invariant() {
            let edge_id = edge.id();
            self.edges.insert(edge_id, edge);
            return Err(GraphError::InvariantViolated(name));
        }
        self.touch();
        Ok(edge)
    }

    pub fn get_node(&self, id: NodeId) -> GraphResult<&NodeEntry<N>> {
        self.nodes.get(&id).ok_or(GraphError::NodeNotFound(id))
    }

    pub fn get_edge(&self, id: EdgeId) -> GraphResult<&EdgeEntry<E>> {
        self.edges.get(&id).ok_or(GraphError::EdgeNotFound(id))
    }

    /// Mutable access to a node entry. The value stays immutable; this is
    /// how callers reach the entry's component storage.
    pub fn get_node_mut(&mut self, id: NodeId) -> GraphResult<&mut NodeEntry<N>> {
        self.nodes.get_mut(&id).ok_or(GraphError::NodeNotFound(id))
    }

    pub fn get_edge_mut(&mut self, id: EdgeId) -> GraphResult<&mut EdgeEntry<E>> {
        self.edges.get_mut(&id).ok_or(GraphError::EdgeNotFound(id))
    }

    /// Attach a component to a node (last-write-wins per component type).
    /// Returns the replaced component, if any.
    pub fn attach_node_component<C: Component>(
        &mut self,
        id: NodeId,
        component: C,
    ) -> GraphResult<Option<C>> {
        let entry = self.get_node_mut(id)?;
        let replaced = entry.components_mut().attach(component);
        self.touch();
        Ok(replaced)
    }

    /// Attach a component to an edge (last-write-wins per component type)
    pub fn attach_edge_component<C: Component>(
        &mut self,
        id: EdgeId,
        component: C,
    ) -> GraphResult<Option<C>> {
        let entry = self.get_edge_mut(id)?;
        let replaced = entry.components_mut().attach(component);
        self.touch();
        Ok(replaced)
    }

    /// Number of nodes in this graph, not counting nested subgraphs
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges in this graph, not counting nested subgraphs
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn contains_edge(&self, id: EdgeId) -> bool {
        self.edges.contains_key(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeEntry<N>> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &EdgeEntry<E>> {
        self.edges.values()
    }

    /// Edges originating at the given node
    pub fn edges_from(&self, id: NodeId) -> impl Iterator<Item = &EdgeEntry<E>> {
        self.edges.values().filter(move |e| e.source() == id)
    }

    /// Edges terminating at the given node
    pub fn edges_to(&self, id: NodeId) -> impl Iterator<Item = &EdgeEntry<E>> {
        self.edges.values().filter(move |e| e.target() == id)
    }

    fn violated_invariant(&self) -> Option<String> {
        self.invariants
            .iter()
            .find(|inv| !inv.check(self))
            .map(|inv| inv.name().to_string())
    }

    fn touch(&mut self) {
        self.metadata.updated_at = Some(Utc::now());
    }
}

// Recursive operations look up `Subgraph<N, E>` components, which only
// exist for value types usable as components.
impl<N, E> ContextGraph<N, E>
where
    N: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Total node count: this graph's nodes plus, recursively, the total of
    /// every nested [`Subgraph`] component found on any node.
    pub fn total_node_count(&self) -> usize {
        self.nodes.len()
            + self
                .nodes
                .values()
                .filter_map(|n| n.components().get::<Subgraph<N, E>>())
                .map(|sub| sub.graph().total_node_count())
                .sum::<usize>()
    }

    /// Total edge count, recursive through nested subgraphs
    pub fn total_edge_count(&self) -> usize {
        self.edges.len()
            + self
                .nodes
                .values()
                .filter_map(|n| n.components().get::<Subgraph<N, E>>())
                .map(|sub| sub.graph().total_edge_count())
                .sum::<usize>()
    }

    /// Depth-first pre-order traversal of this graph and every nested
    /// subgraph. The visitor receives each graph with its nesting depth
    /// (0 for the root).
    pub fn visit_recursive<F>(&self, mut visitor: F)
    where
        F: FnMut(&ContextGraph<N, E>, usize),
    {
        self.visit_at_depth(&mut visitor, 0);
    }

    fn visit_at_depth(&self, visitor: &mut dyn FnMut(&ContextGraph<N, E>, usize), depth: usize) {
        visitor(self, depth);
        for node in self.nodes.values() {
            if let Some(sub) = node.components().get::<Subgraph<N, E>>() {
                sub.graph().visit_at_depth(visitor, depth + 1);
            }
        }
    }
}

impl<N, E> GraphLike for ContextGraph<N, E>
where
    N: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn node_count(&self) -> usize {
        self.node_count()
    }

    fn edge_count(&self) -> usize {
        self.edge_count()
    }

    fn total_node_count(&self) -> usize {
        self.total_node_count()
    }
}

impl<N: Clone + 'static, E: Clone + 'static> ContextGraph<N, E> {
    /// Union of two graphs.
    ///
    /// Identity policy: ids are UUIDs, so an id present in both graphs is
    /// the same logical element and is taken once (left side wins); distinct
    /// ids coexist. The result carries the left graph's metadata and no
    /// invariants — callers re-register what the combined graph must hold.
    pub fn union(&self, other: &Self) -> Self {
        let mut result = Self {
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
            metadata: self.metadata.clone(),
            invariants: Vec::new(),
        };
        for (id, node) in &other.nodes {
            result.nodes.entry(*id).or_insert_with(|| node.clone());
        }
        for (id, edge) in &other.edges {
            result.edges.entry(*id).or_insert_with(|| edge.clone());
        }
        result.touch();
        result
    }

    /// Intersection: elements whose ids appear in both graphs (left entries
    /// kept). Edges survive only if both endpoints survive.
    pub fn intersection(&self, other: &Self) -> Self {
        let nodes: HashMap<NodeId, NodeEntry<N>> = self
            .nodes
            .iter()
            .filter(|(id, _)| other.nodes.contains_key(id))
            .map(|(id, n)| (*id, n.clone()))
            .collect();
        let edges: HashMap<EdgeId, EdgeEntry<E>> = self
            .edges
            .iter()
            .filter(|(id, e)| {
                other.edges.contains_key(id)
                    && nodes.contains_key(&e.source())
                    && nodes.contains_key(&e.target())
            })
            .map(|(id, e)| (*id, e.clone()))
            .collect();
        Self {
            nodes,
            edges,
            metadata: self.metadata.clone(),
            invariants: Vec::new(),
        }
    }

    /// Tensor product: one node per pair of factor nodes, one edge per pair
    /// of factor edges. Fresh identities; components are not carried over.
    pub fn product(&self, other: &Self) -> ContextGraph<(N, N), (E, E)> {
        let mut result = ContextGraph::new();
        let mut pair_ids: HashMap<(NodeId, NodeId), NodeId> = HashMap::new();

        for a in self.nodes.values() {
            for b in other.nodes.values() {
                let id = result.add_node((a.value().clone(), b.value().clone()));
                pair_ids.insert((a.id(), b.id()), id);
            }
        }

        for ea in self.edges.values() {
            for eb in other.edges.values() {
                let source = pair_ids[&(ea.source(), eb.source())];
                let target = pair_ids[&(ea.target(), eb.target())];
                // Endpoints were just created, so this cannot fail.
                let _ = result.add_edge(source, target, (ea.value().clone(), eb.value().clone()));
            }
        }

        result
    }
}

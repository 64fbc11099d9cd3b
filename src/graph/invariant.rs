//! Pluggable structural invariants
//!
//! Invariants are predicates over a whole graph, registered per graph
//! instance and checked eagerly after every structural mutation that can
//! affect them. A failing check rolls the mutation back.

use super::context::ContextGraph;
use super::node::NodeId;
use std::collections::{HashMap, HashSet, VecDeque};

/// A named structural predicate over a graph
pub trait Invariant<N, E>: Send + Sync {
    /// Stable name, surfaced in `GraphError::InvariantViolated`
    fn name(&self) -> &str;

    /// True if the graph satisfies the invariant
    fn check(&self, graph: &ContextGraph<N, E>) -> bool;
}

/// The directed graph contains no cycle
pub struct Acyclic;

impl<N, E> Invariant<N, E> for Acyclic {
    fn name(&self) -> &str {
        "acyclic"
    }

    fn check(&self, graph: &ContextGraph<N, E>) -> bool {
        // Kahn's algorithm: the graph is acyclic iff every node can be
        // peeled off in topological order.
        let mut in_degree: HashMap<NodeId, usize> =
            graph.nodes().map(|n| (n.id(), 0)).collect();
        let mut successors: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for edge in graph.edges() {
            *in_degree.entry(edge.target()).or_insert(0) += 1;
            successors.entry(edge.source()).or_default().push(edge.target());
        }

        let mut queue: VecDeque<NodeId> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut peeled = 0usize;

        while let Some(id) = queue.pop_front() {
            peeled += 1;
            if let Some(next) = successors.get(&id) {
                for target in next {
                    let d = in_degree.entry(*target).or_insert(0);
                    *d = d.saturating_sub(1);
                    if *d == 0 {
                        queue.push_back(*target);
                    }
                }
            }
        }

        peeled == graph.node_count()
    }
}

/// The graph is weakly connected (every node reachable from any other,
/// ignoring edge direction). Empty and single-node graphs pass.
pub struct Connected;

impl<N, E> Invariant<N, E> for Connected {
    fn name(&self) -> &str {
        "connected"
    }

    fn check(&self, graph: &ContextGraph<N, E>) -> bool {
        let mut nodes = graph.nodes().map(|n| n.id());
        let start = match nodes.next() {
            Some(id) => id,
            None => return true,
        };

        let mut neighbors: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        for edge in graph.edges() {
            neighbors.entry(edge.source()).or_default().push(edge.target());
            neighbors.entry(edge.target()).or_default().push(edge.source());
        }

        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            if let Some(adjacent) = neighbors.get(&id) {
                stack.extend(adjacent.iter().copied());
            }
        }

        seen.len() == graph.node_count()
    }
}

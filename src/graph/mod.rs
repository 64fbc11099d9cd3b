//! Core graph data structures

mod component;
mod context;
mod edge;
mod invariant;
mod node;


pub use component::{Component, ComponentStorage, Subgraph};
pub use context::{ContextGraph, GraphError, GraphLike, GraphMetadata, GraphResult};
pub use edge::{EdgeEntry, EdgeId};
pub use invariant::{Acyclic, Connected, Invariant};
pub use node::{NodeEntry, NodeId};

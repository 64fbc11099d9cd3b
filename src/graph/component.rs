//! Typed component storage for graph elements
//!
//! Every node and edge carries a [`ComponentStorage`]: a heterogeneous bag of
//! values keyed by their Rust type. Components are immutable once attached;
//! the storage exposes no mutable access to a stored component. Attaching a
//! second component of the same type replaces the first (last-write-wins),
//! which is the documented resolution policy for re-adds.
//!
//! One component type is special: [`Subgraph`] owns an entire nested
//! [`ContextGraph`], which is how recursive composition works without
//! changing the graph type itself.

use super::context::ContextGraph;
use std::any::{Any, TypeId};
use std::collections::HashMap;

/// A value that can be attached to a node or edge.
///
/// Blanket-implemented for every `Clone + Send + Sync + 'static` type, so
/// ordinary structs work as components without ceremony.
pub trait Component: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
    fn clone_box(&self) -> Box<dyn Component>;
    fn type_name(&self) -> &'static str;
}

impl<C: Any + Clone + Send + Sync> Component for C {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn clone_box(&self) -> Box<dyn Component> {
        Box::new(self.clone())
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<C>()
    }
}

/// Append-only typed attribute bag attached to a graph element
#[derive(Default)]
pub struct ComponentStorage {
    components: HashMap<TypeId, Box<dyn Component>>,
}

impl ComponentStorage {
    pub fn new() -> Self {
        Self {
            components: HashMap::new(),
        }
    }

    /// Attach a component, replacing any existing component of the same
    /// type. Returns the replaced component, if any, so callers that want
    /// reject-on-duplicate semantics can detect the collision.
    pub fn attach<C: Component>(&mut self, component: C) -> Option<C> {
        let previous = self
            .components
            .insert(TypeId::of::<C>(), Box::new(component))?;
        previous.into_any().downcast::<C>().ok().map(|c| *c)
    }

    /// Get the component of type `C`, if attached
    pub fn get<C: Component>(&self) -> Option<&C> {
        // Deref through the box so method resolution hits the trait object,
        // not a reference picked up by the blanket impl.
        self.components
            .get(&TypeId::of::<C>())
            .and_then(|c| (**c).as_any().downcast_ref::<C>())
    }

    /// True if a component of type `C` is attached
    pub fn has<C: Component>(&self) -> bool {
        self.components.contains_key(&TypeId::of::<C>())
    }

    /// Number of attached components
    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Type names of all attached components, for diagnostics
    pub fn type_names(&self) -> Vec<&'static str> {
        self.components
            .values()
            .map(|c| (**c).type_name())
            .collect()
    }
}

impl Clone for ComponentStorage {
    fn clone(&self) -> Self {
        Self {
            components: self
                .components
                .iter()
                .map(|(k, v)| (*k, (**v).clone_box()))
                .collect(),
        }
    }
}

impl std::fmt::Debug for ComponentStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentStorage")
            .field("types", &self.type_names())
            .finish()
    }
}

/// A component holding an owned nested graph.
///
/// Ownership is tree-shaped: the node owns its subgraph outright, so
/// recursive operations like `total_node_count` always terminate.
#[derive(Debug, Clone)]
pub struct Subgraph<N, E> {
    graph: ContextGraph<N, E>,
}

impl<N, E> Subgraph<N, E> {
    pub fn new(graph: ContextGraph<N, E>) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &ContextGraph<N, E> {
        &self.graph
    }

    pub fn into_graph(self) -> ContextGraph<N, E> {
        self.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Label(String);

    #[derive(Debug, Clone, PartialEq)]
    struct Weight(f64);

    #[test]
    fn attach_and_get_by_type() {
        let mut storage = ComponentStorage::new();
        assert!(storage.is_empty());

        storage.attach(Label("root".into()));
        storage.attach(Weight(0.5));

        assert_eq!(storage.len(), 2);
        assert!(storage.has::<Label>());
        assert_eq!(storage.get::<Label>(), Some(&Label("root".into())));
        assert_eq!(storage.get::<Weight>(), Some(&Weight(0.5)));
    }

    #[test]
    fn reattach_same_type_is_last_write_wins() {
        let mut storage = ComponentStorage::new();
        assert_eq!(storage.attach(Label("first".into())), None);

        let replaced = storage.attach(Label("second".into()));
        assert_eq!(replaced, Some(Label("first".into())));
        assert_eq!(storage.len(), 1);
        assert_eq!(storage.get::<Label>(), Some(&Label("second".into())));
    }

    #[test]
    fn type_names_lists_attached_component_types() {
        let mut storage = ComponentStorage::new();
        storage.attach(Label("x".into()));
        storage.attach(Weight(2.0));

        let names = storage.type_names();
        assert_eq!(names.len(), 2);
        assert!(names.iter().any(|n| n.ends_with("Label")));
        assert!(names.iter().any(|n| n.ends_with("Weight")));
    }

    #[test]
    fn get_missing_type_is_none() {
        let storage = ComponentStorage::new();
        assert_eq!(storage.get::<Label>(), None);
        assert!(!storage.has::<Label>());
    }

    #[test]
    fn clone_preserves_components() {
        let mut storage = ComponentStorage::new();
        storage.attach(Label("keep".into()));
        storage.attach(Weight(1.0));

        let cloned = storage.clone();
        assert_eq!(cloned.get::<Label>(), Some(&Label("keep".into())));
        assert_eq!(cloned.get::<Weight>(), Some(&Weight(1.0)));
    }
}

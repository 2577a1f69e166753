//! Static hypergraph model: named items and production hyperedges.
//!
//! A hyperedge states that its (possibly empty, possibly repeating) list of
//! source items jointly produces a single target item. Edges without sources
//! are axioms. Both items and edges are value types: two edges with the same
//! sources, name and target are the same edge, so adding it twice is a no-op.

use std::{collections::HashSet, fmt, sync::Arc};

use itertools::Itertools;

pub mod index;
pub mod prune;

/// A named vertex of the hypergraph. Equality, hashing and ordering are by name.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Item(Arc<str>);

impl Item {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Item {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Item {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl From<&Item> for Item {
    fn from(item: &Item) -> Self {
        item.clone()
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N({})", self.0)
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[derive(PartialEq, Eq, Hash)]
struct EdgeData {
    sources: Vec<Item>,
    name: String,
    target: Item,
}

/// A production rule: `sources` jointly yield `target`.
///
/// Cloning is cheap; the contents are shared and never mutated.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Hyperedge(Arc<EdgeData>);

impl Hyperedge {
    pub fn new<I, S>(sources: I, name: impl Into<String>, target: impl Into<Item>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Item>,
    {
        Self(Arc::new(EdgeData {
            sources: sources.into_iter().map(Into::into).collect(),
            name: name.into(),
            target: target.into(),
        }))
    }

    /// An edge without sources.
    pub fn axiom(name: impl Into<String>, target: impl Into<Item>) -> Self {
        Self::new(Vec::<Item>::new(), name, target)
    }

    pub fn sources(&self) -> &[Item] {
        &self.0.sources
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn target(&self) -> &Item {
        &self.0.target
    }

    pub fn is_axiom(&self) -> bool {
        self.0.sources.is_empty()
    }

    /// Whether the target is among its own sources.
    pub fn is_circular(&self) -> bool {
        self.0.sources.contains(&self.0.target)
    }
}

impl fmt::Display for Hyperedge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}--{}->{}",
            self.sources().iter().join(","),
            self.name(),
            self.target()
        )
    }
}

impl fmt::Debug for Hyperedge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A named set of items and hyperedges, both kept in insertion order.
///
/// Adding an edge registers its target and sources as items. The graph is
/// only mutated while it is being built; every downstream component takes it
/// by value or by shared reference.
#[derive(Clone, Default)]
pub struct Hypergraph {
    name: String,
    items: Vec<Item>,
    item_set: HashSet<Item>,
    edges: Vec<Hyperedge>,
    edge_set: HashSet<Hyperedge>,
}

impl Hypergraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers an item. Returns `false` if it was already present.
    pub fn add_item(&mut self, item: impl Into<Item>) -> bool {
        let item = item.into();
        if self.item_set.contains(&item) {
            return false;
        }
        self.item_set.insert(item.clone());
        self.items.push(item);
        true
    }

    /// Adds an edge, registering its endpoints. Returns `false` if a
    /// structurally equal edge was already present.
    pub fn add_edge(&mut self, edge: Hyperedge) -> bool {
        if self.edge_set.contains(&edge) {
            return false;
        }
        self.add_item(edge.target());
        for source in edge.sources() {
            self.add_item(source);
        }
        self.edge_set.insert(edge.clone());
        self.edges.push(edge);
        true
    }

    /// Adds an axiom named `GEN-<name>` producing the item `name`.
    pub fn add_generator(&mut self, name: &str) -> bool {
        self.add_edge(Hyperedge::axiom(format!("GEN-{}", name), name))
    }

    pub fn contains_item(&self, item: &Item) -> bool {
        self.item_set.contains(item)
    }

    pub fn contains_edge(&self, edge: &Hyperedge) -> bool {
        self.edge_set.contains(edge)
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn edges(&self) -> &[Hyperedge] {
        &self.edges
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}

impl fmt::Display for Hypergraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for edge in &self.edges {
            writeln!(f, "{}", edge)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Hypergraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hypergraph")
            .field("name", &self.name)
            .field("items", &self.items)
            .field("edges", &self.edges)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_structurally_equal_edges_collapse() {
        let mut graph = Hypergraph::new("dup");
        assert!(graph.add_edge(Hyperedge::new(["a", "b"], "ab", "c")));
        assert!(!graph.add_edge(Hyperedge::new(["a", "b"], "ab", "c")));
        // Same name and target, different source order: a distinct edge.
        assert!(graph.add_edge(Hyperedge::new(["b", "a"], "ab", "c")));
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_add_edge_registers_endpoints_in_order() {
        let mut graph = Hypergraph::new("reg");
        graph.add_item("z");
        graph.add_edge(Hyperedge::new(["a", "b", "a"], "make-c", "c"));
        assert_eq!(
            graph.items().to_vec(),
            vec![Item::new("z"), Item::new("c"), Item::new("a"), Item::new("b")]
        );
        assert!(!graph.add_item("a"));
    }

    #[test]
    fn test_generator_is_an_axiom() {
        let mut graph = Hypergraph::new("gen");
        assert!(graph.add_generator("x"));
        assert!(!graph.add_generator("x"));
        let edge = &graph.edges()[0];
        assert!(edge.is_axiom());
        assert_eq!(edge.name(), "GEN-x");
        assert_eq!(edge.target(), &Item::new("x"));
    }

    #[test]
    fn test_circular_edge_detection() {
        assert!(Hyperedge::new(["a", "b"], "loop", "a").is_circular());
        assert!(!Hyperedge::new(["a", "b"], "fine", "c").is_circular());
        assert!(!Hyperedge::axiom("ax", "a").is_circular());
    }

    #[test]
    fn test_display() {
        let mut graph = Hypergraph::new("show");
        graph.add_edge(Hyperedge::axiom("ax", "a"));
        graph.add_edge(Hyperedge::new(["a", "b"], "ab", "c"));
        assert_eq!(graph.to_string(), "--ax->N(a)\nN(a),N(b)--ab->N(c)\n");
    }

    #[test]
    fn test_items_order_by_name() {
        let mut items = vec![Item::new("b"), Item::new("c"), Item::new("a")];
        items.sort();
        assert_eq!(items, vec![Item::new("a"), Item::new("b"), Item::new("c")]);
    }
}

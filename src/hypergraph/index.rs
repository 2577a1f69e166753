//! Derived views over a fixed [`Hypergraph`].
//!
//! [`GraphIndex`] assigns dense ids to items and edges and keeps the incoming
//! and outgoing edge lists of every item. Two further families are computed
//! lazily, each by its own worklist fixpoint, the first time one of their
//! accessors is called:
//!
//! * prerequisites: for an edge, its sources plus their prerequisites; for an
//!   item, the intersection of the prerequisites of every edge producing it,
//!   i.e. the items required on *every* derivation of that item;
//! * depth: the minimum number of production layers above the axioms.
//!
//! Only items and edges reachable from an axiom receive a value. The index is
//! read-only once built and can be shared between search instances.

use std::{
    collections::{BTreeSet, HashMap, HashSet, VecDeque},
    sync::OnceLock,
};

use log::debug;

use super::{Hyperedge, Hypergraph, Item};

/// Position of an item in [`Hypergraph::items`].
pub type ItemId = usize;
/// Position of an edge in [`Hypergraph::edges`].
pub type EdgeId = usize;

/// Depth reported for items and edges that cannot be derived from axioms.
pub const UNREACHABLE: usize = usize::MAX;

#[derive(Debug)]
struct Prerequisites {
    items: Vec<Option<HashSet<ItemId>>>,
    edges: Vec<Option<HashSet<ItemId>>>,
}

#[derive(Debug)]
struct Depths {
    items: Vec<usize>,
    edges: Vec<usize>,
}

pub struct GraphIndex {
    graph: Hypergraph,
    item_ids: HashMap<Item, ItemId>,
    edge_ids: HashMap<Hyperedge, EdgeId>,
    /// Source ids of every edge, in order, duplicates included.
    sources: Vec<Vec<ItemId>>,
    targets: Vec<ItemId>,
    /// Producers of every item in canonical trial order.
    in_edges: Vec<Vec<EdgeId>>,
    out_edges: Vec<Vec<EdgeId>>,
    prerequisites: OnceLock<Prerequisites>,
    depths: OnceLock<Depths>,
}

impl GraphIndex {
    pub fn new(graph: Hypergraph) -> Self {
        let item_ids: HashMap<Item, ItemId> = graph
            .items()
            .iter()
            .enumerate()
            .map(|(id, item)| (item.clone(), id))
            .collect();
        let edge_ids: HashMap<Hyperedge, EdgeId> = graph
            .edges()
            .iter()
            .enumerate()
            .map(|(id, edge)| (edge.clone(), id))
            .collect();

        // Every endpoint was registered when the edge was added.
        let sources: Vec<Vec<ItemId>> = graph
            .edges()
            .iter()
            .map(|edge| edge.sources().iter().map(|s| item_ids[s]).collect())
            .collect();
        let targets: Vec<ItemId> = graph
            .edges()
            .iter()
            .map(|edge| item_ids[edge.target()])
            .collect();

        let mut in_edges = vec![Vec::new(); graph.item_count()];
        let mut out_edges: Vec<Vec<EdgeId>> = vec![Vec::new(); graph.item_count()];
        for (edge, target) in targets.iter().enumerate() {
            in_edges[*target].push(edge);
            for &source in &sources[edge] {
                // A repeated source lists the edge once.
                if out_edges[source].last() != Some(&edge) {
                    out_edges[source].push(edge);
                }
            }
        }
        // Fewest sources first, then by name; ties keep insertion order.
        let edges = graph.edges();
        for producers in in_edges.iter_mut() {
            producers.sort_by(|&a, &b| {
                let (a, b) = (&edges[a], &edges[b]);
                a.sources()
                    .len()
                    .cmp(&b.sources().len())
                    .then_with(|| a.name().cmp(b.name()))
            });
        }

        Self {
            graph,
            item_ids,
            edge_ids,
            sources,
            targets,
            in_edges,
            out_edges,
            prerequisites: OnceLock::new(),
            depths: OnceLock::new(),
        }
    }

    pub fn graph(&self) -> &Hypergraph {
        &self.graph
    }

    pub fn item_count(&self) -> usize {
        self.graph.item_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn item_id(&self, item: &Item) -> Option<ItemId> {
        self.item_ids.get(item).copied()
    }

    pub fn edge_id(&self, edge: &Hyperedge) -> Option<EdgeId> {
        self.edge_ids.get(edge).copied()
    }

    pub fn item(&self, id: ItemId) -> &Item {
        &self.graph.items()[id]
    }

    pub fn edge(&self, id: EdgeId) -> &Hyperedge {
        &self.graph.edges()[id]
    }

    pub fn edge_sources(&self, edge: EdgeId) -> &[ItemId] {
        &self.sources[edge]
    }

    pub fn edge_target(&self, edge: EdgeId) -> ItemId {
        self.targets[edge]
    }

    pub fn in_edge_ids(&self, item: ItemId) -> &[EdgeId] {
        &self.in_edges[item]
    }

    pub fn out_edge_ids(&self, item: ItemId) -> &[EdgeId] {
        &self.out_edges[item]
    }

    /// Producers of `item` in canonical trial order; empty for unknown items.
    pub fn in_edges(&self, item: &Item) -> impl Iterator<Item = &Hyperedge> + '_ {
        self.item_id(item)
            .map_or(&[][..], |id| self.in_edges[id].as_slice())
            .iter()
            .map(|&edge| self.edge(edge))
    }

    /// Edges consuming `item`; empty for unknown items.
    pub fn out_edges(&self, item: &Item) -> impl Iterator<Item = &Hyperedge> + '_ {
        self.item_id(item)
            .map_or(&[][..], |id| self.out_edges[id].as_slice())
            .iter()
            .map(|&edge| self.edge(edge))
    }

    fn prerequisites(&self) -> &Prerequisites {
        self.prerequisites
            .get_or_init(|| self.compute_prerequisites())
    }

    fn depths(&self) -> &Depths {
        self.depths.get_or_init(|| self.compute_depths())
    }

    /// Unavoidable prerequisites of an item, if it is reachable.
    pub fn item_pre(&self, item: ItemId) -> Option<&HashSet<ItemId>> {
        self.prerequisites().items[item].as_ref()
    }

    /// Prerequisites of an edge, if the fixpoint ever triggered it.
    pub fn edge_pre(&self, edge: EdgeId) -> Option<&HashSet<ItemId>> {
        self.prerequisites().edges[edge].as_ref()
    }

    /// Prerequisites of `item` as items, sorted by name.
    pub fn prerequisites_of(&self, item: &Item) -> Option<BTreeSet<&Item>> {
        let pre = self.item_pre(self.item_id(item)?)?;
        Some(pre.iter().map(|&id| self.item(id)).collect())
    }

    /// Prerequisites of `edge` as items, sorted by name.
    pub fn edge_prerequisites_of(&self, edge: &Hyperedge) -> Option<BTreeSet<&Item>> {
        let pre = self.edge_pre(self.edge_id(edge)?)?;
        Some(pre.iter().map(|&id| self.item(id)).collect())
    }

    pub fn item_depth(&self, item: ItemId) -> usize {
        self.depths().items[item]
    }

    pub fn edge_depth(&self, edge: EdgeId) -> usize {
        self.depths().edges[edge]
    }

    /// Depth of `item`, or [`UNREACHABLE`] if unknown or underivable.
    pub fn depth_of(&self, item: &Item) -> usize {
        self.item_id(item)
            .map_or(UNREACHABLE, |id| self.item_depth(id))
    }

    pub fn edge_depth_of(&self, edge: &Hyperedge) -> usize {
        self.edge_id(edge)
            .map_or(UNREACHABLE, |id| self.edge_depth(id))
    }

    /// Largest finite item depth; 0 for a graph without reachable items.
    pub fn max_depth(&self) -> usize {
        self.depths()
            .items
            .iter()
            .copied()
            .filter(|&depth| depth != UNREACHABLE)
            .max()
            .unwrap_or(0)
    }

    /// Axiom edges and their targets, the seed of both fixpoints.
    fn axioms(&self) -> impl Iterator<Item = EdgeId> + '_ {
        (0..self.edge_count()).filter(|&edge| self.sources[edge].is_empty())
    }

    fn compute_prerequisites(&self) -> Prerequisites {
        let mut items: Vec<Option<HashSet<ItemId>>> = vec![None; self.item_count()];
        let mut edges: Vec<Option<HashSet<ItemId>>> = vec![None; self.edge_count()];
        let mut fresh = VecDeque::new();

        for edge in self.axioms() {
            edges[edge] = Some(HashSet::new());
            let target = self.targets[edge];
            if items[target].is_none() {
                items[target] = Some(HashSet::new());
                fresh.push_back(target);
            }
        }

        while let Some(next) = fresh.pop_front() {
            for &edge in &self.out_edges[next] {
                let sources = &self.sources[edge];
                let Some(source_pres) = sources
                    .iter()
                    .map(|&source| items[source].as_ref())
                    .collect::<Option<Vec<_>>>()
                else {
                    continue;
                };
                let mut pre: HashSet<ItemId> = sources.iter().copied().collect();
                for source_pre in source_pres {
                    pre.extend(source_pre.iter().copied());
                }

                // Prerequisites only shrink; equal size means nothing changed.
                if edges[edge]
                    .as_ref()
                    .is_some_and(|old| old.len() <= pre.len())
                {
                    continue;
                }
                let target = self.targets[edge];
                match items[target].as_mut() {
                    Some(current) => {
                        let before = current.len();
                        current.retain(|item| pre.contains(item));
                        if current.len() < before {
                            fresh.push_back(target);
                        }
                    }
                    None => {
                        debug_assert!(!pre.contains(&target));
                        items[target] = Some(pre.clone());
                        fresh.push_back(target);
                    }
                }
                edges[edge] = Some(pre);
            }
        }

        debug!(
            "Prerequisite fixpoint for {}: {}/{} items, {}/{} edges resolved",
            self.graph.name(),
            items.iter().flatten().count(),
            items.len(),
            edges.iter().flatten().count(),
            edges.len()
        );
        Prerequisites { items, edges }
    }

    /// Re-derives every item's prerequisites from the recorded edge
    /// prerequisites and checks both directions of the fixpoint equations:
    /// each edge's set is its sources plus their sets, and each item's set is
    /// the intersection over the edges producing it.
    pub fn check_prerequisites(&self) -> bool {
        let pre = self.prerequisites();
        let mut expected: Vec<Option<HashSet<ItemId>>> = vec![None; self.item_count()];
        for (edge, edge_pre) in pre.edges.iter().enumerate() {
            let Some(edge_pre) = edge_pre else {
                continue;
            };
            let mut union: HashSet<ItemId> = self.sources[edge].iter().copied().collect();
            for &source in &self.sources[edge] {
                match &pre.items[source] {
                    Some(source_pre) => union.extend(source_pre.iter().copied()),
                    None => return false,
                }
            }
            if &union != edge_pre {
                return false;
            }
            let target = self.targets[edge];
            match expected[target].as_mut() {
                Some(acc) => acc.retain(|item| edge_pre.contains(item)),
                None => expected[target] = Some(edge_pre.clone()),
            }
        }
        expected == pre.items
    }

    fn compute_depths(&self) -> Depths {
        let mut items = vec![UNREACHABLE; self.item_count()];
        let mut edges = vec![UNREACHABLE; self.edge_count()];
        let mut fresh = VecDeque::new();

        for edge in self.axioms() {
            edges[edge] = 0;
            let target = self.targets[edge];
            if items[target] != 0 {
                items[target] = 0;
                fresh.push_back(target);
            }
        }

        while let Some(next) = fresh.pop_front() {
            for &edge in &self.out_edges[next] {
                let sources = &self.sources[edge];
                if sources.iter().any(|&source| items[source] == UNREACHABLE) {
                    continue;
                }
                let depth = 1 + sources
                    .iter()
                    .map(|&source| items[source])
                    .max()
                    .unwrap_or(0);
                edges[edge] = depth;
                let target = self.targets[edge];
                if items[target] > depth {
                    items[target] = depth;
                    fresh.push_back(target);
                }
            }
        }

        Depths { items, edges }
    }
}

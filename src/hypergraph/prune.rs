//! Reduction of a hypergraph to the part derivable from its axioms.

use std::{collections::VecDeque, fmt};

use serde::Serialize;

use super::{index::GraphIndex, Hypergraph};

/// Returns the sub-hypergraph reachable from the axioms of `index`'s graph.
///
/// Axioms and their targets are admitted first; afterwards an edge is
/// admitted once all of its sources are reachable, unless its target is one of
/// its own sources. The reachable set is a fixpoint and does not depend on the
/// order in which the frontier is explored.
pub fn prune(index: &GraphIndex) -> Hypergraph {
    let original = index.graph();
    let mut pruned = Hypergraph::new(original.name());
    let mut reached = vec![false; index.item_count()];
    let mut frontier = VecDeque::new();

    for (edge_id, edge) in original.edges().iter().enumerate() {
        if edge.is_axiom() {
            pruned.add_edge(edge.clone());
            let target = index.edge_target(edge_id);
            if !reached[target] {
                reached[target] = true;
                frontier.push_back(target);
            }
        }
    }

    while let Some(next) = frontier.pop_front() {
        for &edge_id in index.out_edge_ids(next) {
            let sources = index.edge_sources(edge_id);
            let target = index.edge_target(edge_id);
            if !sources.iter().all(|&source| reached[source]) || sources.contains(&target) {
                continue;
            }
            if !reached[target] {
                reached[target] = true;
                frontier.push_back(target);
            }
            pruned.add_edge(index.edge(edge_id).clone());
        }
    }
    pruned
}

/// Sizes before and after pruning, for reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PruneStats {
    pub original_items: usize,
    pub original_edges: usize,
    pub items: usize,
    pub edges: usize,
    pub max_depth: usize,
}

impl PruneStats {
    pub fn collect(original: &GraphIndex, pruned: &GraphIndex) -> Self {
        Self {
            original_items: original.item_count(),
            original_edges: original.edge_count(),
            items: pruned.item_count(),
            edges: pruned.edge_count(),
            max_depth: pruned.max_depth(),
        }
    }
}

impl fmt::Display for PruneStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "original graph: {} nodes, {} edges; pruned graph: {} nodes, {} edges; max depth: {}",
            self.original_items, self.original_edges, self.items, self.edges, self.max_depth
        )
    }
}

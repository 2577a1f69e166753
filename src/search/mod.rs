//! Entry point for plan enumeration.
//!
//! A [`Search`] prunes its graph once and indexes the result; every call to
//! [`Search::search`] then starts an independent [`SearchInstance`] over the
//! shared index.

use std::sync::Arc;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    hypergraph::{
        index::GraphIndex,
        prune::{prune, PruneStats},
        Hypergraph, Item,
    },
};

pub mod instance;

pub use instance::SearchInstance;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Search the sub-graph reachable from axioms instead of the full graph.
    pub prune: bool,
    /// Emit one `trace!` line describing the engine state after every step.
    pub trace_steps: bool,
    /// Verify the prerequisite fixpoint equations once the index is built.
    pub check_prerequisites: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            prune: true,
            trace_steps: false,
            check_prerequisites: cfg!(debug_assertions),
        }
    }
}

impl SearchConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

pub struct Search {
    index: Arc<GraphIndex>,
    stats: PruneStats,
    config: SearchConfig,
}

impl Search {
    pub fn new(graph: Hypergraph) -> Self {
        Self::with_config(graph, SearchConfig::default())
    }

    pub fn with_config(graph: Hypergraph, config: SearchConfig) -> Self {
        let original = GraphIndex::new(graph);
        let (index, stats) = if config.prune {
            let pruned = GraphIndex::new(prune(&original));
            let stats = PruneStats::collect(&original, &pruned);
            (pruned, stats)
        } else {
            let stats = PruneStats::collect(&original, &original);
            (original, stats)
        };

        info!("Result of pruning {}", index.graph().name());
        info!(
            "Original graph: {} nodes, {} edges",
            stats.original_items, stats.original_edges
        );
        info!("Pruned graph: {} nodes, {} edges", stats.items, stats.edges);
        info!("Max depth: {}", stats.max_depth);

        if config.check_prerequisites && !index.check_prerequisites() {
            warn!(
                "Prerequisite sets of {} violate their fixpoint equations",
                index.graph().name()
            );
        }

        Self {
            index: Arc::new(index),
            stats,
            config,
        }
    }

    /// The graph plans are searched in (pruned unless disabled).
    pub fn graph(&self) -> &Hypergraph {
        self.index.graph()
    }

    pub fn index(&self) -> &Arc<GraphIndex> {
        &self.index
    }

    pub fn stats(&self) -> &PruneStats {
        &self.stats
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Starts enumerating the plans for `target`.
    pub fn search(&self, target: impl Into<Item>) -> SearchInstance {
        SearchInstance::new(Arc::clone(&self.index), target.into())
            .with_step_tracing(self.config.trace_steps)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::hypergraph::Hyperedge;

    #[test]
    fn test_config_from_json_defaults_missing_fields() {
        let config = SearchConfig::from_json(r#"{ "trace_steps": true }"#).unwrap();
        assert_eq!(
            config,
            SearchConfig {
                trace_steps: true,
                ..SearchConfig::default()
            }
        );
        assert!(config.prune);
    }

    #[test]
    fn test_config_rejects_bad_json() {
        assert!(SearchConfig::from_json("{ prune: yes").is_err());
    }

    #[test]
    fn test_search_exposes_pruned_graph() {
        let mut graph = Hypergraph::new("g");
        graph.add_generator("a");
        graph.add_edge(Hyperedge::new(["a"], "a-b", "b"));
        graph.add_edge(Hyperedge::new(["z"], "z-b", "b"));
        let search = Search::new(graph);
        assert_eq!(search.graph().edge_count(), 2);
        assert_eq!(search.stats().original_edges, 3);
        assert_eq!(search.stats().max_depth, 1);
    }

    #[test]
    fn test_unpruned_search_keeps_everything() {
        let mut graph = Hypergraph::new("g");
        graph.add_generator("a");
        graph.add_edge(Hyperedge::new(["z"], "z-b", "b"));
        let config = SearchConfig {
            prune: false,
            ..SearchConfig::default()
        };
        let search = Search::with_config(graph, config);
        assert_eq!(search.graph().edge_count(), 2);
        assert_eq!(search.stats().items, search.stats().original_items);
    }
}

//! Production plans and their engine-independent validation.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use itertools::Itertools;

use crate::hypergraph::{index::GraphIndex, Hyperedge, Hypergraph, Item};

static NEXT_PLAN_ID: AtomicUsize = AtomicUsize::new(0);

/// Reasons a sequence of edges is not a plan for a given target.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("{item} has more than one producer")]
    DuplicateProducer { item: Item },
    #[error("source {source_item} of {edge} is not produced by the plan")]
    UnproducedSource { source_item: Item, edge: Hyperedge },
    #[error("edges {} are never triggered", .0.iter().join(", "))]
    UnusedEdges(Vec<Hyperedge>),
    #[error("expected a single unconsumed item, found [{}]", .0.iter().join(", "))]
    AmbiguousResult(Vec<Item>),
    #[error("plan produces {found} instead of {expected}")]
    WrongTarget { expected: Item, found: Item },
}

/// One complete acyclic derivation of a target, as the ordered list of the
/// edges chosen for each item during search.
#[derive(Clone)]
pub struct Plan {
    id: usize,
    index: Arc<GraphIndex>,
    target: Item,
    edges: Vec<Hyperedge>,
    step_count: u64,
}

impl Plan {
    pub(crate) fn new(
        index: Arc<GraphIndex>,
        target: Item,
        edges: Vec<Hyperedge>,
        step_count: u64,
    ) -> Self {
        Self {
            id: NEXT_PLAN_ID.fetch_add(1, Ordering::Relaxed),
            index,
            target,
            edges,
            step_count,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// The graph the plan was found in.
    pub fn graph(&self) -> &Hypergraph {
        self.index.graph()
    }

    pub fn target(&self) -> &Item {
        &self.target
    }

    pub fn edges(&self) -> &[Hyperedge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Forward and backward search steps taken until this plan was complete.
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn name(&self) -> String {
        format!("{}-{}-{}", self.graph().name(), self.target.name(), self.id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Hyperedge> {
        self.edges.iter()
    }

    pub fn validate(&self, target: &Item) -> Result<(), PlanError> {
        validate_edges(&self.edges, target)
    }

    pub fn is_valid(&self, target: &Item) -> bool {
        self.validate(target).is_ok()
    }
}

impl PartialEq for Plan {
    fn eq(&self, other: &Self) -> bool {
        self.target == other.target && self.edges == other.edges
    }
}

impl Eq for Plan {}

impl<'a> IntoIterator for &'a Plan {
    type Item = &'a Hyperedge;
    type IntoIter = std::slice::Iter<'a, Hyperedge>;

    fn into_iter(self) -> Self::IntoIter {
        self.edges.iter()
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({} edges, {} steps)", self.name(), self.len(), self.step_count)?;
        for edge in &self.edges {
            writeln!(f, "  {}", edge)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plan")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("edges", &self.edges)
            .field("step_count", &self.step_count)
            .finish()
    }
}

/// Checks that `edges` derive exactly `target` from axioms.
///
/// Production order is rebuilt from scratch: starting at the axioms, an edge
/// fires once all of its sources have been produced. The edges pass when
/// every item has a single producer, every source is produced inside the
/// plan, every edge fires, and the only item no edge consumes is `target`.
pub fn validate_edges(edges: &[Hyperedge], target: &Item) -> Result<(), PlanError> {
    let mut producers: HashMap<&Item, usize> = HashMap::new();
    for (ix, edge) in edges.iter().enumerate() {
        if producers.insert(edge.target(), ix).is_some() {
            return Err(PlanError::DuplicateProducer {
                item: edge.target().clone(),
            });
        }
    }

    let mut consumers: HashMap<&Item, Vec<usize>> = HashMap::new();
    for (ix, edge) in edges.iter().enumerate() {
        for source in edge.sources().iter().unique() {
            if !producers.contains_key(source) {
                return Err(PlanError::UnproducedSource {
                    source_item: source.clone(),
                    edge: edge.clone(),
                });
            }
            consumers.entry(source).or_default().push(ix);
        }
    }

    let mut produced: HashSet<&Item> = HashSet::new();
    let mut unconsumed: HashSet<&Item> = producers.keys().copied().collect();
    let mut unused: HashSet<usize> = (0..edges.len()).collect();
    let mut fresh = VecDeque::new();
    for (ix, edge) in edges.iter().enumerate() {
        if edge.is_axiom() {
            unused.remove(&ix);
            fresh.push_back(edge.target());
        }
    }
    while let Some(next) = fresh.pop_front() {
        produced.insert(next);
        for &ix in consumers.get(next).map_or(&[][..], Vec::as_slice) {
            let edge = &edges[ix];
            if edge.sources().iter().all(|s| produced.contains(s)) && unused.remove(&ix) {
                for source in edge.sources() {
                    unconsumed.remove(source);
                }
                fresh.push_back(edge.target());
            }
        }
    }

    // Every item has its producer in the plan, so once all edges have fired
    // every item has been produced.
    if !unused.is_empty() {
        return Err(PlanError::UnusedEdges(
            unused.into_iter().sorted().map(|ix| edges[ix].clone()).collect(),
        ));
    }
    let residual: Vec<Item> = unconsumed.into_iter().cloned().sorted().collect();
    match residual.as_slice() {
        [found] if found == target => Ok(()),
        [found] => Err(PlanError::WrongTarget {
            expected: target.clone(),
            found: found.clone(),
        }),
        _ => Err(PlanError::AmbiguousResult(residual)),
    }
}

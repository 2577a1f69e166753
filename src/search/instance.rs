//! Backtracking enumeration of the plans for one target.
//!
//! The engine keeps a partial derivation: `made` holds the items that have a
//! producer, in the order they got it, and `frontier` the items that are
//! needed but have none yet. A forward step gives the top frontier item the
//! first producer that cannot close a cycle; a backward step takes the most
//! recently made item back and tries its next producer. Whenever the frontier
//! runs empty a plan is complete; when a backward step leaves nothing made the
//! space is exhausted.
//!
//! Cycle detection relies on `downstream`: for every discovered item, the
//! items that currently depend on it. A producer is rejected when its
//! unavoidable prerequisites meet the item or its downstream set. Committing a
//! producer pushes the new dependencies up through the made items and records
//! exactly what it added, so that undoing the commit costs no more than the
//! commit did.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    fmt::Write,
    iter::FusedIterator,
    sync::Arc,
};

use itertools::Itertools;
use log::{debug, error, trace};

use crate::{
    hypergraph::{
        index::{EdgeId, GraphIndex, ItemId},
        Hyperedge, Item,
    },
    plan::Plan,
    visualization,
};

/// A pull-based generator of the plans for one target.
///
/// [`has_next`](Self::has_next) advances the search until a plan is pending or
/// none is left; [`next_plan`](Self::next_plan) hands the pending plan out.
/// The iterator implementation combines the two.
pub struct SearchInstance {
    index: Arc<GraphIndex>,
    target: Item,
    /// Items with a producer, in assignment order.
    made: Vec<ItemId>,
    /// Items still to be given a producer; the top is the last element.
    frontier: Vec<ItemId>,
    /// For every discovered item, the items currently depending on it.
    downstream: HashMap<ItemId, HashSet<ItemId>>,
    /// For every made item, the position of its producer among its in-edges.
    maker_index: HashMap<ItemId, usize>,
    /// For every active producer, what its commit added to each downstream set.
    deltas: HashMap<EdgeId, HashMap<ItemId, Vec<ItemId>>>,
    exhausted: bool,
    next_ready: bool,
    step_count: u64,
    trace_steps: bool,
}

impl SearchInstance {
    /// Starts a search for `target` over `index`. A target the graph does not
    /// contain has no plans.
    pub fn new(index: Arc<GraphIndex>, target: Item) -> Self {
        let mut frontier = Vec::new();
        let mut downstream = HashMap::new();
        let exhausted = match index.item_id(&target) {
            Some(id) => {
                frontier.push(id);
                downstream.insert(id, HashSet::new());
                false
            }
            None => {
                debug!("{} does not occur in {}", target, index.graph().name());
                true
            }
        };
        Self {
            index,
            target,
            made: Vec::new(),
            frontier,
            downstream,
            maker_index: HashMap::new(),
            deltas: HashMap::new(),
            exhausted,
            next_ready: false,
            step_count: 0,
            trace_steps: false,
        }
    }

    pub fn with_step_tracing(mut self, trace_steps: bool) -> Self {
        self.trace_steps = trace_steps;
        self
    }

    pub fn index(&self) -> &Arc<GraphIndex> {
        &self.index
    }

    pub fn target(&self) -> &Item {
        &self.target
    }

    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    /// Whether a plan is pending, without advancing the search.
    pub fn is_ready(&self) -> bool {
        self.next_ready
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Advances the search if needed and reports whether a plan is pending.
    pub fn has_next(&mut self) -> bool {
        if !self.exhausted && !self.next_ready {
            self.find_next();
        }
        self.next_ready
    }

    /// Takes the pending plan, searching for one first if necessary.
    pub fn next_plan(&mut self) -> Option<Plan> {
        if !self.has_next() {
            return None;
        }
        let plan = Plan::new(
            Arc::clone(&self.index),
            self.target.clone(),
            self.makers().cloned().collect(),
            self.step_count,
        );
        self.next_ready = false;
        debug!(
            "Plan #{} for {}: {} edges after {} steps",
            plan.id(),
            self.target,
            plan.len(),
            self.step_count
        );
        Some(plan)
    }

    /// Made items in assignment order.
    pub fn made(&self) -> impl Iterator<Item = &Item> + '_ {
        self.made.iter().map(|&id| self.index.item(id))
    }

    /// Frontier items, top first.
    pub fn frontier(&self) -> impl Iterator<Item = &Item> + '_ {
        self.frontier.iter().rev().map(|&id| self.index.item(id))
    }

    /// Current producers of the made items, in assignment order.
    pub fn makers(&self) -> impl Iterator<Item = &Hyperedge> + '_ {
        self.made
            .iter()
            .map(|&id| self.index.edge(self.maker_of(id)))
    }

    fn maker_of(&self, item: ItemId) -> EdgeId {
        self.index.in_edge_ids(item)[self.maker_index[&item]]
    }

    fn find_next(&mut self) {
        debug_assert!(!self.next_ready);
        let mut forward = !self.frontier.is_empty();
        while !self.exhausted && !self.next_ready {
            forward = if forward {
                self.forward_step()
            } else {
                self.backward_step()
            };
            if self.trace_steps {
                trace!("{}", self.state_line());
            }
            if forward {
                self.next_ready = self.frontier.is_empty();
            } else {
                self.exhausted = self.made.is_empty();
            }
        }
        if self.exhausted {
            debug!(
                "Search for {} exhausted after {} steps",
                self.target, self.step_count
            );
        }
    }

    /// Finds a producer for the top frontier item.
    fn forward_step(&mut self) -> bool {
        let Some(item) = self.frontier.pop() else {
            return false;
        };
        self.try_makers(item, 0)
    }

    /// Replaces the producer of the most recently made item by its next
    /// admissible alternative.
    fn backward_step(&mut self) -> bool {
        let Some(item) = self.made.pop() else {
            return false;
        };
        let Some(maker_ix) = self.maker_index.remove(&item) else {
            unreachable!("made item {} has no producer", self.index.item(item));
        };
        let edge = self.index.in_edge_ids(item)[maker_ix];
        self.remove_maker(edge);
        self.try_makers(item, maker_ix + 1)
    }

    /// Commits the first admissible producer of `item` at or after position
    /// `from`; otherwise puts `item` back on the frontier.
    fn try_makers(&mut self, item: ItemId, from: usize) -> bool {
        let index = Arc::clone(&self.index);
        let in_edges = index.in_edge_ids(item);
        let downstream = &self.downstream[&item];
        let chosen = (from..in_edges.len()).find(|&ix| {
            index.edge_pre(in_edges[ix]).is_some_and(|pre| {
                !pre.contains(&item) && pre.is_disjoint(downstream)
            })
        });
        self.step_count += 1;
        match chosen {
            Some(maker_ix) => {
                self.add_maker(item, maker_ix);
                true
            }
            None => {
                self.frontier.push(item);
                false
            }
        }
    }

    fn add_maker(&mut self, item: ItemId, maker_ix: usize) {
        let index = Arc::clone(&self.index);
        let edge = index.in_edge_ids(item)[maker_ix];
        self.made.push(item);
        self.maker_index.insert(item, maker_ix);

        let mut new_downstream: Vec<ItemId> = self.downstream[&item].iter().copied().collect();
        new_downstream.push(item);

        let mut deltas: HashMap<ItemId, Vec<ItemId>> = HashMap::new();
        for source in index.edge_sources(edge).iter().copied().unique() {
            if self.downstream.contains_key(&source) {
                // Known already: extend it and everything it is made from.
                let mut upstream = VecDeque::from([source]);
                while let Some(next) = upstream.pop_front() {
                    if deltas.contains_key(&next) {
                        continue;
                    }
                    let current = self.downstream.entry(next).or_default();
                    let added: Vec<ItemId> = new_downstream
                        .iter()
                        .copied()
                        .filter(|&dependent| current.insert(dependent))
                        .collect();
                    deltas.insert(next, added);
                    if let Some(&next_ix) = self.maker_index.get(&next) {
                        let next_maker = index.in_edge_ids(next)[next_ix];
                        upstream.extend(index.edge_sources(next_maker).iter().copied());
                    }
                }
            } else {
                self.frontier.push(source);
                self.downstream
                    .insert(source, new_downstream.iter().copied().collect());
            }
        }
        self.deltas.insert(edge, deltas);
    }

    fn remove_maker(&mut self, edge: EdgeId) {
        let index = Arc::clone(&self.index);
        let Some(deltas) = self.deltas.remove(&edge) else {
            unreachable!("producer {} has no recorded commit", index.edge(edge));
        };
        // Reverse order of first occurrence, mirroring the pushes of the commit.
        let sources: Vec<ItemId> = index.edge_sources(edge).iter().copied().unique().collect();
        for &source in sources.iter().rev() {
            if deltas.contains_key(&source) {
                continue;
            }
            // Discovered by this commit, so still on top of the frontier.
            if self.frontier.last() != Some(&source) {
                error!(
                    "{}",
                    visualization::search_state_to_dot(self, &[index.edge(edge).clone()])
                );
                panic!(
                    "source {} of {} is not on top of the frontier",
                    index.item(source),
                    index.edge(edge)
                );
            }
            self.frontier.pop();
            self.downstream.remove(&source);
        }
        for (item, added) in deltas {
            if let Some(current) = self.downstream.get_mut(&item) {
                for dependent in added {
                    current.remove(&dependent);
                }
            }
        }
    }

    /// `position:maker/alternatives` per made item, then `position:.` per
    /// frontier item.
    fn state_line(&self) -> String {
        let mut line = String::new();
        for (position, item) in self.made.iter().enumerate() {
            let _ = write!(
                line,
                "{}:{}/{} ",
                position,
                self.maker_index[item],
                self.index.in_edge_ids(*item).len()
            );
        }
        for position in self.made.len()..self.made.len() + self.frontier.len() {
            let _ = write!(line, "{}:. ", position);
        }
        line
    }
}

impl Iterator for SearchInstance {
    type Item = Plan;

    fn next(&mut self) -> Option<Plan> {
        self.next_plan()
    }
}

impl FusedIterator for SearchInstance {}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        hypergraph::{prune::prune, Hypergraph},
        plan::validate_edges,
        search::{Search, SearchConfig},
    };

    fn names(plan: &Plan) -> Vec<&str> {
        plan.edges().iter().map(|edge| edge.name()).collect()
    }

    fn edge_set(edges: &[Hyperedge]) -> BTreeSet<String> {
        edges.iter().map(|edge| edge.to_string()).collect()
    }

    /// Follows producers from every item of the plan and fails on revisiting
    /// an item on the current path.
    fn is_acyclic(plan: &Plan) -> bool {
        let producers: HashMap<&Item, &Hyperedge> =
            plan.edges().iter().map(|edge| (edge.target(), edge)).collect();
        fn visit<'a>(
            item: &'a Item,
            producers: &HashMap<&'a Item, &'a Hyperedge>,
            path: &mut HashSet<&'a Item>,
        ) -> bool {
            if !path.insert(item) {
                return false;
            }
            let ok = producers.get(item).copied().map_or(true, |edge| {
                edge.sources().iter().all(|source| visit(source, producers, path))
            });
            path.remove(item);
            ok
        }
        plan.edges()
            .iter()
            .all(|edge| visit(edge.target(), &producers, &mut HashSet::new()))
    }

    fn tangled() -> Hypergraph {
        let mut graph = Hypergraph::new("tangled");
        graph.add_generator("a");
        graph.add_generator("b");
        graph.add_edge(Hyperedge::new(["a"], "a-c", "c"));
        graph.add_edge(Hyperedge::new(["b"], "b-c", "c"));
        graph.add_edge(Hyperedge::new(["d"], "d-c", "c"));
        graph.add_edge(Hyperedge::new(["c"], "c-d", "d"));
        graph.add_edge(Hyperedge::new(["b", "b"], "bb-d", "d"));
        graph.add_edge(Hyperedge::new(["c", "d"], "cd-t", "t"));
        graph.add_edge(Hyperedge::new(["a"], "a-t", "t"));
        graph.add_edge(Hyperedge::new(["t"], "t-a", "a"));
        graph.add_edge(Hyperedge::new(["d"], "d-a", "a"));
        graph.add_edge(Hyperedge::new(["c", "a"], "ca-e", "e"));
        graph.add_edge(Hyperedge::new(["e", "b"], "eb-t", "t"));
        graph.add_edge(Hyperedge::new(["t"], "t-t", "t"));
        graph
    }

    #[test]
    fn test_single_chain() {
        let mut graph = Hypergraph::new("chain");
        graph.add_edge(Hyperedge::axiom("A-edge", "A"));
        graph.add_edge(Hyperedge::new(["A"], "make-B", "B"));
        let search = Search::new(graph);
        let mut plans = search.search("B");

        assert!(plans.has_next());
        let plan = plans.next_plan().unwrap();
        assert_eq!(plan.len(), 2);
        // Edges come in assignment order (the order items got their producer),
        // so the target's producer leads, not the axiom.
        assert_eq!(names(&plan), vec!["make-B", "A-edge"]);
        assert_eq!(plan.validate(&Item::new("B")), Ok(()));
        assert!(!plans.has_next());
        assert!(plans.next_plan().is_none());
        assert!(plans.next().is_none());
    }

    #[test]
    fn test_alternative_producers() {
        let mut graph = Hypergraph::new("alt");
        graph.add_generator("X");
        graph.add_generator("Y");
        graph.add_edge(Hyperedge::new(["X"], "x-z", "Z"));
        graph.add_edge(Hyperedge::new(["Y"], "y-z", "Z"));
        let plans: Vec<Plan> = Search::new(graph).search("Z").collect();

        assert_eq!(plans.len(), 2);
        assert_eq!(names(&plans[0]), vec!["x-z", "GEN-X"]);
        assert_eq!(names(&plans[1]), vec!["y-z", "GEN-Y"]);
        assert!(plans.iter().all(|plan| plan.is_valid(&Item::new("Z"))));
    }

    #[test]
    fn test_axiom_target_gives_single_edge_plan() {
        let mut graph = Hypergraph::new("ax");
        graph.add_generator("a");
        let plans: Vec<Plan> = Search::new(graph).search("a").collect();
        assert_eq!(plans.len(), 1);
        assert_eq!(names(&plans[0]), vec!["GEN-a"]);
    }

    #[test]
    fn test_unknown_target_has_no_plans() {
        let mut graph = Hypergraph::new("ax");
        graph.add_generator("a");
        let mut plans = Search::new(graph).search("b");
        assert!(plans.is_exhausted());
        assert!(!plans.has_next());
        assert_eq!(plans.step_count(), 0);
    }

    #[test]
    fn test_underivable_target_is_exhausted() {
        let mut graph = Hypergraph::new("stuck");
        graph.add_generator("a");
        graph.add_edge(Hyperedge::new(["a", "z"], "az-b", "b"));
        let config = SearchConfig {
            prune: false,
            ..SearchConfig::default()
        };
        let mut plans = Search::with_config(graph, config).search("b");
        assert!(plans.next().is_none());
        assert!(plans.is_exhausted());
    }

    #[test]
    fn test_self_loop_is_never_chosen() {
        let mut graph = Hypergraph::new("self");
        graph.add_generator("A");
        graph.add_edge(Hyperedge::new(["A"], "A-A", "A"));
        graph.add_edge(Hyperedge::new(["A"], "A-B", "B"));

        let pruned = Search::new(graph.clone());
        assert!(!pruned
            .graph()
            .contains_edge(&Hyperedge::new(["A"], "A-A", "A")));

        let config = SearchConfig {
            prune: false,
            ..SearchConfig::default()
        };
        let unpruned = Search::with_config(graph, config);
        for target in ["A", "B"] {
            let plans: Vec<Plan> = unpruned.search(target).collect();
            assert_eq!(plans.len(), 1, "target {}", target);
            assert!(plans[0].is_valid(&Item::new(target)));
            assert!(plans[0].iter().all(|edge| edge.name() != "A-A"));
        }
    }

    #[test]
    fn test_duplicate_sources() {
        let mut graph = Hypergraph::new("dups");
        graph.add_generator("a");
        graph.add_edge(Hyperedge::new(["a", "a"], "aa-b", "b"));
        graph.add_edge(Hyperedge::new(["b", "a", "b"], "bab-c", "c"));
        let plans: Vec<Plan> = Search::new(graph).search("c").collect();
        assert_eq!(plans.len(), 1);
        assert_eq!(names(&plans[0]), vec!["bab-c", "GEN-a", "aa-b"]);
        assert!(plans[0].is_valid(&Item::new("c")));
    }

    #[test]
    fn test_every_plan_is_valid_and_acyclic() {
        let search = Search::new(tangled());
        for target in search.graph().items() {
            for plan in search.search(target) {
                assert_eq!(plan.validate(target), Ok(()), "{}", plan);
                assert!(is_acyclic(&plan), "{}", plan);
            }
        }
    }

    #[test]
    fn test_unpruned_plans_are_acyclic() {
        let config = SearchConfig {
            prune: false,
            ..SearchConfig::default()
        };
        let search = Search::with_config(tangled(), config);
        for target in search.graph().items() {
            for plan in search.search(target) {
                assert_eq!(plan.validate(target), Ok(()), "{}", plan);
                assert!(is_acyclic(&plan), "{}", plan);
            }
        }
    }

    #[test]
    fn test_enumeration_is_complete() {
        let graph = tangled();
        let edges = graph.edges().to_vec();
        assert!(edges.len() <= 16);
        let search = Search::new(graph.clone());

        for target in graph.items() {
            let mut expected = BTreeSet::new();
            for mask in 0u32..(1 << edges.len()) {
                let subset: Vec<Hyperedge> = edges
                    .iter()
                    .enumerate()
                    .filter(|(ix, _)| mask & (1 << ix) != 0)
                    .map(|(_, edge)| edge.clone())
                    .collect();
                if validate_edges(&subset, target).is_ok() {
                    expected.insert(edge_set(&subset));
                }
            }

            let found: Vec<BTreeSet<String>> = search
                .search(target)
                .map(|plan| edge_set(plan.edges()))
                .collect();
            let found_set: BTreeSet<BTreeSet<String>> = found.iter().cloned().collect();
            assert_eq!(found.len(), found_set.len(), "duplicate plans for {}", target);
            assert_eq!(found_set, expected, "plans for {}", target);
        }
    }

    #[test]
    fn test_enumeration_is_deterministic() {
        let first = Search::new(tangled());
        let second = Search::new(tangled());
        for target in first.graph().items() {
            let a: Vec<Plan> = first.search(target).collect();
            let b: Vec<Plan> = second.search(target).collect();
            assert_eq!(a, b);
            let again: Vec<Plan> = first.search(target).collect();
            assert_eq!(a, again);
        }
    }

    #[test]
    fn test_instances_share_an_index() {
        let search = Search::new(tangled());
        let mut left = search.search("t");
        let mut right = search.search("t");
        let l = left.next().unwrap();
        let r = right.next().unwrap();
        assert_eq!(l, r);
        assert_ne!(l.id(), r.id());
        assert!(Arc::ptr_eq(left.index(), right.index()));
    }

    #[test]
    fn test_step_counts_grow() {
        let search = Search::new(tangled());
        let steps: Vec<u64> = search.search("t").map(|plan| plan.step_count()).collect();
        assert!(steps.len() > 1);
        assert!(steps.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_readiness_is_a_peek() {
        let search = Search::new(tangled());
        let mut plans = search.search("t");
        assert!(!plans.is_ready());
        assert!(plans.has_next());
        assert!(plans.is_ready());
        let steps = plans.step_count();
        assert!(plans.has_next());
        assert_eq!(plans.step_count(), steps);
        plans.next_plan();
        assert!(!plans.is_ready());
    }

    #[test]
    fn test_state_is_restored_after_exhaustion() {
        let index = Arc::new(GraphIndex::new(prune(&GraphIndex::new(tangled()))));
        let mut plans = SearchInstance::new(Arc::clone(&index), Item::new("t"));
        while plans.next().is_some() {}
        assert!(plans.made.is_empty());
        assert!(plans.deltas.is_empty());
        assert!(plans.maker_index.is_empty());
        let target = index.item_id(&Item::new("t")).unwrap();
        assert_eq!(plans.frontier, vec![target]);
        assert_eq!(plans.downstream.len(), 1);
        assert!(plans.downstream[&target].is_empty());
    }

    #[test]
    fn test_commit_records_an_entry_per_producer() {
        let mut graph = Hypergraph::new("chain");
        graph.add_generator("a");
        graph.add_edge(Hyperedge::new(["a", "a"], "aa-b", "b"));
        let mut plans = Search::new(graph).search("b");
        assert!(plans.has_next());
        assert_eq!(plans.deltas.len(), 2);
        // Both sources were new, so the commit extended no existing set.
        assert!(plans.deltas.values().all(HashMap::is_empty));
        assert!(plans.next_plan().is_some());
        assert!(!plans.has_next());
        assert!(plans.deltas.is_empty());
    }

    #[test]
    #[should_panic(expected = "has no recorded commit")]
    fn test_undo_without_commit_is_a_bug() {
        let mut graph = Hypergraph::new("chain");
        graph.add_generator("a");
        graph.add_edge(Hyperedge::new(["a"], "a-b", "b"));
        let mut plans = Search::new(graph).search("b");
        assert!(plans.has_next());
        plans.deltas.clear();
        plans.next_plan();
        plans.has_next();
    }

    #[test]
    fn test_state_line() {
        let mut graph = Hypergraph::new("chain");
        graph.add_generator("a");
        graph.add_edge(Hyperedge::new(["a"], "a-b", "b"));
        let mut plans = Search::new(graph).search("b");
        plans.forward_step();
        assert_eq!(plans.state_line(), "0:0/1 1:. ");
    }
}

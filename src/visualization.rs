use std::{
    collections::HashMap,
    fmt::{self, Write},
};

use crate::{
    hypergraph::{Hyperedge, Item},
    plan::Plan,
    search::SearchInstance,
};

const HEADER: &str = "  node [style=filled, color=gold3, fillcolor=gold1, shape=box];\n  edge [color=gold3];";
const MADE_STYLE: &str = "color=deepskyblue3, fillcolor=deepskyblue1, shape=ellipse";
const FOUND_STYLE: &str = "color=deepskyblue3, fillcolor=cyan1, shape=ellipse";

fn escape(label: &str) -> String {
    label
        .replace('\\', "\\\\")
        .replace('\"', "\\\"")
        .replace('\n', "\\n")
}

/// Writes a Graphviz DOT rendering of `plan`.
///
/// Items become ellipses; every edge becomes a small box that its sources
/// point into (labelled with their position) and that points to its target.
pub fn write_plan_dot<W: Write>(plan: &Plan, out: &mut W) -> fmt::Result {
    writeln!(out, "digraph \"{}\" {{", escape(&plan.name()))?;
    writeln!(out, "{}", HEADER)?;

    let mut node_ids: HashMap<&Item, String> = HashMap::new();
    for edge in plan {
        for item in edge.sources().iter().chain([edge.target()]) {
            if !node_ids.contains_key(item) {
                let id = format!("item_{}", node_ids.len());
                writeln!(out, "  {} [label=\"{}\", {}];", id, escape(item.name()), MADE_STYLE)?;
                node_ids.insert(item, id);
            }
        }
    }
    for (ix, edge) in plan.iter().enumerate() {
        write_edge(out, &format!("op_{}", ix), edge, |item| node_ids.get(item).cloned())?;
    }
    writeln!(out, "}}")
}

pub fn plan_to_dot(plan: &Plan) -> String {
    let mut dot = String::new();
    let _ = write_plan_dot(plan, &mut dot);
    dot
}

/// Writes the partial derivation held by `instance`, together with `extra`
/// edges that are not (yet) part of it.
///
/// Nodes are numbered in the order made items, targets of `extra` and
/// frontier items (top first) are listed; made items are filled dark, the
/// others light.
pub fn write_search_state_dot<W: Write>(
    instance: &SearchInstance,
    extra: &[Hyperedge],
    out: &mut W,
) -> fmt::Result {
    writeln!(
        out,
        "digraph \"{}\" {{",
        escape(instance.index().graph().name())
    )?;
    writeln!(out, "{}", HEADER)?;

    let mut node_names: HashMap<&Item, String> = HashMap::new();
    let made = instance.made().map(|item| (item, MADE_STYLE));
    let found = extra
        .iter()
        .map(Hyperedge::target)
        .chain(instance.frontier())
        .map(|item| (item, FOUND_STYLE));
    for (count, (item, style)) in made.chain(found).enumerate() {
        let name = escape(&format!("{}: {}", count, item.name()));
        writeln!(out, "  \"{}\" [{}];", name, style)?;
        node_names.insert(item, format!("\"{}\"", name));
    }

    for (ix, edge) in instance.makers().chain(extra).enumerate() {
        write_edge(out, &format!("op_{}", ix), edge, |item| node_names.get(item).cloned())?;
    }
    writeln!(out, "}}")
}

pub fn search_state_to_dot(instance: &SearchInstance, extra: &[Hyperedge]) -> String {
    let mut dot = String::new();
    let _ = write_search_state_dot(instance, extra, &mut dot);
    dot
}

/// Items without a node (sources not yet discovered) are drawn as plain
/// labels.
fn write_edge<'a, W: Write>(
    out: &mut W,
    op_id: &str,
    edge: &'a Hyperedge,
    node_of: impl Fn(&'a Item) -> Option<String>,
) -> fmt::Result {
    writeln!(
        out,
        "  {} [label=\"{}\", height=0, width=0];",
        op_id,
        escape(edge.name())
    )?;
    let node = |item: &'a Item| node_of(item).unwrap_or_else(|| format!("\"{}\"", escape(item.name())));
    for (position, source) in edge.sources().iter().enumerate() {
        writeln!(out, "  {} -> {} [headlabel=\"{}\"];", node(source), op_id, position)?;
    }
    writeln!(out, "  {} -> {};", op_id, node(edge.target()))
}

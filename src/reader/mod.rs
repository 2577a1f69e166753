//! Reading hypergraphs from semicolon-delimited text.
//!
//! After a header row, every row describes one edge as
//! `target;edge-name;source1;source2;...`. Sources end at the first empty
//! field, so trailing separators are harmless. The graph is named after the
//! file it was read from.

use std::{collections::HashSet, path::Path};

use log::{debug, info};
use pest::{iterators::Pair, Parser};
use pest_derive::Parser;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    hypergraph::{Hyperedge, Hypergraph, Item},
};

#[derive(Parser)]
#[grammar = "reader/graph.pest"]
pub struct GraphParser;

#[derive(thiserror::Error, Debug)]
pub enum ParseError {
    #[error("Pest parsing error: {0}")]
    Pest(#[from] Box<pest::error::Error<Rule>>),
    #[error("line {line}: blank target")]
    BlankTarget { line: usize },
    #[error("line {line}: missing edge name")]
    MissingEdgeName { line: usize },
}

impl From<pest::error::Error<Rule>> for ParseError {
    fn from(err: pest::error::Error<Rule>) -> Self {
        ParseError::Pest(Box::new(err))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Add an axiom `<item>-C` for every item that no edge produces.
    pub complete: bool,
    /// Drop edges whose target is among their sources.
    pub omit_circular: bool,
}

pub fn parse_graph(
    name: &str,
    input: &str,
    config: &ReaderConfig,
) -> std::result::Result<Hypergraph, ParseError> {
    let mut graph = Hypergraph::new(name);
    let records = GraphParser::parse(Rule::file, input)?
        .flat_map(|file| file.into_inner())
        .filter(|pair| pair.as_rule() == Rule::record);

    for record in records.skip(1) {
        let line = record.line_col().0;
        let fields: Vec<String> = record.into_inner().map(field_text).collect();
        if fields.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        let [target, rest @ ..] = fields.as_slice() else {
            continue;
        };
        if target.trim().is_empty() {
            return Err(ParseError::BlankTarget { line });
        }
        let Some((edge_name, sources)) = rest.split_first() else {
            return Err(ParseError::MissingEdgeName { line });
        };
        if edge_name.is_empty() {
            return Err(ParseError::MissingEdgeName { line });
        }
        let sources = sources.iter().take_while(|source| !source.is_empty());
        let edge = Hyperedge::new(sources.map(String::as_str), edge_name.as_str(), target.as_str());

        if config.omit_circular && edge.is_circular() {
            graph.add_item(edge.target());
            for source in edge.sources() {
                graph.add_item(source);
            }
            debug!("Circular edge {} not added", edge);
        } else {
            graph.add_edge(edge);
        }
    }

    if config.complete {
        complete(&mut graph);
    }
    Ok(graph)
}

/// Reads the graph stored at `path`, naming it after the file.
pub fn read_graph(path: impl AsRef<Path>, config: &ReaderConfig) -> Result<Hypergraph> {
    let path = path.as_ref();
    let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
        return Err(Error::invalid_path(path.to_path_buf()));
    };
    let input = std::fs::read_to_string(path)?;
    let graph = parse_graph(name, &input, config)?;
    info!(
        "Read {}: {} nodes, {} edges",
        graph.name(),
        graph.item_count(),
        graph.edge_count()
    );
    Ok(graph)
}

fn field_text(field: Pair<'_, Rule>) -> String {
    match field.as_rule() {
        Rule::quoted => field
            .into_inner()
            .map(|text| text.as_str().replace("\"\"", "\""))
            .collect(),
        _ => field.as_str().to_string(),
    }
}

fn complete(graph: &mut Hypergraph) {
    let produced: HashSet<&Item> = graph.edges().iter().map(Hyperedge::target).collect();
    let missing: Vec<Item> = graph
        .items()
        .iter()
        .filter(|item| !produced.contains(item))
        .cloned()
        .collect();
    info!("Adding {} generators to {}", missing.len(), graph.name());
    for item in missing {
        graph.add_edge(Hyperedge::axiom(format!("{}-C", item.name()), item));
    }
}

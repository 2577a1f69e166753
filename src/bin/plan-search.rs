use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use plansearch::{
    reader::{read_graph, ReaderConfig},
    visualization::plan_to_dot,
    Hyperedge, Item, Search, SearchConfig,
};
use serde::Deserialize;

/// Enumerate the plans deriving items of a semicolon-delimited graph file.
#[derive(Parser, Debug, Clone)]
#[command(name = "plan-search", version)]
struct Args {
    /// Graph file: a header row, then `target;edge;source1;source2;...` rows.
    graph: PathBuf,

    /// Number of items, in file order, that get an axiom `<item>-C`.
    #[arg(long, default_value_t = 5)]
    given: usize,

    /// JSON file with `reader` and `search` settings.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stop after this many plans per target.
    #[arg(long)]
    limit: Option<usize>,

    /// Directory receiving the first plan of every target as DOT.
    #[arg(long)]
    dot: Option<PathBuf>,

    /// Print the graph as read, one edge per line, and exit.
    #[arg(long)]
    print: bool,

    /// Targets to search for; every item of the graph when omitted.
    targets: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Config {
    reader: ReaderConfig,
    search: SearchConfig,
}

fn load_config(args: &Args) -> Result<Config> {
    let Some(path) = &args.config else {
        return Ok(Config::default());
    };
    let json =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("parsing {}", path.display()))
}

fn main() -> Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    let args = Args::parse();
    let config = load_config(&args)?;

    let mut graph = read_graph(&args.graph, &config.reader)?;
    if args.print {
        print!("{}", graph);
        return Ok(());
    }
    let givens: Vec<Item> = graph.items().iter().take(args.given).cloned().collect();
    for item in givens {
        graph.add_edge(Hyperedge::axiom(format!("{}-C", item.name()), item));
    }

    let targets: Vec<Item> = if args.targets.is_empty() {
        graph.items().to_vec()
    } else {
        args.targets.iter().map(Item::new).collect()
    };
    let search = Search::with_config(graph, config.search);
    if let Some(dir) = &args.dot {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    for target in &targets {
        info!("Solutions for {} in {}", target, search.graph().name());
        let mut count = 0;
        let mut step_count = 0;
        for plan in search.search(target).take(args.limit.unwrap_or(usize::MAX)) {
            count += 1;
            if let Err(e) = plan.validate(target) {
                warn!("Plan {} is invalid: {}", plan.name(), e);
            }
            if count == 1 {
                if let Some(dir) = &args.dot {
                    let path = dir.join(format!("{}.dot", plan.name()));
                    std::fs::write(&path, plan_to_dot(&plan))
                        .with_context(|| format!("writing {}", path.display()))?;
                }
            }
            info!("#{}: size {} ({} steps)", count, plan.len(), plan.step_count());
            step_count = plan.step_count();
        }
        info!("Done after {} solutions ({} search steps)", count, step_count);
    }
    Ok(())
}

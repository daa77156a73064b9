use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use kgrefine_core::{GraphStore, NodeLink};

pub fn run(path: &Path, json: bool) -> Result<()> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let data = NodeLink::from_json(&text)
        .with_context(|| format!("{} is not a node-link graph", path.display()))?;

    let graph = GraphStore::from_node_link(&data);
    let report = graph.assess_quality();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let marker = if report.is_clean() {
        style("●").green()
    } else {
        style("●").yellow()
    };
    eprintln!("{marker} {}", path.display());
    print!("{report}");
    Ok(())
}

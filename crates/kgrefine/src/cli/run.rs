use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use console::style;
use kgrefine_core::{ChatClient, PipelineOrchestrator, PipelineRun, Stage};

use super::load_config;

pub async fn run(
    text_file: &Path,
    config: Option<&Path>,
    out: Option<&Path>,
    summary: Option<&Path>,
) -> Result<()> {
    let text = fs::read_to_string(text_file)
        .with_context(|| format!("failed to read {}", text_file.display()))?;
    if text.trim().is_empty() {
        bail!("{} is empty", text_file.display());
    }

    let config = load_config(config)?;
    tracing::info!(
        model = %config.llm.model,
        endpoint = %config.llm.endpoint(),
        file = %text_file.display(),
        "Starting pipeline run"
    );
    let client = ChatClient::new(config.llm.clone()).context("failed to create model client")?;
    let orchestrator = PipelineOrchestrator::new(&client).with_config(config.pipeline);

    let run = match orchestrator.run(&text).await {
        Ok(run) => run,
        Err(halt) => {
            eprintln!("{} {}: {}", style("✗").red(), halt.stage, halt.reason);
            for diag in &halt.diagnostics {
                for note in &diag.notes {
                    eprintln!("  {}: {note}", diag.stage);
                }
            }
            bail!(halt);
        }
    };

    print_run(&run);

    if let Some(path) = out {
        let json = run.graph.to_node_link().to_json_pretty()?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        eprintln!("{} Graph written to {}", style("●").green(), path.display());
    }

    if let Some(path) = summary {
        let json = serde_json::to_string_pretty(&run.summary())?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        eprintln!("{} Summary written to {}", style("●").green(), path.display());
    }

    Ok(())
}

fn print_run(run: &PipelineRun) {
    eprintln!(
        "{} {} candidates, {} triples, {} refined",
        style("●").blue(),
        run.candidate_entities.len(),
        run.candidate_triples.len(),
        run.refined_triples.len()
    );
    for stage in Stage::ALL {
        let Some(diag) = run.diagnostics_for(stage) else {
            continue;
        };
        if diag.dropped > 0 {
            eprintln!(
                "  {stage}: kept {} of {} records",
                diag.accepted, diag.received
            );
        }
        for note in &diag.notes {
            eprintln!("  {} {stage}: {note}", style("!").yellow());
        }
    }
    if let Some(merge) = &run.merge {
        eprintln!(
            "  Merged {} aliases into canonical names ({} linking pairs)",
            merge.merged,
            run.aliases.linking_pairs()
        );
    }
    for entry in run.census_check.mismatches() {
        eprintln!(
            "  {} census expected {} {}, graph has {}",
            style("!").yellow(),
            entry.expected,
            entry.role,
            entry.observed
        );
    }
    if !run.alias_audit.unmapped.is_empty() {
        eprintln!(
            "  {} {} names missing from alias map",
            style("!").yellow(),
            run.alias_audit.unmapped.len()
        );
    }

    print!("{}", run.quality);
    println!("final triples:");
    for (source, target, predicate) in run.graph.edges() {
        println!("  - {source} --[{predicate}]--> {target}");
    }
}

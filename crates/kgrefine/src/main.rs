mod cli;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            text_file,
            config,
            out,
            summary,
        } => cli::run::run(&text_file, config.as_deref(), out.as_deref(), summary.as_deref()).await,
        Commands::Audit { graph, json } => cli::audit::run(&graph, json),
        Commands::Config { config } => cli::config::run(config.as_deref()),
    }
}

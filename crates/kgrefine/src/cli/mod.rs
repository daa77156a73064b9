pub mod audit;
pub mod config;
pub mod run;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kgrefine_core::Config;

#[derive(Parser)]
#[command(
    name = "kgr",
    about = "Build a canonicalized knowledge graph from text with a language model",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the five-stage pipeline over a text file
    Run {
        /// UTF-8 text to process
        text_file: PathBuf,
        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Write the final graph as node-link JSON
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Write the run summary as JSON
        #[arg(long)]
        summary: Option<PathBuf>,
    },
    /// Print the quality report of a node-link JSON graph
    Audit {
        /// Node-link JSON file
        graph: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the effective configuration
    Config {
        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// File config when given, otherwise defaults; environment overrides apply to both.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Config::from_env().context("invalid configuration from environment"),
    }
}

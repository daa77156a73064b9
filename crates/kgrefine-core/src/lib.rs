pub mod alias;
pub mod census;
pub mod config;
pub mod entity;
pub mod error;
pub mod graph;
pub mod ingest;
pub mod llm;
pub mod pipeline;
pub mod schema;
pub mod triple;

pub use alias::{AliasAudit, AliasMap};
pub use census::{CensusCheck, CensusEntry, CensusPolicy, RoleCensus};
pub use config::{Config, LlmConfig, PipelineConfig, Provider};
pub use entity::{AttributeBag, AttributePolicy, Entity};
pub use error::{Error, Result};
pub use graph::{
    BuildStats, GraphSnapshot, GraphStore, MergeReport, NodeLink, NodeRecord, QualityReport,
    QualityStats,
};
pub use ingest::{Stage, StageDiagnostics, StepLog};
pub use llm::{ChatClient, LanguageModel, LlmError};
pub use pipeline::{HaltReason, PipelineHalt, PipelineOrchestrator, PipelineRun, PipelineState, RunSummary};
pub use schema::Schema;
pub use triple::{FilterReason, Triple};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::state::PipelineState;
use crate::alias::{AliasAudit, AliasMap};
use crate::census::{CensusCheck, RoleCensus};
use crate::entity::Entity;
use crate::graph::{BuildStats, GraphSnapshot, GraphStore, MergeReport, QualityReport};
use crate::ingest::{Stage, StageDiagnostics, StepLog};
use crate::schema::Schema;
use crate::triple::Triple;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    NoCandidateTriples,
    EmptySchema,
    NoRefinedTriples,
}

impl HaltReason {
    /// Why an empty output at `stage` stops the run; `None` for stages whose empty
    /// output the run survives.
    pub fn for_empty_output(stage: Stage) -> Option<Self> {
        match stage {
            Stage::Extraction => Some(Self::NoCandidateTriples),
            Stage::SchemaOptimization => Some(Self::EmptySchema),
            Stage::Refinement => Some(Self::NoRefinedTriples),
            Stage::RoleCensus | Stage::EntityLinking => None,
        }
    }
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoCandidateTriples => f.write_str("extraction produced no candidate triples"),
            Self::EmptySchema => f.write_str("schema optimization returned an empty schema"),
            Self::NoRefinedTriples => f.write_str("refinement produced no valid triples"),
        }
    }
}

/// A fatal stop. No graph is produced; what ran so far is kept for reporting.
#[derive(Debug, Clone, Error)]
#[error("pipeline halted at {stage}: {reason}")]
pub struct PipelineHalt {
    pub stage: Stage,
    /// Last state reached before the halt.
    pub state: PipelineState,
    pub reason: HaltReason,
    pub diagnostics: Vec<StageDiagnostics>,
    pub steps: Vec<StepLog>,
}

/// Everything a completed run produced.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub state: PipelineState,
    pub candidate_entities: IndexMap<String, Entity>,
    pub candidate_triples: Vec<Triple>,
    pub schema: Schema,
    pub refined_triples: Vec<Triple>,
    pub census: RoleCensus,
    pub aliases: AliasMap,
    pub alias_audit: AliasAudit,
    pub census_check: CensusCheck,
    pub diagnostics: Vec<StageDiagnostics>,
    pub build: BuildStats,
    pub before_merge: GraphSnapshot,
    /// `None` when the alias map was empty and no merge ran.
    pub after_merge: Option<GraphSnapshot>,
    pub merge: Option<MergeReport>,
    pub graph: GraphStore,
    pub quality: QualityReport,
    pub steps: Vec<StepLog>,
    pub completed_at: DateTime<Utc>,
}

impl PipelineRun {
    pub fn diagnostics_for(&self, stage: Stage) -> Option<&StageDiagnostics> {
        self.diagnostics.iter().find(|d| d.stage == stage)
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            completed_at: self.completed_at,
            steps: StepsSummary {
                candidates: CandidateCounts {
                    entities: self.candidate_entities.len(),
                    triples: self.candidate_triples.len(),
                },
                schema: self.schema.clone(),
                refined_triples: self.refined_triples.len(),
                analysis: self.census.clone(),
                linking: LinkingSummary {
                    alias_map: self.aliases.clone(),
                    linking_pairs: self.aliases.linking_pairs(),
                },
            },
            final_graph: FinalGraph {
                nodes: self.graph.node_names(),
                edges: self.graph.edge_triples(),
                quality: self.quality.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub completed_at: DateTime<Utc>,
    pub steps: StepsSummary,
    pub final_graph: FinalGraph,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepsSummary {
    pub candidates: CandidateCounts,
    pub schema: Schema,
    pub refined_triples: usize,
    pub analysis: RoleCensus,
    pub linking: LinkingSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateCounts {
    pub entities: usize,
    pub triples: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkingSummary {
    pub alias_map: AliasMap,
    pub linking_pairs: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalGraph {
    pub nodes: Vec<String>,
    pub edges: Vec<Triple>,
    pub quality: QualityReport,
}

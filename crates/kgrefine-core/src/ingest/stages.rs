use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::parser::{self, Extraction, ExtractionParse, ParseStats};
use super::prompts;
use super::refiner::{Refinement, TripleRefiner};
use crate::alias::AliasMap;
use crate::census::RoleCensus;
use crate::llm::LanguageModel;
use crate::schema::Schema;
use crate::triple::Triple;

/// The five model-backed stages, in run order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extraction,
    SchemaOptimization,
    Refinement,
    RoleCensus,
    EntityLinking,
}

impl Stage {
    pub const ALL: [Self; 5] = [
        Self::Extraction,
        Self::SchemaOptimization,
        Self::Refinement,
        Self::RoleCensus,
        Self::EntityLinking,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Extraction => "extraction",
            Self::SchemaOptimization => "schema_optimization",
            Self::Refinement => "refinement",
            Self::RoleCensus => "role_census",
            Self::EntityLinking => "entity_linking",
        }
    }

    /// Human-readable task name used in model call logs.
    pub fn task(&self) -> &'static str {
        match self {
            Self::Extraction => "Candidate Extraction",
            Self::SchemaOptimization => "Schema Optimization",
            Self::Refinement => "Refinement & Relabeling",
            Self::RoleCensus => "Role Census",
            Self::EntityLinking => "Context-Aware Entity Linking",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drop counts and notes for one stage, so callers can assert on them directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDiagnostics {
    pub stage: Stage,
    pub received: usize,
    pub accepted: usize,
    pub dropped: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl StageDiagnostics {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            received: 0,
            accepted: 0,
            dropped: 0,
            notes: Vec::new(),
        }
    }

    fn add(&mut self, stats: &ParseStats) {
        self.received += stats.received;
        self.accepted += stats.accepted;
        self.dropped += stats.dropped;
    }

    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    /// True when the model call itself failed and the stage ran on an empty sentinel.
    pub fn call_failed(&self) -> bool {
        self.notes.iter().any(|n| n.starts_with(CALL_FAILED))
    }
}

const CALL_FAILED: &str = "model call failed";

/// Structured record of one step, kept on the run and logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepLog {
    pub stage: String,
    pub payload: Value,
}

impl StepLog {
    pub fn new(stage: impl Into<String>, payload: Value) -> Self {
        let log = Self {
            stage: stage.into(),
            payload,
        };
        info!(step = %log.stage, "Step recorded");
        debug!(step = %log.stage, payload = %log.payload, "Step payload");
        log
    }
}

#[derive(Debug, Clone)]
pub struct StageOutput<T> {
    pub value: T,
    pub diagnostics: StageDiagnostics,
    pub log: StepLog,
}

/// Runs each stage against a language model. Every call is awaited to
/// completion before the caller can start the next stage.
pub struct StageRunner<'a> {
    model: &'a dyn LanguageModel,
}

impl<'a> StageRunner<'a> {
    pub fn new(model: &'a dyn LanguageModel) -> Self {
        Self { model }
    }

    /// A failed call yields an empty object instead of an error.
    async fn call(&self, stage: Stage, prompt: &str, diagnostics: &mut StageDiagnostics) -> Value {
        match self.model.complete_json(stage.task(), prompt).await {
            Ok(value) => value,
            Err(err) => {
                warn!(stage = %stage, error = %err, "Model call failed, using empty result");
                diagnostics.note(format!("{CALL_FAILED}: {err}"));
                Value::Object(serde_json::Map::new())
            }
        }
    }

    pub async fn extract_candidates(&self, text: &str) -> StageOutput<ExtractionParse> {
        let mut diagnostics = StageDiagnostics::new(Stage::Extraction);
        let prompt = prompts::render(prompts::EXTRACTION, &[("text", text)]);
        let response = self.call(Stage::Extraction, &prompt, &mut diagnostics).await;

        let parsed = parser::parse_extraction(&response);
        if !parsed.well_formed {
            diagnostics.note("extraction response was not an object");
        }
        diagnostics.add(&parsed.entities);
        diagnostics.add(&parsed.relations);
        if parsed.entities.duplicates > 0 {
            diagnostics.note(format!(
                "{} duplicate entity names, last write kept",
                parsed.entities.duplicates
            ));
        }

        let log = StepLog::new(
            "candidates_extraction",
            json!({
                "input_text": text,
                "extracted_entities": parsed.extraction.entities,
                "extracted_triples": parsed.extraction.triples,
                "entity_count": parsed.extraction.entities.len(),
                "triple_count": parsed.extraction.triples.len(),
                "dropped_entities": parsed.entities.dropped,
                "dropped_relations": parsed.relations.dropped,
            }),
        );

        StageOutput {
            value: parsed,
            diagnostics,
            log,
        }
    }

    pub async fn optimize_schema(&self, extraction: &Extraction) -> StageOutput<Option<Schema>> {
        let mut diagnostics = StageDiagnostics::new(Stage::SchemaOptimization);

        let entities = extraction
            .entities
            .values()
            .map(|e| format!("- {} (类型: {})", e.name, e.entity_type))
            .collect::<Vec<_>>()
            .join("\n");
        let relations = extraction
            .triples
            .iter()
            .map(|t| format!("- {} --{}--> {}", t.subject, t.predicate, t.object))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = prompts::render(
            prompts::SCHEMA_OPTIMIZATION,
            &[("entities", &entities), ("relations", &relations)],
        );

        let response = self
            .call(Stage::SchemaOptimization, &prompt, &mut diagnostics)
            .await;
        let (schema, stats) = parser::parse_schema(&response);
        diagnostics.add(&stats);

        let log = StepLog::new(
            "schema_optimization",
            json!({
                "input_entities": extraction.entities,
                "input_relations": extraction.triples,
                "optimized_schema": schema,
            }),
        );

        StageOutput {
            value: schema,
            diagnostics,
            log,
        }
    }

    pub async fn refine_triples(
        &self,
        schema: &Schema,
        candidates: &[Triple],
    ) -> StageOutput<Refinement> {
        let mut diagnostics = StageDiagnostics::new(Stage::Refinement);
        let refiner = TripleRefiner::new(schema);

        let response = match refiner.prompt(candidates) {
            Ok(prompt) => self.call(Stage::Refinement, &prompt, &mut diagnostics).await,
            Err(err) => {
                diagnostics.note(format!("{CALL_FAILED}: could not encode prompt: {err}"));
                Value::Object(serde_json::Map::new())
            }
        };

        let refinement = refiner.accept(candidates, &response);
        diagnostics.add(&refinement.stats);

        let log = StepLog::new(
            "refinement",
            json!({
                "input_triples": candidates,
                "schema_used": schema,
                "valid_refined_triples": refinement.triples,
                "input_count": candidates.len(),
                "output_count": refinement.triples.len(),
                "filtered_count": refinement.stats.dropped,
                "relabeled_count": refinement.relabeled,
            }),
        );

        StageOutput {
            value: refinement,
            diagnostics,
            log,
        }
    }

    pub async fn analyze_roles(&self, text: &str) -> StageOutput<RoleCensus> {
        let mut diagnostics = StageDiagnostics::new(Stage::RoleCensus);
        let prompt = prompts::render(prompts::ROLE_CENSUS, &[("text", text)]);
        let response = self.call(Stage::RoleCensus, &prompt, &mut diagnostics).await;

        let (census, stats) = parser::parse_census(&response);
        diagnostics.add(&stats);

        let log = StepLog::new(
            "role_analysis",
            json!({
                "input_text": text,
                "reasoning": census.reasoning,
                "character_counts": census.counts,
            }),
        );

        StageOutput {
            value: census,
            diagnostics,
            log,
        }
    }

    /// `names` should be every candidate entity name from extraction, not the
    /// refined subset.
    pub async fn link_entities(
        &self,
        names: &[String],
        census: &RoleCensus,
    ) -> StageOutput<AliasMap> {
        let mut diagnostics = StageDiagnostics::new(Stage::EntityLinking);

        let entities = serde_json::to_string(names).unwrap_or_default();
        let analysis = serde_json::to_string_pretty(census).unwrap_or_default();
        let prompt = prompts::render(
            prompts::ENTITY_LINKING,
            &[("character_analysis", &analysis), ("entities", &entities)],
        );

        let response = self
            .call(Stage::EntityLinking, &prompt, &mut diagnostics)
            .await;
        let (aliases, stats) = parser::parse_alias_map(&response);
        diagnostics.add(&stats);

        let log = StepLog::new(
            "entity_linking",
            json!({
                "input_entities": names,
                "character_analysis": census,
                "alias_map": aliases,
                "linking_pairs": aliases.linking_pairs(),
            }),
        );

        StageOutput {
            value: aliases,
            diagnostics,
            log,
        }
    }
}

use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};

use super::report::{HaltReason, PipelineHalt, PipelineRun};
use super::state::PipelineState;
use crate::census::CensusPolicy;
use crate::config::PipelineConfig;
use crate::graph::GraphStore;
use crate::ingest::{Stage, StageDiagnostics, StageOutput, StageRunner, StepLog};
use crate::llm::LanguageModel;

/// Sequences the five stages, then builds, merges and audits the graph.
pub struct PipelineOrchestrator<'a> {
    model: &'a dyn LanguageModel,
    config: PipelineConfig,
}

/// State, diagnostics and step logs accumulated during one run.
#[derive(Default)]
struct Progress {
    state: PipelineState,
    diagnostics: Vec<StageDiagnostics>,
    steps: Vec<StepLog>,
}

impl Progress {
    fn advance(&mut self) {
        if let Some(next) = self.state.next() {
            info!(from = %self.state, to = %next, "Pipeline state");
            self.state = next;
        }
    }

    fn record<T>(&mut self, output: StageOutput<T>) -> T {
        self.diagnostics.push(output.diagnostics);
        self.steps.push(output.log);
        output.value
    }

    /// Halts when `stage` came back empty and its empty output is fatal.
    fn require(&mut self, stage: Stage, empty: bool) -> Result<(), PipelineHalt> {
        if !empty {
            return Ok(());
        }
        let Some(reason) = HaltReason::for_empty_output(stage) else {
            warn!(stage = %stage, "Stage output is empty, continuing");
            return Ok(());
        };
        warn!(stage = %stage, reason = %reason, "Pipeline halted");
        Err(PipelineHalt {
            stage,
            state: self.state,
            reason,
            diagnostics: std::mem::take(&mut self.diagnostics),
            steps: std::mem::take(&mut self.steps),
        })
    }
}

impl<'a> PipelineOrchestrator<'a> {
    pub fn new(model: &'a dyn LanguageModel) -> Self {
        Self {
            model,
            config: PipelineConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub async fn run(&self, text: &str) -> Result<PipelineRun, PipelineHalt> {
        let runner = StageRunner::new(self.model);
        let mut progress = Progress::default();
        info!(chars = text.chars().count(), "Pipeline start");

        let extraction = progress
            .record(runner.extract_candidates(text).await)
            .extraction;
        progress.require(Stage::Extraction, extraction.triples.is_empty())?;
        progress.advance();
        info!(
            entities = extraction.entities.len(),
            triples = extraction.triples.len(),
            "Candidates extracted"
        );

        let schema = progress
            .record(runner.optimize_schema(&extraction).await)
            .unwrap_or_default();
        progress.require(Stage::SchemaOptimization, schema.is_empty())?;
        progress.advance();
        info!(%schema, "Schema optimized");

        let refined = progress
            .record(runner.refine_triples(&schema, &extraction.triples).await)
            .triples;
        progress.require(Stage::Refinement, refined.is_empty())?;
        progress.advance();
        info!(triples = refined.len(), "Triples refined");

        let census = progress.record(runner.analyze_roles(text).await);
        progress.require(Stage::RoleCensus, census.is_empty())?;
        progress.advance();

        let names = extraction.entity_names();
        let aliases = progress.record(runner.link_entities(&names, &census).await);
        progress.require(Stage::EntityLinking, aliases.is_empty())?;
        let alias_audit = aliases.audit(names.iter().map(String::as_str));
        if !alias_audit.is_clean() {
            warn!(
                unmapped = alias_audit.unmapped.len(),
                foreign_targets = alias_audit.foreign_targets.len(),
                non_fixed_points = alias_audit.non_fixed_points.len(),
                "Alias map is not a total idempotent mapping"
            );
        }
        progress.advance();

        let mut graph = GraphStore::new();
        let build = graph.build_with_schema(
            &extraction.entities,
            &refined,
            &schema,
            self.config.attribute_policy,
        );
        let before_merge = graph.snapshot();
        progress.steps.push(StepLog::new(
            "pre_linking_graph_state",
            json!({
                "nodes_before_linking": before_merge.nodes,
                "edges_before_linking": before_merge.edges,
                "quality_before_linking": before_merge.quality,
                "build_stats": build,
            }),
        ));

        let (merge, after_merge) = if aliases.is_empty() {
            (None, None)
        } else {
            let report = graph.apply_alias_map(&aliases);
            let after = graph.snapshot();
            progress.steps.push(StepLog::new(
                "post_linking_graph_state",
                json!({
                    "nodes_after_linking": after.nodes,
                    "edges_after_linking": after.edges,
                    "quality_after_linking": after.quality,
                    "applied_mappings": aliases,
                    "merge": report,
                }),
            ));
            (Some(report), Some(after))
        };
        progress.advance();

        let quality = graph.assess_quality();
        let census_check = census.check(&graph);
        if self.config.census_policy == CensusPolicy::Warn {
            for entry in census_check.mismatches() {
                warn!(
                    role = %entry.role,
                    expected = entry.expected,
                    observed = entry.observed,
                    "Node count differs from role census"
                );
            }
        }
        progress.advance();

        let completed_at = Utc::now();
        progress.advance();

        let mut run = PipelineRun {
            state: progress.state,
            candidate_entities: extraction.entities,
            candidate_triples: extraction.triples,
            schema,
            refined_triples: refined,
            census,
            aliases,
            alias_audit,
            census_check,
            diagnostics: progress.diagnostics,
            build,
            before_merge,
            after_merge,
            merge,
            graph,
            quality,
            steps: progress.steps,
            completed_at,
        };

        let summary = serde_json::to_value(run.summary()).unwrap_or_default();
        run.steps
            .push(StepLog::new("pipeline_final_summary", summary));

        info!(
            nodes = run.graph.node_count(),
            edges = run.graph.edge_count(),
            clean = run.quality.is_clean(),
            "Pipeline complete"
        );
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use serde_json::Value;

    use super::*;
    use crate::entity::AttributePolicy;
    use crate::llm::{LlmError, LlmResult};

    /// Answers each stage by task name; a missing reply is a failed call.
    #[derive(Default)]
    struct ScriptedModel {
        replies: HashMap<&'static str, Value>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn reply(mut self, stage: Stage, value: Value) -> Self {
            self.replies.insert(stage.task(), value);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl LanguageModel for ScriptedModel {
        async fn complete_json(&self, task: &str, _prompt: &str) -> LlmResult<Value> {
            self.calls.lock().unwrap().push(task.to_string());
            self.replies
                .get(task)
                .cloned()
                .ok_or(LlmError::EmptyResponse)
        }
    }

    fn extraction() -> Value {
        json!({
            "entities": [
                {"name": "张三", "type": "人物", "description": "技术总监", "attributes": {"职位": "技术总监"}},
                {"name": "张经理", "type": "人物", "attributes": {"爱好": "跑步"}},
                {"name": "技术团队", "type": "组织"}
            ],
            "relations": [
                {"subject": "张三", "predicate": "负责", "object": "技术团队"},
                {"subject": "张经理", "predicate": "管理", "object": "技术团队"}
            ]
        })
    }

    fn schema() -> Value {
        json!({"entities": ["人物", "组织"], "relations": ["负责", "管理"], "attributes": ["职位"]})
    }

    fn refined() -> Value {
        json!({"refined_triples": [
            {"subject": "张三", "predicate": "负责", "object": "技术团队"},
            {"subject": "张经理", "predicate": "管理", "object": "技术团队"},
            {"subject": "张经理", "object": "技术团队"}
        ]})
    }

    fn full_script() -> ScriptedModel {
        ScriptedModel::default()
            .reply(Stage::Extraction, extraction())
            .reply(Stage::SchemaOptimization, schema())
            .reply(Stage::Refinement, refined())
            .reply(
                Stage::RoleCensus,
                json!({"reasoning": "张经理就是张三", "character_counts": {"人物": 1, "组织": 1}}),
            )
            .reply(
                Stage::EntityLinking,
                json!({"alias_map": {"张三": "张三", "张经理": "张三", "技术团队": "技术团队"}}),
            )
    }

    #[tokio::test]
    async fn test_full_run_merges_aliases() {
        let model = full_script();
        let run = PipelineOrchestrator::new(&model).run("张三负责技术团队。").await.unwrap();

        assert_eq!(run.state, PipelineState::Done);
        assert_eq!(run.before_merge.nodes.len(), 3);
        assert_eq!(run.graph.node_count(), 2);
        assert_eq!(run.graph.edge_count(), 2);
        assert_eq!(run.merge.as_ref().unwrap().merged, 1);
        assert!(run.after_merge.is_some());
        assert!(run.alias_audit.is_clean());
        assert!(run.census_check.is_consistent());
        assert!(run.quality.is_clean());

        let refinement = run.diagnostics_for(Stage::Refinement).unwrap();
        assert_eq!(refinement.dropped, 1);

        let calls: Vec<&str> = Stage::ALL.iter().map(Stage::task).collect();
        assert_eq!(model.calls(), calls);

        let steps: Vec<&str> = run.steps.iter().map(|s| s.stage.as_str()).collect();
        assert_eq!(
            steps,
            [
                "candidates_extraction",
                "schema_optimization",
                "refinement",
                "role_analysis",
                "entity_linking",
                "pre_linking_graph_state",
                "post_linking_graph_state",
                "pipeline_final_summary",
            ]
        );
    }

    #[tokio::test]
    async fn test_merged_node_absorbs_alias_attributes() {
        let model = full_script();
        let run = PipelineOrchestrator::new(&model)
            .with_config(PipelineConfig {
                attribute_policy: AttributePolicy::Overflow,
                ..Default::default()
            })
            .run("文本")
            .await
            .unwrap();

        let zhang = run.graph.node("张三").unwrap();
        assert_eq!(zhang.attributes.known.get("职位").map(String::as_str), Some("技术总监"));
        assert_eq!(zhang.attributes.overflow.get("爱好").map(String::as_str), Some("跑步"));
    }

    #[tokio::test]
    async fn test_halts_without_candidate_triples() {
        let model = ScriptedModel::default()
            .reply(Stage::Extraction, json!({"entities": [{"name": "张三"}], "relations": []}));

        let halt = PipelineOrchestrator::new(&model).run("文本").await.unwrap_err();

        assert_eq!(halt.stage, Stage::Extraction);
        assert_eq!(halt.reason, HaltReason::NoCandidateTriples);
        assert_eq!(halt.state, PipelineState::Init);
        assert_eq!(model.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_extraction_call_is_fatal() {
        let model = ScriptedModel::default();

        let halt = PipelineOrchestrator::new(&model).run("文本").await.unwrap_err();

        assert_eq!(halt.reason, HaltReason::NoCandidateTriples);
        assert!(halt.diagnostics[0].call_failed());
        assert!(halt.to_string().contains("extraction"));
    }

    #[tokio::test]
    async fn test_halts_on_empty_schema() {
        for reply in [json!({}), json!({"entities": [], "relations": [], "attributes": []})] {
            let model = ScriptedModel::default()
                .reply(Stage::Extraction, extraction())
                .reply(Stage::SchemaOptimization, reply);

            let halt = PipelineOrchestrator::new(&model).run("文本").await.unwrap_err();

            assert_eq!(halt.stage, Stage::SchemaOptimization);
            assert_eq!(halt.reason, HaltReason::EmptySchema);
            assert_eq!(halt.state, PipelineState::Extracted);
        }
    }

    #[tokio::test]
    async fn test_halts_without_valid_refined_triples() {
        let model = ScriptedModel::default()
            .reply(Stage::Extraction, extraction())
            .reply(Stage::SchemaOptimization, schema())
            .reply(
                Stage::Refinement,
                json!({"refined_triples": [{"subject": "张三", "object": "技术团队"}]}),
            );

        let halt = PipelineOrchestrator::new(&model).run("文本").await.unwrap_err();

        assert_eq!(halt.reason, HaltReason::NoRefinedTriples);
        assert_eq!(halt.diagnostics[2].dropped, 1);
        assert_eq!(halt.steps.len(), 3);
    }

    #[tokio::test]
    async fn test_census_and_linking_failures_are_not_fatal() {
        let model = ScriptedModel::default()
            .reply(Stage::Extraction, extraction())
            .reply(Stage::SchemaOptimization, schema())
            .reply(Stage::Refinement, refined());

        let run = PipelineOrchestrator::new(&model).run("文本").await.unwrap();

        assert_eq!(run.state, PipelineState::Done);
        assert!(run.census.is_empty());
        assert!(run.aliases.is_empty());
        assert!(run.merge.is_none());
        assert!(run.after_merge.is_none());
        assert_eq!(run.graph.node_count(), 3);
        assert_eq!(run.before_merge.nodes.len(), 3);
        assert_eq!(run.alias_audit.unmapped.len(), 3);
        assert!(run.diagnostics_for(Stage::EntityLinking).unwrap().call_failed());
        assert!(!run.steps.iter().any(|s| s.stage == "post_linking_graph_state"));
    }

    #[tokio::test]
    async fn test_linking_sees_all_candidate_names() {
        let model = ScriptedModel::default()
            .reply(Stage::Extraction, extraction())
            .reply(Stage::SchemaOptimization, schema())
            .reply(
                Stage::Refinement,
                json!({"refined_triples": [{"subject": "张三", "predicate": "负责", "object": "技术团队"}]}),
            );

        let run = PipelineOrchestrator::new(&model).run("文本").await.unwrap();
        let linking = run
            .steps
            .iter()
            .find(|s| s.stage == "entity_linking")
            .unwrap();

        assert_eq!(linking.payload["input_entities"], json!(["张三", "张经理", "技术团队"]));
        // 张经理 has no refined edge but is still a node.
        assert!(run.graph.contains("张经理"));
        assert_eq!(run.graph.isolated_count(), 1);
    }

    #[tokio::test]
    async fn test_summary_counts() {
        let model = full_script();
        let run = PipelineOrchestrator::new(&model).run("文本").await.unwrap();
        let summary = run.summary();

        assert_eq!(summary.steps.candidates.entities, 3);
        assert_eq!(summary.steps.candidates.triples, 2);
        assert_eq!(summary.steps.refined_triples, 2);
        assert_eq!(summary.steps.linking.linking_pairs, 1);
        assert_eq!(summary.final_graph.nodes, vec!["张三".to_string(), "技术团队".to_string()]);
    }
}

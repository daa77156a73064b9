use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::store::GraphStore;

/// Density below this is reported as under-connected.
pub const LOW_DENSITY_THRESHOLD: f64 = 0.1;

pub const EMPTY_GRAPH_ISSUE: &str = "empty graph: no nodes";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isolated_nodes: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub self_loops: Option<usize>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub entity_type_distribution: BTreeMap<String, usize>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relation_type_distribution: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_components: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_density: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
    pub stats: QualityStats,
}

impl QualityReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty() && self.warnings.is_empty()
    }
}

/// Structural diagnostics over the current graph. Read-only.
pub fn assess(graph: &GraphStore) -> QualityReport {
    let mut report = QualityReport {
        total_nodes: graph.node_count(),
        total_edges: graph.edge_count(),
        ..QualityReport::default()
    };

    if report.total_nodes == 0 {
        report.issues.push(EMPTY_GRAPH_ISSUE.to_string());
        return report;
    }

    let isolated = graph.isolated_count();
    if isolated > 0 {
        report
            .issues
            .push(format!("found {isolated} isolated nodes (no connections)"));
        report.stats.isolated_nodes = Some(isolated);
    }

    let self_loops = graph.self_loop_count();
    if self_loops > 0 {
        report
            .warnings
            .push(format!("found {self_loops} self-loop relations"));
        report.stats.self_loops = Some(self_loops);
    }

    for (_, record) in graph.nodes() {
        *report
            .stats
            .entity_type_distribution
            .entry(record.entity_type.clone())
            .or_insert(0) += 1;
    }

    for (_, _, predicate) in graph.edges() {
        *report
            .stats
            .relation_type_distribution
            .entry(predicate.to_string())
            .or_insert(0) += 1;
    }

    let components = graph.weak_component_count();
    if components != 1 {
        report.warnings.push(format!(
            "graph is not weakly connected: {components} components"
        ));
        report.stats.connected_components = Some(components);
    }

    if report.total_nodes > 1 {
        let nodes = report.total_nodes as f64;
        let density = report.total_edges as f64 / (nodes * (nodes - 1.0));
        report.stats.graph_density = Some(round4(density));
        if density < LOW_DENSITY_THRESHOLD {
            report
                .warnings
                .push("low graph density: relations may be under-connected".to_string());
        }
    }

    report
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

impl fmt::Display for QualityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "nodes: {}, edges: {}", self.total_nodes, self.total_edges)?;

        if let Some(density) = self.stats.graph_density {
            writeln!(f, "density: {density}")?;
        }

        if !self.stats.entity_type_distribution.is_empty() {
            writeln!(f, "entity types:")?;
            for (ty, count) in &self.stats.entity_type_distribution {
                writeln!(f, "  - {ty}: {count}")?;
            }
        }

        if !self.stats.relation_type_distribution.is_empty() {
            writeln!(f, "relation types:")?;
            for (predicate, count) in &self.stats.relation_type_distribution {
                writeln!(f, "  - {predicate}: {count}")?;
            }
        }

        if !self.issues.is_empty() {
            writeln!(f, "issues:")?;
            for issue in &self.issues {
                writeln!(f, "  - {issue}")?;
            }
        }

        if !self.warnings.is_empty() {
            writeln!(f, "warnings:")?;
            for warning in &self.warnings {
                writeln!(f, "  - {warning}")?;
            }
        }

        if self.is_clean() {
            writeln!(f, "quality check passed")?;
        }

        Ok(())
    }
}

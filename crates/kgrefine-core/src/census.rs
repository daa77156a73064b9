use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::graph::GraphStore;

/// Per-role-type count of distinct individuals, with the model's reasoning.
/// Guides entity linking; never enforced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCensus {
    #[serde(default)]
    pub reasoning: String,
    #[serde(rename = "character_counts", default)]
    pub counts: BTreeMap<String, u32>,
}

impl RoleCensus {
    #[must_use]
    pub fn new(reasoning: impl Into<String>) -> Self {
        Self {
            reasoning: reasoning.into(),
            counts: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_count(mut self, role: impl Into<String>, count: u32) -> Self {
        self.counts.insert(role.into(), count);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.reasoning.trim().is_empty() && self.counts.is_empty()
    }

    pub fn expected(&self, role: &str) -> Option<u32> {
        self.counts.get(role).copied()
    }

    /// Compares each census count with the number of nodes of that type.
    pub fn check(&self, graph: &GraphStore) -> CensusCheck {
        let mut observed: BTreeMap<&str, u32> = BTreeMap::new();
        for (_, record) in graph.nodes() {
            *observed.entry(record.entity_type.as_str()).or_insert(0) += 1;
        }

        let entries = self
            .counts
            .iter()
            .map(|(role, &expected)| CensusEntry {
                role: role.clone(),
                expected,
                observed: observed.get(role.as_str()).copied().unwrap_or(0),
            })
            .collect();

        CensusCheck { entries }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CensusPolicy {
    /// Record the comparison in diagnostics only.
    #[default]
    Advisory,
    /// Also log a warning for each mismatch.
    Warn,
}

impl std::str::FromStr for CensusPolicy {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "advisory" => Ok(Self::Advisory),
            "warn" => Ok(Self::Warn),
            _ => Err(crate::Error::InvalidCensusPolicy(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CensusEntry {
    pub role: String,
    pub expected: u32,
    pub observed: u32,
}

impl CensusEntry {
    pub fn matches(&self) -> bool {
        self.expected == self.observed
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CensusCheck {
    pub entries: Vec<CensusEntry>,
}

impl CensusCheck {
    pub fn mismatches(&self) -> impl Iterator<Item = &CensusEntry> {
        self.entries.iter().filter(|e| !e.matches())
    }

    pub fn is_consistent(&self) -> bool {
        self.mismatches().next().is_none()
    }
}

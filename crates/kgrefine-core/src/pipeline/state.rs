use serde::{Deserialize, Serialize};

/// Orchestrator states. Transitions only move forward, one step at a time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    #[default]
    Init,
    Extracted,
    SchemaOptimized,
    Refined,
    RoleAnalyzed,
    Linked,
    Built,
    Assessed,
    Done,
}

impl PipelineState {
    /// `None` once the run is done.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Init => Some(Self::Extracted),
            Self::Extracted => Some(Self::SchemaOptimized),
            Self::SchemaOptimized => Some(Self::Refined),
            Self::Refined => Some(Self::RoleAnalyzed),
            Self::RoleAnalyzed => Some(Self::Linked),
            Self::Linked => Some(Self::Built),
            Self::Built => Some(Self::Assessed),
            Self::Assessed => Some(Self::Done),
            Self::Done => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Extracted => "EXTRACTED",
            Self::SchemaOptimized => "SCHEMA_OPTIMIZED",
            Self::Refined => "REFINED",
            Self::RoleAnalyzed => "ROLE_ANALYZED",
            Self::Linked => "LINKED",
            Self::Built => "BUILT",
            Self::Assessed => "ASSESSED",
            Self::Done => "DONE",
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

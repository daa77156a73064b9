mod orchestrator;
mod report;
mod state;

pub use orchestrator::PipelineOrchestrator;
pub use report::{
    CandidateCounts, FinalGraph, HaltReason, LinkingSummary, PipelineHalt, PipelineRun,
    RunSummary, StepsSummary,
};
pub use state::PipelineState;

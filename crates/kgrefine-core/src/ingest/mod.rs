mod parser;
pub mod prompts;
mod refiner;
mod stages;

pub use parser::{
    parse_alias_map, parse_census, parse_extraction, parse_refined, parse_schema, parse_triple,
    Extraction, ExtractionParse, ParseStats,
};
pub use refiner::{Refinement, TripleRefiner};
pub use stages::{Stage, StageDiagnostics, StageOutput, StageRunner, StepLog};

mod export;
mod quality;
mod store;

pub use export::{NodeLink, NodeLinkEdge, NodeLinkNode};
pub use quality::{assess, QualityReport, QualityStats};
pub use store::{BuildStats, GraphSnapshot, GraphStore, MergeReport, NodeRecord};

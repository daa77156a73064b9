use std::collections::HashSet;

use serde_json::Value;

use super::parser::{self, ParseStats};
use super::prompts;
use crate::schema::Schema;
use crate::triple::Triple;

/// Validates and relabels candidate triples against one schema.
///
/// The refiner only checks field presence. Whether a predicate belongs to the
/// relation vocabulary is left to the model; the graph build applies its own
/// filter rule later.
#[derive(Debug, Clone)]
pub struct TripleRefiner<'a> {
    schema: &'a Schema,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Refinement {
    pub triples: Vec<Triple>,
    pub stats: ParseStats,
    /// Output triples whose endpoints match a candidate but whose predicate changed.
    pub relabeled: usize,
}

impl<'a> TripleRefiner<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self { schema }
    }

    pub fn prompt(&self, candidates: &[Triple]) -> serde_json::Result<String> {
        let schema = serde_json::to_string_pretty(self.schema)?;
        let triples = serde_json::to_string_pretty(candidates)?;
        Ok(prompts::render(
            prompts::REFINEMENT,
            &[("schema", &schema), ("triples", &triples)],
        ))
    }

    pub fn accept(&self, candidates: &[Triple], response: &Value) -> Refinement {
        let (triples, stats) = parser::parse_refined(response);

        let originals: HashSet<(&str, &str, &str)> = candidates
            .iter()
            .map(|t| (t.subject.as_str(), t.predicate.as_str(), t.object.as_str()))
            .collect();
        let endpoints: HashSet<(&str, &str)> = candidates
            .iter()
            .map(|t| (t.subject.as_str(), t.object.as_str()))
            .collect();

        let relabeled = triples
            .iter()
            .filter(|t| {
                endpoints.contains(&(t.subject.as_str(), t.object.as_str()))
                    && !originals.contains(&(
                        t.subject.as_str(),
                        t.predicate.as_str(),
                        t.object.as_str(),
                    ))
            })
            .count();

        Refinement {
            triples,
            stats,
            relabeled,
        }
    }
}

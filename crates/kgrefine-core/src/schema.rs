use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Optimized type vocabulary produced once per run. Serializes in the
/// `{entities, relations, attributes}` shape the refinement prompt expects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(rename = "entities", default)]
    pub entity_types: BTreeSet<String>,
    #[serde(rename = "relations", default)]
    pub relation_types: BTreeSet<String>,
    #[serde(rename = "attributes", default)]
    pub attribute_types: BTreeSet<String>,
}

impl Schema {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_entity_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entity_types.extend(types.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_relation_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relation_types.extend(types.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_attribute_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attribute_types.extend(types.into_iter().map(Into::into));
        self
    }

    /// A schema with no vocabulary at all halts the pipeline.
    pub fn is_empty(&self) -> bool {
        self.entity_types.is_empty()
            && self.relation_types.is_empty()
            && self.attribute_types.is_empty()
    }
}

impl std::fmt::Display for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let join = |set: &BTreeSet<String>| set.iter().cloned().collect::<Vec<_>>().join(", ");
        write!(
            f,
            "entities: [{}]; relations: [{}]; attributes: [{}]",
            join(&self.entity_types),
            join(&self.relation_types),
            join(&self.attribute_types)
        )
    }
}

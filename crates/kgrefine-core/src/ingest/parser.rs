use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::alias::AliasMap;
use crate::census::RoleCensus;
use crate::entity::{Entity, UNKNOWN_TYPE};
use crate::schema::Schema;
use crate::triple::Triple;

/// What happened to the records of one raw collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseStats {
    pub received: usize,
    pub accepted: usize,
    pub dropped: usize,
    /// Accepted records that replaced an earlier one with the same key.
    pub duplicates: usize,
}

impl ParseStats {
    fn accept(&mut self) {
        self.received += 1;
        self.accepted += 1;
    }

    fn drop_one(&mut self) {
        self.received += 1;
        self.dropped += 1;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    pub entities: IndexMap<String, Entity>,
    pub triples: Vec<Triple>,
}

impl Extraction {
    pub fn entity_names(&self) -> Vec<String> {
        self.entities.keys().cloned().collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionParse {
    pub extraction: Extraction,
    pub entities: ParseStats,
    pub relations: ParseStats,
    /// False when the response was not an object at all.
    pub well_formed: bool,
}

/// Entities need a string `name`; later duplicates overwrite earlier ones in place.
/// Relations need all three fields.
pub fn parse_extraction(value: &Value) -> ExtractionParse {
    let mut out = ExtractionParse::default();
    let Some(obj) = value.as_object() else {
        return out;
    };
    out.well_formed = true;

    for raw in array_field(obj, "entities") {
        match parse_entity(raw) {
            Some(entity) => {
                out.entities.accept();
                if out
                    .extraction
                    .entities
                    .insert(entity.name.clone(), entity)
                    .is_some()
                {
                    out.entities.duplicates += 1;
                }
            }
            None => out.entities.drop_one(),
        }
    }

    for raw in array_field(obj, "relations") {
        match parse_triple(raw) {
            Some(triple) => {
                out.relations.accept();
                out.extraction.triples.push(triple);
            }
            None => out.relations.drop_one(),
        }
    }

    out
}

fn parse_entity(raw: &Value) -> Option<Entity> {
    let obj = raw.as_object()?;
    let name = scalar_string(obj.get("name")?)?;

    let entity_type = obj
        .get("type")
        .and_then(scalar_string)
        .unwrap_or_else(|| UNKNOWN_TYPE.to_string());
    let description = obj
        .get("description")
        .and_then(scalar_string)
        .unwrap_or_default();

    let attributes = obj
        .get("attributes")
        .and_then(Value::as_object)
        .map(|attrs| {
            attrs
                .iter()
                .filter_map(|(k, v)| attribute_value(v).map(|v| (k.clone(), v)))
                .collect()
        })
        .unwrap_or_default();

    Some(Entity {
        name,
        entity_type,
        description,
        attributes,
    })
}

/// A triple object with `subject`, `predicate` and `object` as scalar values.
pub fn parse_triple(raw: &Value) -> Option<Triple> {
    let obj = raw.as_object()?;
    Some(Triple {
        subject: scalar_string(obj.get("subject")?)?,
        predicate: scalar_string(obj.get("predicate")?)?,
        object: scalar_string(obj.get("object")?)?,
    })
}

/// `None` when the response carries no schema object at all.
pub fn parse_schema(value: &Value) -> (Option<Schema>, ParseStats) {
    let mut stats = ParseStats::default();
    let Some(obj) = value.as_object() else {
        return (None, stats);
    };
    if !["entities", "relations", "attributes"]
        .iter()
        .any(|k| obj.contains_key(*k))
    {
        return (None, stats);
    }

    let mut collect = |key: &str| {
        let mut set = std::collections::BTreeSet::new();
        for raw in array_field(obj, key) {
            match raw.as_str().map(str::trim).filter(|s| !s.is_empty()) {
                Some(s) => {
                    stats.accept();
                    set.insert(s.to_string());
                }
                None => stats.drop_one(),
            }
        }
        set
    };

    let schema = Schema {
        entity_types: collect("entities"),
        relation_types: collect("relations"),
        attribute_types: collect("attributes"),
    };
    (Some(schema), stats)
}

/// Entries of `refined_triples` that carry all three fields after relabeling.
pub fn parse_refined(value: &Value) -> (Vec<Triple>, ParseStats) {
    let mut stats = ParseStats::default();
    let mut triples = Vec::new();

    let Some(obj) = value.as_object() else {
        return (triples, stats);
    };

    for raw in array_field(obj, "refined_triples") {
        match parse_triple(raw) {
            Some(t) => {
                stats.accept();
                triples.push(t);
            }
            None => stats.drop_one(),
        }
    }

    (triples, stats)
}

/// Counts must be non-negative integers; anything else is dropped.
pub fn parse_census(value: &Value) -> (RoleCensus, ParseStats) {
    let mut stats = ParseStats::default();
    let Some(obj) = value.as_object() else {
        return (RoleCensus::default(), stats);
    };

    let reasoning = obj
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut counts = BTreeMap::new();
    if let Some(raw_counts) = obj.get("character_counts").and_then(Value::as_object) {
        for (role, raw) in raw_counts {
            match raw.as_u64().and_then(|n| u32::try_from(n).ok()) {
                Some(n) => {
                    stats.accept();
                    counts.insert(role.clone(), n);
                }
                None => stats.drop_one(),
            }
        }
    }

    (RoleCensus { reasoning, counts }, stats)
}

pub fn parse_alias_map(value: &Value) -> (AliasMap, ParseStats) {
    let mut stats = ParseStats::default();
    let mut map = AliasMap::new();

    let Some(raw) = value
        .as_object()
        .and_then(|o| o.get("alias_map"))
        .and_then(Value::as_object)
    else {
        return (map, stats);
    };

    for (alias, canonical) in raw {
        match canonical.as_str().filter(|c| !c.is_empty()) {
            Some(c) => {
                stats.accept();
                map.insert(alias.clone(), c);
            }
            None => stats.drop_one(),
        }
    }

    (map, stats)
}

fn array_field<'a>(
    obj: &'a serde_json::Map<String, Value>,
    key: &str,
) -> impl Iterator<Item = &'a Value> {
    obj.get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn attribute_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Type assigned when the extractor does not name one.
pub const UNKNOWN_TYPE: &str = "未知";

/// Keys owned by the node record itself; attributes never overwrite them.
pub const RESERVED_KEYS: [&str; 3] = ["id", "type", "description"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Entity {
    #[must_use]
    pub fn new(name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
            description: String::new(),
            attributes: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// What to do with attribute keys outside the optimized attribute vocabulary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributePolicy {
    /// Keep unknown keys in the overflow bag.
    #[default]
    Overflow,
    /// Drop unknown keys and count them.
    Reject,
}

impl AttributePolicy {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overflow => "overflow",
            Self::Reject => "reject",
        }
    }
}

impl std::fmt::Display for AttributePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AttributePolicy {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "overflow" => Ok(Self::Overflow),
            "reject" => Ok(Self::Reject),
            _ => Err(crate::Error::InvalidAttributePolicy(s.to_string())),
        }
    }
}

/// Node attributes split by whether the key belongs to the schema vocabulary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeBag {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub known: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub overflow: BTreeMap<String, String>,
}

impl AttributeBag {
    /// Every key is treated as known.
    #[must_use]
    pub fn unchecked(attributes: &BTreeMap<String, String>) -> Self {
        Self {
            known: attributes.clone(),
            overflow: BTreeMap::new(),
        }
    }

    /// Splits `attributes` against `vocabulary`. Returns the bag and the number of
    /// rejected keys. An empty vocabulary accepts everything.
    #[must_use]
    pub fn validated(
        attributes: &BTreeMap<String, String>,
        vocabulary: &BTreeSet<String>,
        policy: AttributePolicy,
    ) -> (Self, usize) {
        if vocabulary.is_empty() {
            return (Self::unchecked(attributes), 0);
        }

        let mut bag = Self::default();
        let mut rejected = 0;

        for (key, value) in attributes {
            if vocabulary.contains(key) {
                bag.known.insert(key.clone(), value.clone());
            } else {
                match policy {
                    AttributePolicy::Overflow => {
                        bag.overflow.insert(key.clone(), value.clone());
                    }
                    AttributePolicy::Reject => rejected += 1,
                }
            }
        }

        (bag, rejected)
    }

    pub fn len(&self) -> usize {
        self.known.len() + self.overflow.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty() && self.overflow.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.known
            .get(key)
            .or_else(|| self.overflow.get(key))
            .map(String::as_str)
    }

    /// Known entries first, then overflow, skipping reserved keys.
    pub fn flattened(&self) -> impl Iterator<Item = (&str, &str)> {
        self.known
            .iter()
            .chain(self.overflow.iter())
            .filter(|(k, _)| !RESERVED_KEYS.contains(&k.as_str()))
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

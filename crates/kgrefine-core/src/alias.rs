use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Alias → canonical name mapping returned by entity linking.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AliasMap(BTreeMap<String, String>);

impl AliasMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, alias: impl Into<String>, canonical: impl Into<String>) {
        self.0.insert(alias.into(), canonical.into());
    }

    pub fn get(&self, alias: &str) -> Option<&str> {
        self.0.get(alias).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(a, c)| (a.as_str(), c.as_str()))
    }

    /// Entries that actually rename something.
    pub fn linking_pairs(&self) -> usize {
        self.0.iter().filter(|(a, c)| a != c).count()
    }

    /// Checks totality and idempotence against the name set linking was asked about.
    /// Nothing is corrected; the findings are diagnostics only.
    pub fn audit<'a, I>(&self, names: I) -> AliasAudit
    where
        I: IntoIterator<Item = &'a str>,
    {
        let names: BTreeSet<&str> = names.into_iter().collect();
        let mut audit = AliasAudit::default();

        for name in &names {
            if !self.0.contains_key(*name) {
                audit.unmapped.push((*name).to_string());
            }
        }

        for (alias, canonical) in &self.0 {
            if !names.contains(canonical.as_str()) {
                audit.foreign_targets.push(canonical.clone());
            }
            if !names.contains(alias.as_str()) {
                audit.foreign_aliases.push(alias.clone());
            }
            if let Some(next) = self.0.get(canonical) {
                if next != canonical {
                    audit.non_fixed_points.push(alias.clone());
                }
            }
        }

        audit.foreign_targets.sort();
        audit.foreign_targets.dedup();
        audit
    }
}

impl FromIterator<(String, String)> for AliasMap {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<BTreeMap<String, String>> for AliasMap {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasAudit {
    /// Candidate names the map says nothing about; they stay unmerged.
    pub unmapped: Vec<String>,
    /// Canonical values that are not candidate names.
    pub foreign_targets: Vec<String>,
    /// Keys that are not candidate names.
    pub foreign_aliases: Vec<String>,
    /// Aliases whose canonical is itself remapped (`map[map[x]] != map[x]`).
    pub non_fixed_points: Vec<String>,
}

impl AliasAudit {
    pub fn is_total(&self) -> bool {
        self.unmapped.is_empty()
    }

    pub fn is_idempotent(&self) -> bool {
        self.non_fixed_points.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        self.is_total()
            && self.is_idempotent()
            && self.foreign_targets.is_empty()
            && self.foreign_aliases.is_empty()
    }
}

use std::collections::{BTreeMap, HashMap};

use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use super::export::{NodeLink, NodeLinkEdge, NodeLinkNode};
use super::quality::{self, QualityReport};
use crate::alias::AliasMap;
use crate::entity::{AttributeBag, AttributePolicy, Entity, UNKNOWN_TYPE};
use crate::schema::Schema;
use crate::triple::{FilterReason, Triple};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub description: String,
    pub attributes: AttributeBag,
}

impl NodeRecord {
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            entity_type: UNKNOWN_TYPE.to_string(),
            description: String::new(),
            attributes: AttributeBag::default(),
        }
    }

    fn from_entity(entity: &Entity, attributes: AttributeBag) -> Self {
        Self {
            entity_type: entity.entity_type.clone(),
            description: entity.description.clone(),
            attributes,
        }
    }

    /// Fills gaps from `other` without overwriting anything already set.
    fn absorb(&mut self, other: &Self) {
        if self.description.is_empty() {
            self.description.clone_from(&other.description);
        }
        for (k, v) in &other.attributes.known {
            if self.attributes.get(k).is_none() {
                self.attributes.known.insert(k.clone(), v.clone());
            }
        }
        for (k, v) in &other.attributes.overflow {
            if self.attributes.get(k).is_none() {
                self.attributes.overflow.insert(k.clone(), v.clone());
            }
        }
    }
}

#[derive(Debug, Clone)]
struct GraphNode {
    name: String,
    record: NodeRecord,
}

/// Counts from one `build` call; every dropped triple lands in exactly one bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStats {
    pub nodes: usize,
    pub edges_added: usize,
    pub missing_field: usize,
    pub self_loops: usize,
    pub copula: usize,
    pub short_predicate: usize,
    pub unknown_endpoint: usize,
    pub rejected_attributes: usize,
}

impl BuildStats {
    fn record_drop(&mut self, reason: FilterReason) {
        match reason {
            FilterReason::MissingField => self.missing_field += 1,
            FilterReason::SelfLoop => self.self_loops += 1,
            FilterReason::Copula => self.copula += 1,
            FilterReason::ShortPredicate => self.short_predicate += 1,
            FilterReason::UnknownEndpoint => self.unknown_endpoint += 1,
        }
    }

    pub fn dropped(&self) -> usize {
        self.missing_field + self.self_loops + self.copula + self.short_predicate + self.unknown_endpoint
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    /// Alias nodes that no longer exist under their own name.
    pub merged: usize,
    /// Canonical names that were not nodes before the merge.
    pub created: usize,
    /// `(alias, root)` for every merged-away node, in graph order.
    pub renamed: Vec<(String, String)>,
}

/// Read-only copy of the graph for before/after comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<String>,
    pub edges: Vec<Triple>,
    pub quality: QualityReport,
}

/// Directed multigraph keyed by canonical entity name.
#[derive(Debug, Clone, Default)]
pub struct GraphStore {
    graph: DiGraph<GraphNode, String>,
    index: HashMap<String, NodeIndex>,
}

impl GraphStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds every entity as a node, then an edge for each triple that survives the
    /// filter rule and whose endpoints are both entities.
    pub fn build(&mut self, entities: &IndexMap<String, Entity>, triples: &[Triple]) -> BuildStats {
        self.build_nodes(entities, |entity| (AttributeBag::unchecked(&entity.attributes), 0));
        self.build_edges(entities, triples)
    }

    /// Like [`GraphStore::build`] but splits attributes against the schema vocabulary.
    pub fn build_with_schema(
        &mut self,
        entities: &IndexMap<String, Entity>,
        triples: &[Triple],
        schema: &Schema,
        policy: AttributePolicy,
    ) -> BuildStats {
        let rejected = self.build_nodes(entities, |entity| {
            AttributeBag::validated(&entity.attributes, &schema.attribute_types, policy)
        });
        let mut stats = self.build_edges(entities, triples);
        stats.rejected_attributes = rejected;
        stats
    }

    /// Nodes come from the triples themselves, every one typed as unknown.
    pub fn build_from_triples(&mut self, triples: &[Triple]) -> BuildStats {
        let mut stats = BuildStats::default();

        for triple in triples {
            if let Some(reason) = triple.filter_reason() {
                stats.record_drop(reason);
                continue;
            }
            let source = self.ensure_node(&triple.subject);
            let target = self.ensure_node(&triple.object);
            self.graph.add_edge(source, target, triple.predicate.clone());
            stats.edges_added += 1;
        }

        stats.nodes = self.node_count();
        stats
    }

    fn build_nodes<F>(&mut self, entities: &IndexMap<String, Entity>, mut attributes: F) -> usize
    where
        F: FnMut(&Entity) -> (AttributeBag, usize),
    {
        let mut rejected = 0;
        for (name, entity) in entities {
            let (bag, dropped) = attributes(entity);
            rejected += dropped;
            self.upsert_node(name, NodeRecord::from_entity(entity, bag));
        }
        rejected
    }

    fn build_edges(&mut self, entities: &IndexMap<String, Entity>, triples: &[Triple]) -> BuildStats {
        let mut stats = BuildStats::default();

        for triple in triples {
            if let Some(reason) = triple.filter_reason() {
                stats.record_drop(reason);
                continue;
            }
            if !entities.contains_key(&triple.subject) || !entities.contains_key(&triple.object) {
                stats.record_drop(FilterReason::UnknownEndpoint);
                continue;
            }
            let (Some(&source), Some(&target)) =
                (self.index.get(&triple.subject), self.index.get(&triple.object))
            else {
                stats.record_drop(FilterReason::UnknownEndpoint);
                continue;
            };
            self.graph.add_edge(source, target, triple.predicate.clone());
            stats.edges_added += 1;
        }

        stats.nodes = self.node_count();
        tracing::debug!(
            nodes = stats.nodes,
            edges = stats.edges_added,
            dropped = stats.dropped(),
            "Graph built"
        );
        stats
    }

    fn upsert_node(&mut self, name: &str, record: NodeRecord) -> NodeIndex {
        if let Some(&idx) = self.index.get(name) {
            self.graph[idx].record = record;
            return idx;
        }
        let idx = self.graph.add_node(GraphNode {
            name: name.to_string(),
            record,
        });
        self.index.insert(name.to_string(), idx);
        idx
    }

    fn ensure_node(&mut self, name: &str) -> NodeIndex {
        match self.index.get(name) {
            Some(&idx) => idx,
            None => self.upsert_node(name, NodeRecord::unknown()),
        }
    }

    /// Renames alias nodes onto their canonical roots and reattaches every incident
    /// edge. Edge multiplicity is preserved and self-loops produced by a merge stay.
    ///
    /// A canonical node that already exists keeps its own type and description; an
    /// alias only fills in an empty description and attribute keys it lacks.
    pub fn apply_alias_map(&mut self, aliases: &AliasMap) -> MergeReport {
        let table = self.resolution_table(aliases);
        let mut report = MergeReport::default();

        // Root order follows the first graph position that resolves to it.
        let mut roots: IndexMap<String, Option<NodeRecord>> = IndexMap::new();
        for idx in self.graph.node_indices() {
            let node = &self.graph[idx];
            let root = table.get(&node.name).unwrap_or(&node.name);
            roots.entry(root.clone()).or_insert(None);
        }

        // Surviving canonical nodes keep their own record.
        for idx in self.graph.node_indices() {
            let node = &self.graph[idx];
            if table.get(&node.name).is_none_or(|root| root == &node.name) {
                roots.insert(node.name.clone(), Some(node.record.clone()));
            }
        }

        for idx in self.graph.node_indices() {
            let node = &self.graph[idx];
            let Some(root) = table.get(&node.name).filter(|root| *root != &node.name) else {
                continue;
            };
            report.merged += 1;
            report.renamed.push((node.name.clone(), root.clone()));

            match roots.get_mut(root) {
                Some(Some(existing)) => existing.absorb(&node.record),
                Some(slot) => {
                    report.created += 1;
                    *slot = Some(node.record.clone());
                }
                None => {}
            }
        }

        let mut rebuilt: DiGraph<GraphNode, String> = DiGraph::with_capacity(roots.len(), self.graph.edge_count());
        let mut index = HashMap::with_capacity(roots.len());
        for (name, record) in roots {
            let idx = rebuilt.add_node(GraphNode {
                name: name.clone(),
                record: record.unwrap_or_else(NodeRecord::unknown),
            });
            index.insert(name, idx);
        }

        for edge in self.graph.edge_references() {
            let source = &self.graph[edge.source()].name;
            let target = &self.graph[edge.target()].name;
            let source = table.get(source).unwrap_or(source);
            let target = table.get(target).unwrap_or(target);
            if let (Some(&s), Some(&t)) = (index.get(source), index.get(target)) {
                rebuilt.add_edge(s, t, edge.weight().clone());
            }
        }

        self.graph = rebuilt;
        self.index = index;

        tracing::info!(
            merged = report.merged,
            created = report.created,
            nodes = self.node_count(),
            edges = self.edge_count(),
            "Applied alias map"
        );
        report
    }

    /// Maps every node name to its root by following alias chains. A chain that
    /// loops resolves to the smallest name on the loop.
    fn resolution_table(&self, aliases: &AliasMap) -> HashMap<String, String> {
        let mut table = HashMap::with_capacity(self.graph.node_count());

        for idx in self.graph.node_indices() {
            let name = &self.graph[idx].name;
            table.insert(name.clone(), resolve_root(name, aliases));
        }

        table
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn node(&self, name: &str) -> Option<&NodeRecord> {
        self.index.get(name).map(|&idx| &self.graph[idx].record)
    }

    /// Node names with their records, in graph order.
    pub fn nodes(&self) -> impl Iterator<Item = (&str, &NodeRecord)> {
        self.graph
            .node_indices()
            .map(|idx| (self.graph[idx].name.as_str(), &self.graph[idx].record))
    }

    pub fn node_names(&self) -> Vec<String> {
        self.nodes().map(|(name, _)| name.to_string()).collect()
    }

    /// Edges as `(source, target, predicate)` in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.graph.edge_references().map(|edge| {
            (
                self.graph[edge.source()].name.as_str(),
                self.graph[edge.target()].name.as_str(),
                edge.weight().as_str(),
            )
        })
    }

    pub fn edge_triples(&self) -> Vec<Triple> {
        self.edges()
            .map(|(s, t, p)| Triple::new(s, p, t))
            .collect()
    }

    pub fn assess_quality(&self) -> QualityReport {
        quality::assess(self)
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.node_names(),
            edges: self.edge_triples(),
            quality: self.assess_quality(),
        }
    }

    /// Weakly connected components; edge direction is ignored.
    pub fn weak_component_count(&self) -> usize {
        petgraph::algo::connected_components(&self.graph)
    }

    pub fn self_loop_count(&self) -> usize {
        self.graph
            .edge_references()
            .filter(|edge| edge.source() == edge.target())
            .count()
    }

    pub fn isolated_count(&self) -> usize {
        self.graph
            .node_indices()
            .filter(|&idx| self.graph.neighbors_undirected(idx).next().is_none())
            .count()
    }

    pub fn to_node_link(&self) -> NodeLink {
        let nodes = self
            .nodes()
            .map(|(name, record)| NodeLinkNode {
                id: name.to_string(),
                node_type: record.entity_type.clone(),
                description: record.description.clone(),
                attributes: record
                    .attributes
                    .flattened()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            })
            .collect();

        let links = self
            .edges()
            .map(|(source, target, predicate)| NodeLinkEdge {
                source: source.to_string(),
                target: target.to_string(),
                predicate: predicate.to_string(),
            })
            .collect();

        NodeLink { nodes, links }
    }

    /// Loads an exported graph without re-applying the build filter. Links that
    /// reference missing nodes are skipped.
    #[must_use]
    pub fn from_node_link(data: &NodeLink) -> Self {
        let mut store = Self::new();

        for node in &data.nodes {
            let attributes: BTreeMap<String, String> = node
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            store.upsert_node(
                &node.id,
                NodeRecord {
                    entity_type: node.node_type.clone(),
                    description: node.description.clone(),
                    attributes: AttributeBag::unchecked(&attributes),
                },
            );
        }

        for link in &data.links {
            let (Some(&s), Some(&t)) = (store.index.get(&link.source), store.index.get(&link.target))
            else {
                tracing::warn!(source = %link.source, target = %link.target, "Skipping link to unknown node");
                continue;
            };
            store.graph.add_edge(s, t, link.predicate.clone());
        }

        store
    }
}

impl PartialEq for GraphStore {
    fn eq(&self, other: &Self) -> bool {
        self.nodes().eq(other.nodes()) && self.edges().eq(other.edges())
    }
}

fn resolve_root(name: &str, aliases: &AliasMap) -> String {
    let mut current = name.to_string();
    let mut seen: Vec<String> = Vec::new();

    while let Some(next) = aliases.get(&current) {
        if next == current {
            break;
        }
        if let Some(pos) = seen.iter().position(|n| n == next) {
            let mut looped = seen.split_off(pos);
            looped.push(current);
            return looped.into_iter().min().unwrap_or_default();
        }
        let next = next.to_string();
        seen.push(std::mem::replace(&mut current, next));
    }

    current
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entities(list: &[(&str, &str)]) -> IndexMap<String, Entity> {
        list.iter()
            .map(|(name, ty)| ((*name).to_string(), Entity::new(*name, *ty)))
            .collect()
    }

    fn aliases(pairs: &[(&str, &str)]) -> AliasMap {
        pairs.iter().map(|(a, c)| ((*a).to_string(), (*c).to_string())).collect()
    }

    #[test]
    fn test_build_single_relation() {
        let mut store = GraphStore::new();
        let stats = store.build(
            &entities(&[("张三", "Person"), ("技术团队", "Organization")]),
            &[Triple::new("张三", "负责", "技术团队")],
        );

        assert_eq!(store.node_count(), 2);
        assert_eq!(store.edge_count(), 1);
        assert_eq!(stats.edges_added, 1);
        assert_eq!(stats.dropped(), 0);
        assert_eq!(store.edges().next(), Some(("张三", "技术团队", "负责")));
    }

    #[test]
    fn test_build_drops_filtered_and_unknown() {
        let mut store = GraphStore::new();
        let stats = store.build(
            &entities(&[("A", "X"), ("B", "X")]),
            &[
                Triple::new("A", "认识", "A"),
                Triple::new("A", "is", "B"),
                Triple::new("A", "管", "B"),
                Triple::new("A", "", "B"),
                Triple::new("A", "位于", "北京"),
                Triple::new("A", "认识", "B"),
            ],
        );

        assert_eq!(store.edge_count(), 1);
        assert_eq!(stats.self_loops, 1);
        assert_eq!(stats.copula, 1);
        assert_eq!(stats.short_predicate, 1);
        assert_eq!(stats.missing_field, 1);
        assert_eq!(stats.unknown_endpoint, 1);
        assert!(!store.contains("北京"));
    }

    #[test]
    fn test_parallel_and_duplicate_edges_are_kept() {
        let mut store = GraphStore::new();
        store.build(
            &entities(&[("A", "X"), ("B", "X")]),
            &[
                Triple::new("A", "认识", "B"),
                Triple::new("A", "雇佣", "B"),
                Triple::new("A", "认识", "B"),
            ],
        );

        assert_eq!(store.edge_count(), 3);
    }

    #[test]
    fn test_build_with_schema_splits_attributes() {
        let mut ents = IndexMap::new();
        ents.insert(
            "库克".to_string(),
            Entity::new("库克", "人物")
                .with_attribute("职位", "CEO")
                .with_attribute("心情", "满意"),
        );
        let schema = Schema::new().with_attribute_types(["职位"]);

        let mut store = GraphStore::new();
        let stats = store.build_with_schema(&ents, &[], &schema, AttributePolicy::Reject);
        let node = store.node("库克").unwrap();

        assert_eq!(stats.rejected_attributes, 1);
        assert_eq!(node.attributes.get("职位"), Some("CEO"));
        assert_eq!(node.attributes.get("心情"), None);
    }

    #[test]
    fn test_build_from_triples_creates_unknown_nodes() {
        let mut store = GraphStore::new();
        let stats = store.build_from_triples(&[
            Triple::new("苹果公司", "发布", "iPhone 15"),
            Triple::new("iPhone 15", "是", "手机"),
        ]);

        assert_eq!(store.node_count(), 2);
        assert_eq!(stats.copula, 1);
        assert_eq!(store.node("苹果公司").unwrap().entity_type, UNKNOWN_TYPE);
    }

    #[test]
    fn test_merge_disconnected_aliases() {
        let mut store = GraphStore::new();
        store.build(&entities(&[("张三", "Person"), ("张经理", "Person")]), &[]);

        let report = store.apply_alias_map(&aliases(&[("张经理", "张三")]));

        assert_eq!(report.merged, 1);
        assert_eq!(store.node_names(), vec!["张三".to_string()]);
        assert_eq!(store.edge_count(), 0);
    }

    #[test]
    fn test_merge_produces_unfiltered_self_loop() {
        let mut store = GraphStore::new();
        store.build(
            &entities(&[("库克", "人物"), ("蒂姆·库克", "人物")]),
            &[
                Triple::new("库克", "就是", "蒂姆·库克"),
                Triple::new("蒂姆·库克", "称为", "库克"),
            ],
        );

        store.apply_alias_map(&aliases(&[("库克", "蒂姆·库克")]));

        assert_eq!(store.node_count(), 1);
        assert_eq!(store.edge_count(), 2);
        assert!(store.edges().all(|(s, t, _)| s == t));
        assert_eq!(store.assess_quality().stats.self_loops, Some(2));
    }

    #[test]
    fn test_merge_reattaches_incoming_and_outgoing() {
        let mut store = GraphStore::new();
        store.build(
            &entities(&[("苹果", "组织"), ("苹果公司", "组织"), ("库克", "人物"), ("纳斯达克", "组织")]),
            &[
                Triple::new("库克", "领导", "苹果"),
                Triple::new("苹果", "上市于", "纳斯达克"),
            ],
        );

        store.apply_alias_map(&aliases(&[("苹果", "苹果公司"), ("苹果公司", "苹果公司")]));

        let edges: Vec<_> = store.edges().collect();
        assert_eq!(
            edges,
            vec![("库克", "苹果公司", "领导"), ("苹果公司", "纳斯达克", "上市于")]
        );
        assert!(!store.contains("苹果"));
    }

    #[test]
    fn test_merge_creates_missing_canonical() {
        let mut store = GraphStore::new();
        let mut ents = entities(&[("库克", "人物"), ("苹果", "组织")]);
        ents.insert("库克".into(), Entity::new("库克", "人物").with_description("CEO"));
        store.build(&ents, &[Triple::new("库克", "领导", "苹果")]);

        let report = store.apply_alias_map(&aliases(&[("库克", "蒂姆·库克")]));

        assert_eq!(report.created, 1);
        assert_eq!(store.node("蒂姆·库克").unwrap().description, "CEO");
        assert_eq!(store.edges().next(), Some(("蒂姆·库克", "苹果", "领导")));
    }

    #[test]
    fn test_canonical_keeps_record_and_absorbs_gaps() {
        let mut ents = IndexMap::new();
        ents.insert("张三".to_string(), Entity::new("张三", "Person").with_attribute("年龄", "30"));
        ents.insert(
            "张经理".to_string(),
            Entity::new("张经理", "Role")
                .with_description("经理")
                .with_attribute("年龄", "99")
                .with_attribute("职位", "经理"),
        );
        let mut store = GraphStore::new();
        store.build(&ents, &[]);

        store.apply_alias_map(&aliases(&[("张经理", "张三")]));
        let node = store.node("张三").unwrap();

        assert_eq!(node.entity_type, "Person");
        assert_eq!(node.description, "经理");
        assert_eq!(node.attributes.get("年龄"), Some("30"));
        assert_eq!(node.attributes.get("职位"), Some("经理"));
    }

    #[test]
    fn test_chained_aliases_resolve_to_root() {
        let mut store = GraphStore::new();
        store.build(
            &entities(&[("A", "X"), ("B", "X"), ("C", "X"), ("D", "X")]),
            &[Triple::new("A", "认识", "D")],
        );

        store.apply_alias_map(&aliases(&[("A", "B"), ("B", "C")]));

        assert_eq!(store.node_names(), vec!["C".to_string(), "D".to_string()]);
        assert_eq!(store.edges().next(), Some(("C", "D", "认识")));
    }

    #[test]
    fn test_alias_cycle_resolves_deterministically() {
        let mut store = GraphStore::new();
        store.build(&entities(&[("B", "X"), ("A", "X")]), &[Triple::new("A", "认识", "B")]);

        store.apply_alias_map(&aliases(&[("A", "B"), ("B", "A")]));

        assert_eq!(store.node_names(), vec!["A".to_string()]);
        assert_eq!(store.edge_count(), 1);
    }

    #[test]
    fn test_names_absent_from_map_stay() {
        let mut store = GraphStore::new();
        store.build(&entities(&[("A", "X"), ("B", "X"), ("C", "X")]), &[]);

        store.apply_alias_map(&aliases(&[("A", "B")]));

        assert_eq!(store.node_names(), vec!["B".to_string(), "C".to_string()]);
    }

    #[test]
    fn test_node_link_export_shape() {
        let mut ents = IndexMap::new();
        ents.insert(
            "iPhone 15".to_string(),
            Entity::new("iPhone 15", "产品")
                .with_description("智能手机")
                .with_attribute("芯片", "A17"),
        );
        ents.insert("苹果公司".to_string(), Entity::new("苹果公司", "组织"));
        let mut store = GraphStore::new();
        store.build(&ents, &[Triple::new("苹果公司", "发布", "iPhone 15")]);

        let json = serde_json::to_value(store.to_node_link()).unwrap();

        assert_eq!(json["nodes"][0]["id"], "iPhone 15");
        assert_eq!(json["nodes"][0]["type"], "产品");
        assert_eq!(json["nodes"][0]["description"], "智能手机");
        assert_eq!(json["nodes"][0]["芯片"], "A17");
        assert_eq!(json["links"][0]["source"], "苹果公司");
        assert_eq!(json["links"][0]["target"], "iPhone 15");
        assert_eq!(json["links"][0]["predicate"], "发布");
    }

    #[test]
    fn test_from_node_link_restores_graph() {
        let mut store = GraphStore::new();
        store.build(
            &entities(&[("A", "X"), ("B", "Y")]),
            &[Triple::new("A", "认识", "B"), Triple::new("B", "认识", "A")],
        );

        let restored = GraphStore::from_node_link(&store.to_node_link());

        assert_eq!(restored, store);
    }
}

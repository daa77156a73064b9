use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Node-link form of a graph: `{nodes: [{id, type, description, ...}], links: [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLink {
    pub nodes: Vec<NodeLinkNode>,
    pub links: Vec<NodeLinkEdge>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLinkNode {
    pub id: String,
    #[serde(rename = "type", default = "unknown_type")]
    pub node_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(flatten)]
    pub attributes: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLinkEdge {
    pub source: String,
    pub target: String,
    pub predicate: String,
}

fn unknown_type() -> String {
    crate::entity::UNKNOWN_TYPE.to_string()
}

impl NodeLink {
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_pretty(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

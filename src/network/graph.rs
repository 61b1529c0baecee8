//! Flow graph with dense integer node labels

use super::{NetworkError, NetworkResult};
use crate::flow::NodeKind;
use crate::reference::NodeLabel;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

/// Typed attribute values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl AttrValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttrValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Float(f) => Some(*f),
            AttrValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        AttrValue::Int(i)
    }
}

impl TryFrom<u64> for AttrValue {
    type Error = NetworkError;

    fn try_from(i: u64) -> NetworkResult<Self> {
        i64::try_from(i)
            .map(AttrValue::Int)
            .map_err(|_| NetworkError::IntegerOverflow(i.to_string()))
    }
}

impl TryFrom<usize> for AttrValue {
    type Error = NetworkError;

    fn try_from(i: usize) -> NetworkResult<Self> {
        i64::try_from(i)
            .map(AttrValue::Int)
            .map_err(|_| NetworkError::IntegerOverflow(i.to_string()))
    }
}

impl From<f64> for AttrValue {
    fn from(f: f64) -> Self {
        AttrValue::Float(f)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Text(s)
    }
}

/// Attribute collection, kept in key order so output is stable
pub type Attributes = BTreeMap<String, AttrValue>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphNode {
    pub id: NodeLabel,
    #[serde(skip)]
    pub kind: NodeKind,
    #[serde(flatten)]
    pub attributes: Attributes,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphEdge {
    pub source: NodeLabel,
    pub target: NodeLabel,
    #[serde(flatten)]
    pub attributes: Attributes,
}

impl GraphEdge {
    pub fn attribute(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }
}

/// A directed or undirected graph over labels `0..node_count()`
#[derive(Debug, Clone, Default, Serialize)]
pub struct FlowGraph {
    pub directed: bool,
    #[serde(rename = "graph")]
    pub attributes: Attributes,
    nodes: Vec<GraphNode>,
    #[serde(rename = "links")]
    edges: Vec<GraphEdge>,
    #[serde(skip)]
    labels: HashMap<(NodeKind, String), NodeLabel>,
    #[serde(skip)]
    pairs: HashSet<(NodeLabel, NodeLabel)>,
}

impl FlowGraph {
    pub fn new(directed: bool) -> Self {
        Self { directed, ..Default::default() }
    }

    // === Nodes ===

    /// Append a node and return its label, the next integer in sequence.
    ///
    /// A code seen before for the same kind keeps resolving to its first
    /// node.
    pub fn add_node(&mut self, kind: NodeKind, code: &str, mut attributes: Attributes) -> NodeLabel {
        let label = NodeLabel(self.nodes.len());
        attributes.insert("code".into(), code.into());
        attributes.insert("type".into(), kind.name().into());
        self.labels.entry((kind, code.to_string())).or_insert(label);
        self.nodes.push(GraphNode { id: label, kind, attributes });
        label
    }

    pub fn label_of(&self, kind: NodeKind, code: &str) -> Option<NodeLabel> {
        self.labels.get(&(kind, code.to_string())).copied()
    }

    pub fn node(&self, label: NodeLabel) -> Option<&GraphNode> {
        self.nodes.get(label.index())
    }

    pub fn nodes(&self) -> &[GraphNode] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    // === Edges ===

    /// Add an edge between existing labels. A pair may carry one edge;
    /// undirected graphs treat both orientations as the same pair.
    pub fn add_edge(
        &mut self,
        source: NodeLabel,
        target: NodeLabel,
        attributes: Attributes,
    ) -> NetworkResult<()> {
        for label in [source, target] {
            if label.index() >= self.nodes.len() {
                return Err(NetworkError::LabelOutOfRange { label, count: self.nodes.len() });
            }
        }
        if !self.pairs.insert(self.pair(source, target)) {
            return Err(NetworkError::DuplicateEdge { from: source, to: target });
        }
        self.edges.push(GraphEdge { source, target, attributes });
        Ok(())
    }

    pub fn edge(&self, source: NodeLabel, target: NodeLabel) -> Option<&GraphEdge> {
        let wanted = self.pair(source, target);
        self.edges.iter().find(|e| self.pair(e.source, e.target) == wanted)
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    fn pair(&self, source: NodeLabel, target: NodeLabel) -> (NodeLabel, NodeLabel) {
        if self.directed || source <= target {
            (source, target)
        } else {
            (target, source)
        }
    }

    // === Output ===

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<AttrValue>) {
        self.attributes.insert(key.into(), value.into());
    }

    /// Node-link JSON: `directed`, `graph`, `nodes`, `links`
    pub fn to_json(&self) -> NetworkResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> NetworkResult<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

//! Work graph model and dependency-closure extraction.
//!
//! A [`WorkGraph`] mirrors the engine's API-format prompt: a JSON object
//! keyed by node id, where each node carries its `class_type` and an
//! `inputs` map. An input is either a literal value or a link
//! `["<producer id>", <output slot>]` to another node's output.
//!
//! [`WorkGraph::closure`] computes the minimal sub-graph needed to produce
//! a set of output nodes; that sub-graph is what gets submitted per group.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::NodeId;

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// Reference to an output slot of a producer node.
///
/// Encoded on the wire as a two-element array: `["4", 0]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLink(pub NodeId, pub u32);

impl NodeLink {
    /// Id of the node producing the value.
    pub fn producer(&self) -> &str {
        &self.0
    }

    /// Output slot index on the producer.
    pub fn slot(&self) -> u32 {
        self.1
    }
}

/// A single node input: either wired to another node or a literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Link(NodeLink),
    Literal(serde_json::Value),
}

impl InputValue {
    /// The linked producer, if this input is a link.
    pub fn as_link(&self) -> Option<&NodeLink> {
        match self {
            InputValue::Link(link) => Some(link),
            InputValue::Literal(_) => None,
        }
    }
}

impl From<serde_json::Value> for InputValue {
    fn from(value: serde_json::Value) -> Self {
        InputValue::Literal(value)
    }
}

/// One node of the work graph.
///
/// Fields other than `class_type` and `inputs` (e.g. `_meta`) are kept
/// verbatim in `extra` so a submitted sub-graph round-trips unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkNode {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_type: Option<String>,
    #[serde(default)]
    pub inputs: BTreeMap<String, InputValue>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl WorkNode {
    pub fn new(class_type: impl Into<String>) -> Self {
        Self {
            class_type: Some(class_type.into()),
            ..Default::default()
        }
    }

    /// Builder: set a literal input.
    pub fn with_literal(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.inputs.insert(name.into(), InputValue::Literal(value));
        self
    }

    /// Builder: wire an input to a producer's output slot.
    pub fn with_link(mut self, name: impl Into<String>, producer: impl Into<NodeId>, slot: u32) -> Self {
        self.inputs
            .insert(name.into(), InputValue::Link(NodeLink(producer.into(), slot)));
        self
    }

    /// Ids of every node this node reads from.
    pub fn producers(&self) -> impl Iterator<Item = &str> {
        self.inputs
            .values()
            .filter_map(InputValue::as_link)
            .map(NodeLink::producer)
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// Full work graph, keyed by node id.
///
/// Treated as an immutable snapshot: transformations such as
/// [`closure`](Self::closure) always build a new graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkGraph {
    nodes: BTreeMap<NodeId, WorkNode>,
}

impl WorkGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<NodeId>, node: WorkNode) -> Option<WorkNode> {
        self.nodes.insert(id.into(), node)
    }

    pub fn get(&self, id: &str) -> Option<&WorkNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &WorkNode)> {
        self.nodes.iter().map(|(id, node)| (id.as_str(), node))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut WorkNode)> {
        self.nodes.iter_mut().map(|(id, node)| (id.as_str(), node))
    }

    /// Minimal sub-graph containing `targets` and everything they depend on.
    ///
    /// Depth-first from each target, following link inputs to their
    /// producers. Each node is copied once; a node already collected is not
    /// walked again, which also makes malformed cyclic input terminate.
    /// Targets or producers absent from this graph contribute nothing.
    pub fn closure<I, S>(&self, targets: I) -> WorkGraph
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut collected: BTreeMap<NodeId, WorkNode> = BTreeMap::new();

        for target in targets {
            let mut stack: Vec<&str> = vec![target.as_ref()];
            while let Some(id) = stack.pop() {
                if collected.contains_key(id) {
                    continue;
                }
                let Some((key, node)) = self.nodes.get_key_value(id) else {
                    continue;
                };
                collected.insert(key.clone(), node.clone());
                stack.extend(node.producers().filter(|p| !collected.contains_key(*p)));
            }
        }

        WorkGraph { nodes: collected }
    }
}

impl FromIterator<(NodeId, WorkNode)> for WorkGraph {
    fn from_iter<T: IntoIterator<Item = (NodeId, WorkNode)>>(iter: T) -> Self {
        Self {
            nodes: iter.into_iter().collect(),
        }
    }
}

impl From<BTreeMap<NodeId, WorkNode>> for WorkGraph {
    fn from(nodes: BTreeMap<NodeId, WorkNode>) -> Self {
        Self { nodes }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    /// n1 (checkpoint) -> n2 (encode) -> n3 (sampler) <- n1, plus an
    /// unrelated n4 -> n5 branch.
    fn sample_graph() -> WorkGraph {
        let mut g = WorkGraph::new();
        g.insert("n1", WorkNode::new("CheckpointLoaderSimple").with_literal("ckpt_name", json!("model.safetensors")));
        g.insert("n2", WorkNode::new("CLIPTextEncode").with_link("clip", "n1", 1).with_literal("text", json!("a cat")));
        g.insert(
            "n3",
            WorkNode::new("KSampler")
                .with_link("model", "n1", 0)
                .with_link("positive", "n2", 0)
                .with_literal("seed", json!(42)),
        );
        g.insert("n4", WorkNode::new("LoadImage").with_literal("image", json!("in.png")));
        g.insert("n5", WorkNode::new("SaveImage").with_link("images", "n4", 0));
        g
    }

    fn ids(g: &WorkGraph) -> Vec<&str> {
        g.node_ids().collect()
    }

    #[test]
    fn closure_collects_transitive_dependencies() {
        let g = sample_graph();
        let sub = g.closure(["n3"]);
        assert_eq!(ids(&sub), vec!["n1", "n2", "n3"]);
    }

    #[test]
    fn closure_of_multiple_targets_is_their_union() {
        let g = sample_graph();
        let sub = g.closure(["n2", "n5"]);
        assert_eq!(ids(&sub), vec!["n1", "n2", "n4", "n5"]);
    }

    #[test]
    fn closure_skips_missing_targets() {
        let g = sample_graph();
        assert!(g.closure(["does-not-exist"]).is_empty());
        assert_eq!(ids(&g.closure(["missing", "n5"])), vec!["n4", "n5"]);
    }

    #[test]
    fn closure_ignores_dangling_links() {
        let mut g = WorkGraph::new();
        g.insert("a", WorkNode::new("X").with_link("in", "ghost", 0));
        assert_eq!(ids(&g.closure(["a"])), vec!["a"]);
    }

    #[test]
    fn closure_terminates_on_cycles() {
        let mut g = WorkGraph::new();
        g.insert("a", WorkNode::new("X").with_link("in", "b", 0));
        g.insert("b", WorkNode::new("X").with_link("in", "a", 0));
        g.insert("c", WorkNode::new("X"));
        assert_eq!(ids(&g.closure(["a"])), vec!["a", "b"]);
    }

    #[test]
    fn closure_is_idempotent() {
        let g = sample_graph();
        let once = g.closure(["n3", "n5"]);
        let twice = once.closure(["n3", "n5"]);
        assert_eq!(once, twice);
    }

    #[test]
    fn closure_does_not_mutate_source() {
        let g = sample_graph();
        let before = g.clone();
        let _ = g.closure(["n3"]);
        assert_eq!(g, before);
    }

    #[test]
    fn deserializes_api_prompt_and_preserves_extra_fields() {
        let raw = json!({
            "3": {
                "class_type": "KSampler",
                "inputs": {
                    "seed": 7,
                    "model": ["4", 0],
                    "positive": ["6", 0],
                    "sampler_name": "euler"
                },
                "_meta": {"title": "KSampler"}
            },
            "4": {"class_type": "CheckpointLoaderSimple", "inputs": {"ckpt_name": "m.safetensors"}}
        });

        let g: WorkGraph = serde_json::from_value(raw.clone()).unwrap();
        let sampler = g.get("3").unwrap();
        assert_eq!(sampler.class_type.as_deref(), Some("KSampler"));
        assert_eq!(
            sampler.inputs["model"],
            InputValue::Link(NodeLink("4".into(), 0))
        );
        assert_eq!(sampler.inputs["seed"], InputValue::Literal(json!(7)));
        assert_eq!(sampler.extra["_meta"], json!({"title": "KSampler"}));

        assert_eq!(serde_json::to_value(&g).unwrap(), raw);
    }

    #[test]
    fn non_link_arrays_stay_literal() {
        let raw = json!({
            "1": {"inputs": {"sizes": [512, 768], "tags": ["a", "b", "c"]}}
        });
        let g: WorkGraph = serde_json::from_value(raw).unwrap();
        let node = g.get("1").unwrap();
        assert!(node.inputs["sizes"].as_link().is_none());
        assert!(node.inputs["tags"].as_link().is_none());
        assert_eq!(node.producers().count(), 0);
    }
}

//! Graph and plan fixtures.

use groupexec_core::graph::{WorkGraph, WorkNode};
use groupexec_core::plan::{ExecutionPlan, ExecutionStep, GroupStep};
use serde_json::json;

/// `n1 (seed) -> n2 -> n3`, plus `n1 -> n3` and an unrelated `n9`.
///
/// `n1` is a sampler-like node with a `seed` input; `n3` is the output.
pub fn sampler_graph() -> WorkGraph {
    let mut graph = WorkGraph::new();
    graph.insert(
        "n1",
        WorkNode::new("KSampler")
            .with_literal("seed", json!(42))
            .with_literal("steps", json!(20))
            .with_literal("cfg", json!(7.5)),
    );
    graph.insert("n2", WorkNode::new("VAEDecode").with_link("samples", "n1", 0));
    graph.insert(
        "n3",
        WorkNode::new("SaveImage")
            .with_link("images", "n2", 0)
            .with_link("latent", "n1", 0)
            .with_literal("filename_prefix", json!("out")),
    );
    graph.insert("n9", WorkNode::new("PreviewImage").with_literal("note", json!("unrelated")));
    graph
}

/// Two independent branches: `a1 -> a2` and `b1 (noise_seed) -> b2`.
pub fn two_branch_graph() -> WorkGraph {
    let mut graph = WorkGraph::new();
    graph.insert("a1", WorkNode::new("LoadImage").with_literal("image", json!("a.png")));
    graph.insert("a2", WorkNode::new("SaveImage").with_link("images", "a1", 0));
    graph.insert(
        "b1",
        WorkNode::new("SamplerCustom").with_literal("noise_seed", json!(1)),
    );
    graph.insert("b2", WorkNode::new("SaveImage").with_link("images", "b1", 0));
    graph
}

pub fn group(name: &str, repeat_count: u32, delay_seconds: f64, outputs: &[&str]) -> ExecutionStep {
    ExecutionStep::Group(GroupStep::new(name, repeat_count, delay_seconds, outputs.iter().copied()))
}

pub fn plan(steps: impl IntoIterator<Item = ExecutionStep>) -> ExecutionPlan {
    steps.into_iter().fold(ExecutionPlan::new(), ExecutionPlan::then)
}

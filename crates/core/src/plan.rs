//! Execution plan model.
//!
//! A plan is an ordered list of steps, each either a named group to run
//! `repeat_count` times or a bare pause. Callers send steps as flat
//! records `{group_name, repeat_count, delay_seconds, output_node_ids}`;
//! a record named [`DELAY_MARKER`] is a pause of `delay_seconds`.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::CoreError;
use crate::types::NodeId;

/// Group name that marks a delay-only step.
pub const DELAY_MARKER: &str = "__delay__";

/// Upper bound accepted for `repeat_count` on a single step.
pub const MAX_REPEAT_COUNT: u32 = 10_000;

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// A named group to submit `repeat_count` times.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupStep {
    pub group_name: String,
    pub repeat_count: u32,
    /// Pause between repeats (not after the last one).
    pub delay_seconds: f64,
    /// Output nodes whose dependency closure forms the submission.
    pub output_node_ids: Vec<NodeId>,
}

impl GroupStep {
    pub fn new<I, S>(group_name: impl Into<String>, repeat_count: u32, delay_seconds: f64, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<NodeId>,
    {
        Self {
            group_name: group_name.into(),
            repeat_count,
            delay_seconds,
            output_node_ids: outputs.into_iter().map(Into::into).collect(),
        }
    }

    /// Inter-repeat pause; negative or non-finite values count as zero.
    pub fn delay(&self) -> Duration {
        seconds_to_duration(self.delay_seconds)
    }

    /// Reject steps the orchestrator cannot run.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.group_name.trim().is_empty() {
            return Err(CoreError::Validation("Group name must not be empty".to_string()));
        }
        if self.output_node_ids.is_empty() {
            return Err(CoreError::Validation(format!(
                "Group '{}' has no output nodes",
                self.group_name
            )));
        }
        if self.repeat_count == 0 || self.repeat_count > MAX_REPEAT_COUNT {
            return Err(CoreError::Validation(format!(
                "Group '{}' repeat count must be between 1 and {MAX_REPEAT_COUNT}",
                self.group_name
            )));
        }
        Ok(())
    }
}

/// One entry of an [`ExecutionPlan`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StepRecord", into = "StepRecord")]
pub enum ExecutionStep {
    Group(GroupStep),
    Delay { delay_seconds: f64 },
}

impl ExecutionStep {
    pub fn delay(delay_seconds: f64) -> Self {
        ExecutionStep::Delay { delay_seconds }
    }

    pub fn is_delay_marker(&self) -> bool {
        matches!(self, ExecutionStep::Delay { .. })
    }
}

/// Wire shape of a step.
#[derive(Debug, Serialize, Deserialize)]
struct StepRecord {
    #[serde(default)]
    group_name: String,
    #[serde(default = "default_repeat_count")]
    repeat_count: u32,
    #[serde(default)]
    delay_seconds: f64,
    #[serde(default, deserialize_with = "deserialize_node_ids")]
    output_node_ids: Vec<NodeId>,
}

fn default_repeat_count() -> u32 {
    1
}

impl From<StepRecord> for ExecutionStep {
    fn from(record: StepRecord) -> Self {
        if record.group_name == DELAY_MARKER {
            ExecutionStep::Delay {
                delay_seconds: record.delay_seconds,
            }
        } else {
            ExecutionStep::Group(GroupStep {
                group_name: record.group_name,
                repeat_count: record.repeat_count,
                delay_seconds: record.delay_seconds,
                output_node_ids: record.output_node_ids,
            })
        }
    }
}

impl From<ExecutionStep> for StepRecord {
    fn from(step: ExecutionStep) -> Self {
        match step {
            ExecutionStep::Group(g) => StepRecord {
                group_name: g.group_name,
                repeat_count: g.repeat_count,
                delay_seconds: g.delay_seconds,
                output_node_ids: g.output_node_ids,
            },
            ExecutionStep::Delay { delay_seconds } => StepRecord {
                group_name: DELAY_MARKER.to_string(),
                repeat_count: 1,
                delay_seconds,
                output_node_ids: Vec::new(),
            },
        }
    }
}

/// The editor sends node ids as numbers; the engine keys them as strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawNodeId {
    Text(String),
    Number(i64),
}

fn deserialize_node_ids<'de, D>(deserializer: D) -> Result<Vec<NodeId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<RawNodeId>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .map(|id| match id {
            RawNodeId::Text(s) => s,
            RawNodeId::Number(n) => n.to_string(),
        })
        .collect())
}

/// Convert caller-supplied seconds into a sleep duration.
pub fn seconds_to_duration(seconds: f64) -> Duration {
    if seconds.is_finite() && seconds > 0.0 {
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// Ordered list of steps. Read-only once handed to the orchestrator.
///
/// Deserializes from either a list of step records or a single record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "PlanRecord", into = "Vec<ExecutionStep>")]
pub struct ExecutionPlan {
    steps: Vec<ExecutionStep>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PlanRecord {
    Many(Vec<ExecutionStep>),
    One(ExecutionStep),
}

impl From<PlanRecord> for ExecutionPlan {
    fn from(record: PlanRecord) -> Self {
        match record {
            PlanRecord::Many(steps) => Self { steps },
            PlanRecord::One(step) => Self { steps: vec![step] },
        }
    }
}

impl From<ExecutionPlan> for Vec<ExecutionStep> {
    fn from(plan: ExecutionPlan) -> Self {
        plan.steps
    }
}

impl From<Vec<ExecutionStep>> for ExecutionPlan {
    fn from(steps: Vec<ExecutionStep>) -> Self {
        Self { steps }
    }
}

impl ExecutionPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[ExecutionStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Append a step, returning the extended plan.
    ///
    /// This is how group nodes chain: each one appends itself to the
    /// plan it received.
    pub fn then(mut self, step: ExecutionStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Repeat the whole plan `times` times with a pause of
    /// `group_delay_seconds` between repetitions (none after the last).
    ///
    /// `times == 0` yields an empty plan.
    pub fn repeated(&self, times: u32, group_delay_seconds: f64) -> Self {
        let mut steps = Vec::with_capacity(self.steps.len() * times as usize);
        for i in 0..times {
            steps.extend(self.steps.iter().cloned());
            if i + 1 < times {
                steps.push(ExecutionStep::delay(group_delay_seconds));
            }
        }
        Self { steps }
    }

    /// Number of submissions a fully successful run would make.
    pub fn expected_submissions(&self) -> u64 {
        self.steps
            .iter()
            .filter_map(|s| match s {
                ExecutionStep::Group(g) if g.validate().is_ok() => Some(u64::from(g.repeat_count)),
                _ => None,
            })
            .sum()
    }
}

impl<'a> IntoIterator for &'a ExecutionPlan {
    type Item = &'a ExecutionStep;
    type IntoIter = std::slice::Iter<'a, ExecutionStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn deserializes_records_with_defaults_and_numeric_ids() {
        let plan: ExecutionPlan = serde_json::from_value(json!([
            {"group_name": "faces", "repeat_count": 3, "delay_seconds": 1.5, "output_node_ids": [9, "12"]},
            {"group_name": "__delay__", "delay_seconds": 4},
            {"group_name": "upscale", "output_node_ids": ["20"]}
        ]))
        .unwrap();

        assert_eq!(plan.len(), 3);
        assert_eq!(
            plan.steps()[0],
            ExecutionStep::Group(GroupStep::new("faces", 3, 1.5, ["9", "12"]))
        );
        assert_eq!(plan.steps()[1], ExecutionStep::delay(4.0));
        match &plan.steps()[2] {
            ExecutionStep::Group(g) => {
                assert_eq!(g.repeat_count, 1);
                assert_eq!(g.delay(), Duration::ZERO);
            }
            other => panic!("Expected Group, got {other:?}"),
        }
    }

    #[test]
    fn single_record_is_a_one_step_plan() {
        let plan: ExecutionPlan =
            serde_json::from_value(json!({"group_name": "g", "output_node_ids": ["1"]})).unwrap();
        assert_eq!(plan.len(), 1);
    }

    #[test]
    fn delay_marker_serializes_back_to_record() {
        let value = serde_json::to_value(ExecutionPlan::from(vec![ExecutionStep::delay(2.0)])).unwrap();
        assert_eq!(value[0]["group_name"], DELAY_MARKER);
        assert_eq!(value[0]["delay_seconds"], 2.0);
    }

    #[test]
    fn validate_rejects_malformed_groups() {
        assert!(GroupStep::new("", 1, 0.0, ["1"]).validate().is_err());
        assert!(GroupStep::new("  ", 1, 0.0, ["1"]).validate().is_err());
        assert!(GroupStep::new("g", 1, 0.0, Vec::<String>::new()).validate().is_err());
        assert!(GroupStep::new("g", 0, 0.0, ["1"]).validate().is_err());
        assert!(GroupStep::new("g", 2, 0.0, ["1"]).validate().is_ok());
    }

    #[test]
    fn delay_clamps_invalid_values() {
        assert_eq!(seconds_to_duration(-3.0), Duration::ZERO);
        assert_eq!(seconds_to_duration(f64::NAN), Duration::ZERO);
        assert_eq!(seconds_to_duration(0.5), Duration::from_millis(500));
    }

    #[test]
    fn repeated_inserts_delays_between_repetitions() {
        let base = ExecutionPlan::new()
            .then(ExecutionStep::Group(GroupStep::new("a", 1, 0.0, ["1"])))
            .then(ExecutionStep::Group(GroupStep::new("b", 2, 0.0, ["2"])));

        let plan = base.repeated(3, 5.0);
        let names: Vec<String> = plan
            .steps()
            .iter()
            .map(|s| match s {
                ExecutionStep::Group(g) => g.group_name.clone(),
                ExecutionStep::Delay { delay_seconds } => format!("delay:{delay_seconds}"),
            })
            .collect();

        assert_eq!(
            names,
            vec!["a", "b", "delay:5", "a", "b", "delay:5", "a", "b"]
        );
        assert_eq!(plan.expected_submissions(), 9);
    }

    #[test]
    fn repeated_zero_times_is_empty() {
        let base = ExecutionPlan::new().then(ExecutionStep::Group(GroupStep::new("a", 1, 0.0, ["1"])));
        assert!(base.repeated(0, 1.0).is_empty());
    }
}

use std::str::FromStr;
use std::time::Duration;

/// Which tasks an engine interrupt cancels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterruptPolicy {
    /// Cancel every running task. The engine interrupt is global, so any
    /// in-flight orchestration may have lost its work.
    #[default]
    CancelAll,
    /// Cancel only the task whose in-flight request was interrupted.
    OwnerOnly,
}

impl FromStr for InterruptPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cancel_all" | "all" => Ok(InterruptPolicy::CancelAll),
            "owner_only" | "owner" => Ok(InterruptPolicy::OwnerOnly),
            other => Err(format!("unknown interrupt policy '{other}'")),
        }
    }
}

/// Orchestrator tuning loaded from environment variables.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Interval between status polls while waiting on a submission.
    pub poll_interval: Duration,
    /// Upper bound on one submission round trip.
    pub submit_timeout: Duration,
    /// Consecutive `NotFound` polls accepted as resolution.
    pub missing_grace_ticks: u32,
    pub interrupt_policy: InterruptPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            submit_timeout: Duration::from_secs(30),
            missing_grace_ticks: 2,
            interrupt_policy: InterruptPolicy::CancelAll,
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                            | Default      |
    /// |------------------------------------|--------------|
    /// | `ORCHESTRATOR_POLL_INTERVAL_MS`    | `500`        |
    /// | `ORCHESTRATOR_SUBMIT_TIMEOUT_SECS` | `30`         |
    /// | `ORCHESTRATOR_MISSING_GRACE_TICKS` | `2`          |
    /// | `ORCHESTRATOR_INTERRUPT_POLICY`    | `cancel_all` |
    pub fn from_env() -> Self {
        let poll_interval_ms: u64 = std::env::var("ORCHESTRATOR_POLL_INTERVAL_MS")
            .unwrap_or_else(|_| "500".into())
            .parse()
            .expect("ORCHESTRATOR_POLL_INTERVAL_MS must be a valid u64");

        let submit_timeout_secs: u64 = std::env::var("ORCHESTRATOR_SUBMIT_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("ORCHESTRATOR_SUBMIT_TIMEOUT_SECS must be a valid u64");

        let missing_grace_ticks: u32 = std::env::var("ORCHESTRATOR_MISSING_GRACE_TICKS")
            .unwrap_or_else(|_| "2".into())
            .parse()
            .expect("ORCHESTRATOR_MISSING_GRACE_TICKS must be a valid u32");

        let interrupt_policy: InterruptPolicy = std::env::var("ORCHESTRATOR_INTERRUPT_POLICY")
            .unwrap_or_else(|_| "cancel_all".into())
            .parse()
            .expect("ORCHESTRATOR_INTERRUPT_POLICY must be 'cancel_all' or 'owner_only'");

        Self {
            poll_interval: Duration::from_millis(poll_interval_ms.max(1)),
            submit_timeout: Duration::from_secs(submit_timeout_secs),
            missing_grace_ticks: missing_grace_ticks.max(1),
            interrupt_policy,
        }
    }
}

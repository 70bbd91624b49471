/// Rejections from [`Orchestrator`](crate::orchestrator::Orchestrator)
/// start and cancel requests.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Task '{0}' is already running")]
    AlreadyRunning(String),

    #[error("Task id must not be empty")]
    MissingTaskId,

    #[error("Execution plan is empty")]
    EmptyPlan,

    #[error("Work graph is missing or empty")]
    MissingGraph,

    #[error("No running task '{0}'")]
    NotFound(String),
}

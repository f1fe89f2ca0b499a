use thiserror::Error;

/// Reasons `execute_task` can refuse or abort a task.
///
/// Per-action problems (timeouts, missing elements) are not errors here;
/// they come back as failed [`ActionResult`](crate::ActionResult)s.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    /// The agent is switched off. Nothing was changed.
    #[error("Interactive Mode is not enabled")]
    AgentDisabled,

    /// Another task holds the coordinator. Nothing was changed.
    #[error("Another task is already in progress")]
    TaskInProgress,

    /// The request/reply plumbing broke while dispatching an action.
    #[error("Coordination fault: {0}")]
    CoordinationFault(String),
}

impl AgentError {
    /// Rejections leave coordinator state untouched; faults do not.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::AgentDisabled | Self::TaskInProgress)
    }
}

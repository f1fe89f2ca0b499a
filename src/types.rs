use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How long the coordinator waits for the executor to answer one action.
pub const ACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Pause after every action so the page can settle before the next one.
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Error text of the result synthesized when an action times out.
pub const ACTION_TIMEOUT_ERROR: &str = "Action timeout";

/// A single atomic browser operation derived from a task description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    Navigate { url: String },
    Search { query: String },
    Click { target: String },
    Fill { field: String, value: String },
    Scroll { direction: ScrollDirection },
    Wait { seconds: u64 },
    General { description: String },
}

impl Action {
    /// Short lowercase name used in logs and events.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Navigate { .. } => "navigate",
            Action::Search { .. } => "search",
            Action::Click { .. } => "click",
            Action::Fill { .. } => "fill",
            Action::Scroll { .. } => "scroll",
            Action::Wait { .. } => "wait",
            Action::General { .. } => "general",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Navigate { url } => write!(f, "navigate to {url}"),
            Action::Search { query } => write!(f, "search for \"{query}\""),
            Action::Click { target } => write!(f, "click \"{target}\""),
            Action::Fill { field, value } => write!(f, "fill \"{field}\" with \"{value}\""),
            Action::Scroll { direction } => write!(f, "scroll {direction}"),
            Action::Wait { seconds } => write!(f, "wait {seconds}s"),
            Action::General { description } => write!(f, "general: {description}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
}

impl ScrollDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
        }
    }
}

impl fmt::Display for ScrollDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the executor reports back for one action.
///
/// `error` is set iff `success` is false. Results decoded from page scripts
/// go through [`ActionResult::normalized`] to restore that.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<ScrollDirection>,
}

impl ActionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// The result recorded for an action whose reply never arrived.
    pub fn timeout() -> Self {
        Self::failure(ACTION_TIMEOUT_ERROR)
    }

    pub fn is_timeout(&self) -> bool {
        !self.success && self.error.as_deref() == Some(ACTION_TIMEOUT_ERROR)
    }

    /// Restore the success/error pairing after decoding untrusted output.
    pub fn normalized(mut self) -> Self {
        if self.success {
            self.error = None;
        } else if self.error.is_none() {
            self.error = Some("Action failed".to_string());
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Processing,
    Completed,
    Failed,
}

/// One user instruction and its execution record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: u64,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub results: Vec<ActionResult>,
}

impl Task {
    pub fn new(id: u64, description: impl Into<String>) -> Self {
        Self {
            id,
            description: description.into(),
            start_time: Utc::now(),
            end_time: None,
            status: TaskStatus::Processing,
            error: None,
            results: Vec::new(),
        }
    }

    pub fn complete(&mut self) {
        self.status = TaskStatus::Completed;
        self.end_time = Some(Utc::now());
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.end_time = Some(Utc::now());
    }

    /// Number of steps that reported failure, timeouts included.
    pub fn failed_steps(&self) -> usize {
        self.results.iter().filter(|r| !r.success).count()
    }
}

/// What `execute_task` hands back once a task has run.
///
/// `success` is the task-level outcome only; step outcomes live in `results`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub success: bool,
    pub results: Vec<ActionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub task: Task,
}

/// Read-only view of the coordinator, taken under a single lock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentStatus {
    pub enabled: bool,
    pub current_task: Option<Task>,
    pub is_processing: bool,
}

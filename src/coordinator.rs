//! Task coordinator: accepts one task at a time and drives it to the end.
//!
//! Lifecycle per task: Idle -> Processing -> Completed | Failed -> Idle.
//! `processing` and `current_task` live behind one lock and always change
//! together, so every observer sees either both set or both clear. The task
//! record is moved into history and the coordinator returns to idle in the
//! same critical section.

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::brain;
use crate::config::AgentConfig;
use crate::dispatch::Dispatcher;
use crate::error::AgentError;
use crate::types::{Action, ActionResult, AgentStatus, Task, TaskOutcome, TaskStatus};

/// Progress notifications for UIs. Sending never blocks the task.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    TaskStarted {
        id: u64,
        description: String,
    },
    ActionDispatched {
        index: usize,
        action: Action,
    },
    ActionFinished {
        index: usize,
        result: ActionResult,
    },
    TaskFinished {
        id: u64,
        status: TaskStatus,
        error: Option<String>,
    },
    Toggled {
        enabled: bool,
    },
}

#[derive(Default)]
struct CoordinatorState {
    enabled: bool,
    processing: bool,
    current_task: Option<Task>,
}

pub struct TaskCoordinator {
    dispatcher: Dispatcher,
    action_timeout: Duration,
    settle_delay: Duration,
    state: Mutex<CoordinatorState>,
    history: RwLock<Vec<Task>>,
    next_id: AtomicU64,
    events: broadcast::Sender<AgentEvent>,
}

impl TaskCoordinator {
    pub fn new(dispatcher: Dispatcher, config: &AgentConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            dispatcher,
            action_timeout: config.action_timeout,
            settle_delay: config.settle_delay,
            state: Mutex::new(CoordinatorState {
                enabled: config.start_enabled,
                ..Default::default()
            }),
            history: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
            events,
        }
    }

    /// Run a task description to completion.
    ///
    /// Rejections (`AgentDisabled`, `TaskInProgress`) come back as `Err` and
    /// touch nothing. Anything that was accepted comes back as `Ok`, even a
    /// task that failed on a coordination fault; it is in history either way.
    /// Step outcomes are in `results`, and a step may have failed while the
    /// task succeeded.
    pub async fn execute_task(&self, description: &str) -> Result<TaskOutcome, AgentError> {
        let task_id = self.begin(description)?;
        let guard = TaskGuard {
            coordinator: self,
            task_id,
            armed: true,
        };

        info!(task_id, description, "task accepted");
        self.emit(AgentEvent::TaskStarted {
            id: task_id,
            description: description.to_string(),
        });

        let started = Instant::now();
        let run = self.run_actions(task_id, brain::parse(description)).await;
        let fault = run.err().map(|e| e.to_string());

        let task = guard
            .finish(fault.clone())
            .ok_or_else(|| AgentError::CoordinationFault("task record lost".into()))?;

        info!(
            task_id,
            status = ?task.status,
            steps = task.results.len(),
            failed_steps = task.failed_steps(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "task finished"
        );

        Ok(TaskOutcome {
            success: fault.is_none(),
            results: task.results.clone(),
            error: fault,
            task,
        })
    }

    pub fn enable(&self) {
        self.state.lock().enabled = true;
        info!("interactive agent enabled");
        self.emit(AgentEvent::Toggled { enabled: true });
    }

    /// Switch the agent off. A task already running keeps running and keeps
    /// its record until it finishes; only new tasks are refused.
    pub fn disable(&self) {
        let mut state = self.state.lock();
        state.enabled = false;
        if state.processing {
            warn!("agent disabled while a task is running; it will finish first");
        } else {
            state.current_task = None;
        }
        drop(state);
        info!("interactive agent disabled");
        self.emit(AgentEvent::Toggled { enabled: false });
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().enabled
    }

    pub fn is_processing(&self) -> bool {
        self.state.lock().processing
    }

    pub fn get_current_task(&self) -> Option<Task> {
        self.state.lock().current_task.clone()
    }

    /// Snapshot of finished tasks, oldest first.
    pub fn get_task_history(&self) -> Vec<Task> {
        self.history.read().clone()
    }

    pub fn status(&self) -> AgentStatus {
        let state = self.state.lock();
        AgentStatus {
            enabled: state.enabled,
            current_task: state.current_task.clone(),
            is_processing: state.processing,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.events.subscribe()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    fn begin(&self, description: &str) -> Result<u64, AgentError> {
        let mut state = self.state.lock();
        if !state.enabled {
            debug!("task rejected: agent disabled");
            return Err(AgentError::AgentDisabled);
        }
        if state.processing {
            debug!("task rejected: another task in progress");
            return Err(AgentError::TaskInProgress);
        }
        let task_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        state.processing = true;
        state.current_task = Some(Task::new(task_id, description));
        Ok(task_id)
    }

    async fn run_actions(&self, task_id: u64, actions: Vec<Action>) -> Result<(), AgentError> {
        for (index, action) in actions.into_iter().enumerate() {
            let kind = action.kind();
            self.emit(AgentEvent::ActionDispatched {
                index,
                action: action.clone(),
            });

            let started = Instant::now();
            let result = self.dispatcher.dispatch(action, self.action_timeout).await?;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            if result.success {
                debug!(task_id, index, action = kind, elapsed_ms, "action succeeded");
            } else {
                warn!(
                    task_id,
                    index,
                    action = kind,
                    elapsed_ms,
                    error = result.error.as_deref().unwrap_or_default(),
                    "action failed"
                );
            }

            self.record_result(task_id, result.clone())?;
            self.emit(AgentEvent::ActionFinished { index, result });

            tokio::time::sleep(self.settle_delay).await;
        }
        Ok(())
    }

    fn record_result(&self, task_id: u64, result: ActionResult) -> Result<(), AgentError> {
        let mut state = self.state.lock();
        match state.current_task.as_mut() {
            Some(task) if task.id == task_id => {
                task.results.push(result);
                Ok(())
            }
            _ => Err(AgentError::CoordinationFault(format!(
                "task {task_id} is no longer current"
            ))),
        }
    }

    /// Close out `task_id`: finalize it, append it to history and go idle,
    /// all under the state lock. Does nothing if the task is not current.
    fn finish_task(&self, task_id: u64, fault: Option<String>) -> Option<Task> {
        let mut state = self.state.lock();
        if state.current_task.as_ref().map(|t| t.id) != Some(task_id) {
            return None;
        }
        let mut task = state.current_task.take()?;
        match &fault {
            None => task.complete(),
            Some(error) => task.fail(error.clone()),
        }
        self.history.write().push(task.clone());
        state.processing = false;
        drop(state);

        self.emit(AgentEvent::TaskFinished {
            id: task.id,
            status: task.status,
            error: task.error.clone(),
        });
        Some(task)
    }

    fn emit(&self, event: AgentEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Guarantees the coordinator goes idle however `execute_task` exits. If
/// the task future is dropped midway, the task is recorded as failed.
struct TaskGuard<'a> {
    coordinator: &'a TaskCoordinator,
    task_id: u64,
    armed: bool,
}

impl TaskGuard<'_> {
    fn finish(mut self, fault: Option<String>) -> Option<Task> {
        self.armed = false;
        self.coordinator.finish_task(self.task_id, fault)
    }
}

impl Drop for TaskGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!(task_id = self.task_id, "task abandoned before completion");
            self.coordinator
                .finish_task(self.task_id, Some("Task abandoned before completion".into()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{RequestReceiver, ReplyRouter, dispatch_channel};
    use std::sync::Arc;

    fn enabled_config() -> AgentConfig {
        AgentConfig {
            start_enabled: true,
            ..AgentConfig::default()
        }
    }

    fn coordinator() -> (Arc<TaskCoordinator>, RequestReceiver, ReplyRouter) {
        let (dispatcher, requests, router) = dispatch_channel();
        let coordinator = Arc::new(TaskCoordinator::new(dispatcher, &enabled_config()));
        (coordinator, requests, router)
    }

    /// Answers every request with a success echoing the action.
    fn spawn_echo(mut requests: RequestReceiver, router: ReplyRouter) {
        tokio::spawn(async move {
            while let Some(req) = requests.recv().await {
                router.reply(&req.channel_id, ActionResult::ok(req.action.to_string()));
            }
        });
    }

    #[tokio::test]
    async fn disabled_agent_rejects_without_state_change() {
        let (dispatcher, _requests, _router) = dispatch_channel();
        let coordinator = TaskCoordinator::new(dispatcher, &AgentConfig::default());

        assert!(!coordinator.is_enabled());
        let err = coordinator.execute_task("go to example.com").await.unwrap_err();
        assert_eq!(err, AgentError::AgentDisabled);
        assert!(!coordinator.is_processing());
        assert!(coordinator.get_current_task().is_none());
        assert!(coordinator.get_task_history().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn completed_task_lands_in_history() {
        let (coordinator, requests, router) = coordinator();
        spawn_echo(requests, router);

        let outcome = coordinator
            .execute_task("search for cats and scroll down")
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.task.status, TaskStatus::Completed);
        assert!(outcome.task.end_time.is_some());
        assert_eq!(coordinator.get_task_history(), vec![outcome.task]);
        assert!(!coordinator.is_processing());
        assert!(coordinator.get_current_task().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn busy_coordinator_rejects_second_task() {
        let (coordinator, mut requests, router) = coordinator();

        let running = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.execute_task("wait 5 seconds").await })
        };

        // Hold the reply so the first task stays in flight.
        let req = requests.recv().await.unwrap();
        let status = coordinator.status();
        assert!(status.is_processing);
        let inflight = status.current_task.unwrap();
        assert_eq!(inflight.description, "wait 5 seconds");

        let err = coordinator.execute_task("go to example.com").await.unwrap_err();
        assert_eq!(err, AgentError::TaskInProgress);
        assert_eq!(coordinator.get_current_task(), Some(inflight));
        assert!(coordinator.get_task_history().is_empty());

        router.reply(&req.channel_id, ActionResult::ok("Waited 5 seconds"));
        let outcome = running.await.unwrap().unwrap();
        assert!(outcome.success);
        assert_eq!(coordinator.get_task_history().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disable_does_not_abort_running_task() {
        let (coordinator, mut requests, router) = coordinator();

        let running = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.execute_task("scroll down").await })
        };
        let req = requests.recv().await.unwrap();

        coordinator.disable();
        let status = coordinator.status();
        assert!(!status.enabled);
        assert!(status.is_processing);
        assert!(status.current_task.is_some());

        router.reply(&req.channel_id, ActionResult::ok("scrolled"));
        let outcome = running.await.unwrap().unwrap();
        assert!(outcome.success);

        let err = coordinator.execute_task("scroll up").await.unwrap_err();
        assert_eq!(err, AgentError::AgentDisabled);
    }

    #[tokio::test]
    async fn coordination_fault_fails_task_and_is_recorded() {
        let (coordinator, requests, _router) = coordinator();
        drop(requests);

        let outcome = coordinator.execute_task("go to example.com").await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap().contains("executor is not running"));
        assert_eq!(outcome.task.status, TaskStatus::Failed);
        assert_eq!(outcome.task.error, outcome.error);

        let history = coordinator.get_task_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, TaskStatus::Failed);
        assert!(!coordinator.is_processing());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_task_future_is_recorded_as_failed() {
        let (coordinator, _requests, _router) = coordinator();

        let fut = coordinator.execute_task("click submit button");
        let _ = tokio::time::timeout(Duration::from_secs(1), fut).await;

        assert!(!coordinator.is_processing());
        assert!(coordinator.get_current_task().is_none());
        let history = coordinator.get_task_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, TaskStatus::Failed);
        assert_eq!(coordinator.dispatcher().pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn events_follow_the_task() {
        let (coordinator, requests, router) = coordinator();
        spawn_echo(requests, router);
        let mut events = coordinator.subscribe();

        coordinator.execute_task("wait 1 second").await.unwrap();

        let mut names = Vec::new();
        while let Ok(event) = events.try_recv() {
            names.push(match event {
                AgentEvent::TaskStarted { .. } => "started",
                AgentEvent::ActionDispatched { .. } => "dispatched",
                AgentEvent::ActionFinished { .. } => "finished_action",
                AgentEvent::TaskFinished { .. } => "finished",
                AgentEvent::Toggled { .. } => "toggled",
            });
        }
        assert_eq!(names, vec!["started", "dispatched", "finished_action", "finished"]);
    }
}

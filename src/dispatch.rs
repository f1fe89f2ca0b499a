//! One-shot request/reply handoff between the coordinator and the executor.
//!
//! Every action gets a fresh [`ChannelId`]. The coordinator registers a
//! listener under that id, queues an [`ActionRequest`] for the executor and
//! waits for the first of: the reply, or the deadline. The listener is removed
//! on every exit path, including when the waiting future is dropped, so an id
//! is never answered twice and nothing is left behind.
//!
//! The executor side only ever sees the request queue and a [`ReplyRouter`].

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::AgentError;
use crate::types::{Action, ActionResult};

/// Correlation id naming one dispatch. Never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// Time plus 64 random bits.
    pub fn generate() -> Self {
        Self(format!(
            "interactive-action-{}-{:016x}",
            Utc::now().timestamp_millis(),
            rand::random::<u64>()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the executor receives for each action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    pub action: Action,
    pub channel_id: ChannelId,
}

/// Executor end of the request queue.
pub type RequestReceiver = mpsc::UnboundedReceiver<ActionRequest>;

type Pending = Arc<Mutex<HashMap<ChannelId, oneshot::Sender<ActionResult>>>>;

/// Create a connected dispatcher, request queue and reply router.
pub fn dispatch_channel() -> (Dispatcher, RequestReceiver, ReplyRouter) {
    let (requests, rx) = mpsc::unbounded_channel();
    let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
    let router = ReplyRouter {
        pending: pending.clone(),
    };
    (Dispatcher { requests, pending }, rx, router)
}

/// Request side, owned by the coordinator.
#[derive(Clone)]
pub struct Dispatcher {
    requests: mpsc::UnboundedSender<ActionRequest>,
    pending: Pending,
}

impl Dispatcher {
    /// Send one action and wait for its reply.
    ///
    /// A missed deadline is not an error: it yields the synthesized timeout
    /// result. Only broken plumbing returns `CoordinationFault`.
    pub async fn dispatch(
        &self,
        action: Action,
        timeout: Duration,
    ) -> Result<ActionResult, AgentError> {
        let channel_id = ChannelId::generate();
        let (tx, rx) = oneshot::channel();
        let _listener = self.register(channel_id.clone(), tx)?;

        debug!(channel_id = %channel_id, action = action.kind(), "dispatching action");
        self.requests
            .send(ActionRequest {
                action,
                channel_id: channel_id.clone(),
            })
            .map_err(|_| AgentError::CoordinationFault("action executor is not running".into()))?;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => Ok(result.normalized()),
            Ok(Err(_)) => Err(AgentError::CoordinationFault(format!(
                "channel {channel_id} closed without a reply"
            ))),
            Err(_) => {
                warn!(channel_id = %channel_id, timeout_ms = timeout.as_millis() as u64, "action timed out");
                Ok(ActionResult::timeout())
            }
        }
    }

    /// Listeners still waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Drop every registered listener. Dispatches in flight fail with a
    /// coordination fault. Used at shutdown.
    pub fn cancel_pending(&self) -> usize {
        let mut pending = self.pending.lock();
        let count = pending.len();
        pending.clear();
        count
    }

    fn register(
        &self,
        channel_id: ChannelId,
        tx: oneshot::Sender<ActionResult>,
    ) -> Result<Listener<'_>, AgentError> {
        let mut pending = self.pending.lock();
        if pending.contains_key(&channel_id) {
            return Err(AgentError::CoordinationFault(format!(
                "channel id collision: {channel_id}"
            )));
        }
        pending.insert(channel_id.clone(), tx);
        Ok(Listener {
            pending: &self.pending,
            channel_id,
        })
    }
}

/// Unregisters its channel when dropped.
struct Listener<'a> {
    pending: &'a Pending,
    channel_id: ChannelId,
}

impl Drop for Listener<'_> {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.channel_id);
    }
}

/// Reply side, handed to the executor.
#[derive(Clone)]
pub struct ReplyRouter {
    pending: Pending,
}

impl ReplyRouter {
    /// Deliver the reply for `channel_id`. Returns false when nobody is
    /// listening any more (late or duplicate reply); the result is dropped.
    pub fn reply(&self, channel_id: &ChannelId, result: ActionResult) -> bool {
        let Some(tx) = self.pending.lock().remove(channel_id) else {
            debug!(channel_id = %channel_id, "ignoring reply for unregistered channel");
            return false;
        };
        tx.send(result).is_ok()
    }
}

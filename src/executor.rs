use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::blocklist::{self, BlockFilter};
use crate::config::AgentConfig;
use crate::dispatch::{ActionRequest, ReplyRouter, RequestReceiver};
use crate::dom;
use crate::types::{Action, ActionResult, ScrollDirection};

const NAVIGATION_SETTLE: Duration = Duration::from_millis(2000);
const CLICK_SETTLE: Duration = Duration::from_millis(1000);
const FILL_SETTLE: Duration = Duration::from_millis(500);
const SCROLL_SETTLE: Duration = Duration::from_millis(500);

/// The embedded view the agent drives.
#[async_trait]
pub trait ContentSurface: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Evaluate a script in the page and return its value.
    async fn run_script(&self, script: &str) -> Result<Value>;

    async fn scroll_by(&self, dy: i64) -> Result<()>;
}

/// Content-surface side of the dispatch channel. Answers each request at
/// most once; an action that overruns its budget gets no reply at all.
pub struct ActionExecutor<S> {
    surface: Arc<S>,
    blocklist: Option<Arc<BlockFilter>>,
    search_url: String,
    budget: Duration,
}

impl<S: ContentSurface> ActionExecutor<S> {
    pub fn new(surface: Arc<S>, config: &AgentConfig) -> Self {
        Self {
            surface,
            blocklist: None,
            search_url: config.search_url.clone(),
            budget: config.executor_budget,
        }
    }

    /// Refuse navigation to blocklisted URLs.
    pub fn with_blocklist(mut self, blocklist: Arc<BlockFilter>) -> Self {
        self.blocklist = Some(blocklist);
        self
    }

    /// Serve requests until the coordinator side goes away.
    pub async fn run(self, mut requests: RequestReceiver, router: ReplyRouter) {
        while let Some(ActionRequest { action, channel_id }) = requests.recv().await {
            debug!(channel_id = %channel_id, action = action.kind(), "executing action");
            let budget = self.budget_for(&action);
            match tokio::time::timeout(budget, self.execute(&action)).await {
                Ok(result) => {
                    if !router.reply(&channel_id, result) {
                        debug!(channel_id = %channel_id, "nobody waiting for this reply");
                    }
                }
                Err(_) => warn!(
                    channel_id = %channel_id,
                    action = action.kind(),
                    budget_ms = budget.as_millis() as u64,
                    "executor budget exceeded, not replying"
                ),
            }
        }
        info!("request queue closed, executor stopping");
    }

    /// Surface work gets the plain budget; a wait gets its own length on top.
    fn budget_for(&self, action: &Action) -> Duration {
        match action {
            Action::Wait { seconds } => self.budget.saturating_add(Duration::from_secs(*seconds)),
            _ => self.budget,
        }
    }

    /// Perform one action. Surface errors become failed results.
    pub async fn execute(&self, action: &Action) -> ActionResult {
        let outcome = match action {
            Action::Navigate { url } => self.navigate(url).await,
            Action::Search { query } => self.search(query).await,
            Action::Click { target } => {
                self.script(&dom::click_script(target), CLICK_SETTLE).await
            }
            Action::Fill { field, value } => {
                self.script(&dom::fill_script(field, value), FILL_SETTLE).await
            }
            Action::Scroll { direction } => self.scroll(*direction).await,
            Action::Wait { seconds } => {
                tokio::time::sleep(Duration::from_secs(*seconds)).await;
                Ok(ActionResult::ok(format!("Waited {seconds} seconds")))
            }
            Action::General { .. } => Ok(ActionResult::failure("Unknown action type")),
        };
        outcome.unwrap_or_else(|e| ActionResult::failure(format!("{e:#}")))
    }

    async fn navigate(&self, url: &str) -> Result<ActionResult> {
        let url = blocklist::sanitize_url(url);
        if let Some(verdict) = self.blocklist.as_ref().map(|b| b.is_blocked(&url))
            && verdict.blocked
        {
            let kind = verdict.kind.map(|k| k.as_str()).unwrap_or("listed");
            let domain = verdict.domain.unwrap_or_default();
            return Ok(ActionResult::failure(format!("Blocked {kind} domain: {domain}")));
        }
        self.surface.navigate(&url).await?;
        tokio::time::sleep(NAVIGATION_SETTLE).await;
        Ok(ActionResult::ok(format!("Navigated to {url}")))
    }

    async fn search(&self, query: &str) -> Result<ActionResult> {
        self.surface
            .navigate(&dom::search_url(&self.search_url, query))
            .await?;
        tokio::time::sleep(NAVIGATION_SETTLE).await;
        Ok(ActionResult::ok(format!("Searched for: {query}")))
    }

    async fn script(&self, script: &str, settle: Duration) -> Result<ActionResult> {
        let value = self.surface.run_script(script).await?;
        tokio::time::sleep(settle).await;
        Ok(dom::decode_script_result(value))
    }

    async fn scroll(&self, direction: ScrollDirection) -> Result<ActionResult> {
        let dy = match direction {
            ScrollDirection::Down => dom::SCROLL_STEP,
            ScrollDirection::Up => -dom::SCROLL_STEP,
        };
        self.surface.scroll_by(dy).await?;
        tokio::time::sleep(SCROLL_SETTLE).await;
        Ok(ActionResult {
            success: true,
            direction: Some(direction),
            ..Default::default()
        })
    }
}

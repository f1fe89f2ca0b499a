use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::blocklist::BlockFilter;
use crate::config::AgentConfig;
use crate::coordinator::TaskCoordinator;
use crate::dispatch::{ReplyRouter, RequestReceiver, dispatch_channel};
use crate::executor::{ActionExecutor, ContentSurface};
use crate::tor::{TorConfig, TorController};

/// Long-lived components, built once at startup and torn down by `shutdown`.
pub struct AppContext {
    pub config: AgentConfig,
    pub coordinator: Arc<TaskCoordinator>,
    pub blocklist: Arc<BlockFilter>,
    pub tor: Arc<TorController>,
}

/// The executor's half of the dispatch channel.
pub struct ExecutorEndpoint {
    pub requests: RequestReceiver,
    pub router: ReplyRouter,
}

impl AppContext {
    pub fn new(config: AgentConfig, tor: TorConfig) -> (Self, ExecutorEndpoint) {
        let (dispatcher, requests, router) = dispatch_channel();
        let coordinator = Arc::new(TaskCoordinator::new(dispatcher, &config));
        let ctx = Self {
            config,
            coordinator,
            blocklist: Arc::new(BlockFilter::new()),
            tor: Arc::new(TorController::new(tor)),
        };
        (ctx, ExecutorEndpoint { requests, router })
    }

    /// Executor over `surface`, sharing this context's blocklist.
    pub fn executor<S: ContentSurface>(&self, surface: Arc<S>) -> ActionExecutor<S> {
        ActionExecutor::new(surface, &self.config).with_blocklist(self.blocklist.clone())
    }

    /// Stop taking tasks, fail whatever is still waiting on the executor and
    /// bring Tor down.
    pub async fn shutdown(&self) -> Result<()> {
        self.coordinator.disable();
        let cancelled = self.coordinator.dispatcher().cancel_pending();
        if cancelled > 0 {
            info!(cancelled, "cancelled in-flight dispatches");
        }
        self.tor.stop().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_disables_agent() {
        let dir = tempfile::tempdir().unwrap();
        let tor = TorConfig {
            data_dir: dir.path().to_path_buf(),
            ..TorConfig::default()
        };
        let config = AgentConfig {
            start_enabled: true,
            ..AgentConfig::default()
        };
        let (ctx, _endpoint) = AppContext::new(config, tor);
        assert!(ctx.coordinator.is_enabled());

        ctx.shutdown().await.unwrap();
        assert!(!ctx.coordinator.is_enabled());
        assert!(!ctx.tor.is_active());
    }
}

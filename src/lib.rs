pub mod blocklist;
pub mod brain;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod dispatch;
pub mod dom;
pub mod error;
pub mod executor;
pub mod history;
pub mod tor;
pub mod types;

pub use blocklist::{BlockFilter, BlockKind, BlockStats, BlockVerdict, sanitize_url};
pub use brain::parse;
pub use config::{AgentConfig, Cli};
pub use context::{AppContext, ExecutorEndpoint};
pub use coordinator::{AgentEvent, TaskCoordinator};
pub use dispatch::{ActionRequest, ChannelId, Dispatcher, ReplyRouter, dispatch_channel};
pub use error::AgentError;
pub use executor::{ActionExecutor, ContentSurface};
pub use tor::{ProxyConfig, TorConfig, TorController};
pub use types::{
    ACTION_TIMEOUT, ACTION_TIMEOUT_ERROR, Action, ActionResult, AgentStatus, SETTLE_DELAY,
    ScrollDirection, Task, TaskOutcome, TaskStatus,
};

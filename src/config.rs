use anyhow::{Result, bail};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::tor::TorConfig;
use crate::types::{ACTION_TIMEOUT, SETTLE_DELAY};

pub const DEFAULT_SEARCH_URL: &str = "https://duckduckgo.com/?q=";

/// Knobs of the task pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// Deadline for one action's reply.
    pub action_timeout: Duration,
    /// Pause after each action.
    pub settle_delay: Duration,
    /// The executor gives up (silently) after this long. Kept below
    /// `action_timeout` so a reply never races the coordinator's deadline.
    pub executor_budget: Duration,
    /// Query prefix for `Search` actions.
    pub search_url: String,
    pub start_enabled: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            action_timeout: ACTION_TIMEOUT,
            settle_delay: SETTLE_DELAY,
            executor_budget: Duration::from_secs(25),
            search_url: DEFAULT_SEARCH_URL.to_string(),
            start_enabled: false,
        }
    }
}

/// Command line for the `agent` binary. Every flag can also come from the
/// environment (or a `.env` file).
#[derive(Debug, Parser)]
#[command(name = "agent", about = "Vox interactive browsing agent")]
pub struct Cli {
    /// First port tried for the local web UI.
    #[arg(long, env = "VOX_PORT", default_value_t = 3000)]
    pub port: u16,

    /// DevTools endpoint of an already running browser to attach to.
    #[arg(long, env = "VOX_CHROME_URL", default_value = "http://127.0.0.1:9222")]
    pub chrome_url: String,

    /// Launch the browser without a window.
    #[arg(long, env = "VOX_HEADLESS")]
    pub headless: bool,

    /// Start with the agent enabled.
    #[arg(long, env = "VOX_ENABLE")]
    pub enable: bool,

    #[arg(long, env = "VOX_ACTION_TIMEOUT_SECS", default_value_t = 30)]
    pub action_timeout_secs: u64,

    #[arg(long, env = "VOX_SETTLE_DELAY_MS", default_value_t = 500)]
    pub settle_delay_ms: u64,

    #[arg(long, env = "VOX_EXECUTOR_BUDGET_SECS", default_value_t = 25)]
    pub executor_budget_secs: u64,

    #[arg(long, env = "VOX_SEARCH_URL", default_value = DEFAULT_SEARCH_URL)]
    pub search_url: String,

    /// Where task history is exported. Defaults to the platform data dir.
    #[arg(long, env = "VOX_HISTORY_FILE")]
    pub history_file: Option<PathBuf>,

    /// Route the browser through Tor.
    #[arg(long, env = "VOX_TOR")]
    pub tor: bool,

    #[arg(long, env = "VOX_TOR_BINARY", default_value = "tor")]
    pub tor_binary: PathBuf,

    #[arg(long, env = "VOX_TOR_SOCKS_PORT", default_value_t = 9050)]
    pub tor_socks_port: u16,

    #[arg(long, env = "VOX_TOR_CONTROL_PORT", default_value_t = 9051)]
    pub tor_control_port: u16,

    /// Default log filter when RUST_LOG is unset.
    #[arg(long, env = "VOX_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Cli {
    pub fn agent_config(&self) -> Result<AgentConfig> {
        if self.action_timeout_secs == 0 {
            bail!("action timeout must be at least one second");
        }
        if self.executor_budget_secs >= self.action_timeout_secs {
            bail!(
                "executor budget ({}s) must be shorter than the action timeout ({}s)",
                self.executor_budget_secs,
                self.action_timeout_secs
            );
        }
        Ok(AgentConfig {
            action_timeout: Duration::from_secs(self.action_timeout_secs),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            executor_budget: Duration::from_secs(self.executor_budget_secs),
            search_url: self.search_url.clone(),
            start_enabled: self.enable,
        })
    }

    pub fn tor_config(&self) -> TorConfig {
        TorConfig {
            binary: self.tor_binary.clone(),
            socks_port: self.tor_socks_port,
            control_port: self.tor_control_port,
            data_dir: data_dir().join("tor-data"),
            ..TorConfig::default()
        }
    }

    pub fn history_path(&self) -> PathBuf {
        self.history_file
            .clone()
            .unwrap_or_else(|| data_dir().join("task-history.json"))
    }
}

/// Per-user data directory for the browser, falling back to the cwd.
pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vox-browser")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_pipeline_constants() {
        let config = AgentConfig::default();
        assert_eq!(config.action_timeout, Duration::from_secs(30));
        assert_eq!(config.settle_delay, Duration::from_millis(500));
        assert!(config.executor_budget < config.action_timeout);
        assert!(!config.start_enabled);
    }

    #[test]
    fn cli_builds_agent_config() {
        let cli = Cli::try_parse_from([
            "agent",
            "--enable",
            "--action-timeout-secs",
            "10",
            "--executor-budget-secs",
            "8",
            "--settle-delay-ms",
            "100",
        ])
        .unwrap();
        let config = cli.agent_config().unwrap();
        assert!(config.start_enabled);
        assert_eq!(config.action_timeout, Duration::from_secs(10));
        assert_eq!(config.executor_budget, Duration::from_secs(8));
        assert_eq!(config.settle_delay, Duration::from_millis(100));
    }

    #[test]
    fn budget_must_undercut_timeout() {
        let cli = Cli::try_parse_from([
            "agent",
            "--action-timeout-secs",
            "5",
            "--executor-budget-secs",
            "5",
        ])
        .unwrap();
        assert!(cli.agent_config().is_err());
    }

    #[test]
    fn explicit_history_file_wins() {
        let cli = Cli::try_parse_from(["agent", "--history-file", "/tmp/h.json"]).unwrap();
        assert_eq!(cli.history_path(), PathBuf::from("/tmp/h.json"));
    }
}

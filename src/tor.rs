use anyhow::{Context, Result, bail};
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::data_dir;

#[derive(Debug, Clone, PartialEq)]
pub struct TorConfig {
    pub binary: PathBuf,
    pub socks_port: u16,
    pub control_port: u16,
    pub data_dir: PathBuf,
    /// How long the daemon gets to come up before it counts as running.
    pub startup_grace: Duration,
}

impl Default for TorConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("tor"),
            socks_port: 9050,
            control_port: 9051,
            data_dir: data_dir().join("tor-data"),
            startup_grace: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    #[serde(rename = "type")]
    pub kind: String,
}

impl ProxyConfig {
    /// Chrome flag routing all traffic through this proxy.
    pub fn chrome_arg(&self) -> String {
        format!("--proxy-server={}://{}:{}", self.kind, self.host, self.port)
    }
}

/// Runs a local Tor daemon as the browser's SOCKS proxy.
pub struct TorController {
    config: TorConfig,
    child: Mutex<Option<Child>>,
    active: AtomicBool,
}

impl TorController {
    pub fn new(config: TorConfig) -> Self {
        Self {
            config,
            child: Mutex::new(None),
            active: AtomicBool::new(false),
        }
    }

    /// Spawn the daemon. Calling it while running is a no-op.
    pub async fn start(&self) -> Result<()> {
        let mut slot = self.child.lock().await;
        if let Some(child) = slot.as_mut() {
            if child.try_wait()?.is_none() {
                return Ok(());
            }
            warn!("tor process had exited, restarting");
            *slot = None;
        }

        tokio::fs::create_dir_all(&self.config.data_dir)
            .await
            .with_context(|| format!("creating {}", self.config.data_dir.display()))?;

        let mut child = Command::new(&self.config.binary)
            .arg("--SocksPort")
            .arg(self.config.socks_port.to_string())
            .arg("--ControlPort")
            .arg(self.config.control_port.to_string())
            .arg("--DataDirectory")
            .arg(&self.config.data_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("launching {}", self.config.binary.display()))?;

        tokio::time::sleep(self.config.startup_grace).await;
        if let Some(status) = child.try_wait()? {
            bail!("tor exited during startup: {status}");
        }

        info!(socks_port = self.config.socks_port, "tor started");
        *slot = Some(child);
        self.active.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        let child = self.child.lock().await.take();
        self.active.store(false, Ordering::SeqCst);
        if let Some(mut child) = child {
            child.kill().await.context("stopping tor")?;
            info!("tor stopped");
        }
        Ok(())
    }

    /// True while the daemon process is alive. A daemon that died on its
    /// own is noticed here and the controller drops back to inactive.
    pub fn is_active(&self) -> bool {
        if !self.active.load(Ordering::SeqCst) {
            return false;
        }
        // start/stop holds the slot; trust the flag until it is done.
        let Ok(mut slot) = self.child.try_lock() else {
            return true;
        };
        match slot.as_mut().map(Child::try_wait) {
            Some(Ok(None)) => return true,
            Some(Ok(Some(status))) => warn!(%status, "tor exited unexpectedly"),
            Some(Err(e)) => warn!(error = %e, "could not poll tor process"),
            None => {}
        }
        *slot = None;
        self.active.store(false, Ordering::SeqCst);
        false
    }

    /// Where to point the browser, or `None` while Tor is down.
    pub fn proxy_config(&self) -> Option<ProxyConfig> {
        self.is_active().then(|| ProxyConfig {
            host: "127.0.0.1".to_string(),
            port: self.config.socks_port,
            kind: "socks5".to_string(),
        })
    }
}

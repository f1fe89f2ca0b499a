use anyhow::{Context, Result};
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use serde_json::Value;
use std::ffi::OsStr;
use std::sync::Arc;
use tracing::{info, warn};
use vox_agent::config::data_dir;
use vox_agent::{ContentSurface, ProxyConfig};

/// The browser tab the agent drives. Created once, reused for all tasks.
pub struct ChromeSurface {
    _browser: Browser,
    tab: Arc<Tab>,
}

impl ChromeSurface {
    /// Attach to a browser already listening on `debug_url`, or launch one
    /// with its own profile. Blocking; call from `spawn_blocking`.
    pub fn launch(debug_url: &str, headless: bool, proxy: Option<&ProxyConfig>) -> Result<Self> {
        info!(debug_url, "attempting to attach to a running browser");
        if let Ok(browser) = Browser::connect(debug_url.to_string()) {
            if proxy.is_some() {
                warn!("attached browser keeps its own proxy settings; Tor is not applied");
            }
            let existing = browser
                .get_tabs()
                .lock()
                .map_err(|_| anyhow::anyhow!("browser tab list poisoned"))?
                .first()
                .cloned();
            let tab = match existing {
                Some(tab) => tab,
                None => browser.new_tab()?,
            };
            info!("attached to running browser");
            return Ok(Self {
                _browser: browser,
                tab,
            });
        }

        let profile = data_dir().join("agent-profile");
        std::fs::create_dir_all(&profile)
            .with_context(|| format!("creating {}", profile.display()))?;

        let proxy_arg = proxy.map(ProxyConfig::chrome_arg);
        let mut args = vec![
            OsStr::new("--no-first-run"),
            OsStr::new("--no-default-browser-check"),
            OsStr::new("--disable-blink-features=AutomationControlled"),
            OsStr::new("--disable-infobars"),
        ];
        if let Some(arg) = &proxy_arg {
            info!(proxy = %arg, "routing browser through proxy");
            args.push(OsStr::new(arg));
        }

        let options = LaunchOptions {
            headless,
            user_data_dir: Some(profile),
            args,
            idle_browser_timeout: std::time::Duration::from_secs(600),
            ..Default::default()
        };

        info!(headless, "launching browser");
        let browser = Browser::new(options).context("browser launch failed")?;
        let tab = browser.new_tab()?;
        tab.navigate_to("about:blank")?;
        info!("browser ready");

        Ok(Self {
            _browser: browser,
            tab,
        })
    }
}

#[async_trait]
impl ContentSurface for ChromeSurface {
    async fn navigate(&self, url: &str) -> Result<()> {
        let tab = self.tab.clone();
        let url = url.to_string();
        tokio::task::spawn_blocking(move || {
            tab.navigate_to(&url)?;
            tab.wait_until_navigated()?;
            Ok(())
        })
        .await
        .context("navigation task panicked")?
    }

    async fn run_script(&self, script: &str) -> Result<Value> {
        let tab = self.tab.clone();
        let script = script.to_string();
        tokio::task::spawn_blocking(move || {
            let result = tab.evaluate(&script, false)?;
            Ok(result.value.unwrap_or(Value::Null))
        })
        .await
        .context("script task panicked")?
    }

    async fn scroll_by(&self, dy: i64) -> Result<()> {
        let tab = self.tab.clone();
        tokio::task::spawn_blocking(move || {
            tab.evaluate(&format!("window.scrollBy(0, {dy})"), false)?;
            Ok(())
        })
        .await
        .context("scroll task panicked")?
    }
}

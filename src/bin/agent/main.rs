mod face;
mod hands;

use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use vox_agent::{AppContext, Cli, history};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_target(true)
        .init();

    info!("starting Vox interactive agent");
    let config = cli.agent_config()?;
    let history_path = cli.history_path();
    let (ctx, endpoint) = AppContext::new(config, cli.tor_config());
    let ctx = Arc::new(ctx);

    // 1. Tor first, so the browser can be pointed at it
    if cli.tor {
        if let Err(e) = ctx.tor.start().await {
            warn!(error = %format!("{e:#}"), "tor unavailable, continuing without proxy");
        }
    }

    // 2. Browser (blocking, can take a while)
    let proxy = ctx.tor.proxy_config();
    let debug_url = cli.chrome_url.clone();
    let headless = cli.headless;
    let surface = tokio::task::spawn_blocking(move || {
        hands::ChromeSurface::launch(&debug_url, headless, proxy.as_ref())
    })
    .await
    .context("browser launch panicked")??;

    // 3. Executor loop on the content-surface side
    let executor = ctx.executor(Arc::new(surface));
    let executor_task = tokio::spawn(executor.run(endpoint.requests, endpoint.router));

    // 4. Web UI until Ctrl-C
    let listener = face::bind(cli.port).await?;
    let state = face::AppState {
        ctx: ctx.clone(),
        history_path: history_path.clone(),
    };
    face::serve(listener, state, shutdown_signal()).await?;

    info!("shutting down");
    if let Err(e) = ctx.shutdown().await {
        error!(error = %format!("{e:#}"), "shutdown incomplete");
    }
    executor_task.abort();

    let tasks = ctx.coordinator.get_task_history();
    if !tasks.is_empty() {
        history::save_history(&history_path, &tasks)?;
        info!(count = tasks.len(), path = %history_path.display(), "task history saved");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

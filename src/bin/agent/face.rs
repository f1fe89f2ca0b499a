use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{error, info, warn};
use vox_agent::{AgentError, AgentEvent, AppContext, history};

#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<AppContext>,
    pub history_path: PathBuf,
}

#[derive(Deserialize)]
struct TaskPayload {
    description: String,
}

#[derive(Deserialize)]
struct TogglePayload {
    enabled: bool,
}

/// Bind the first free port in `first_port..first_port + 10`.
pub async fn bind(first_port: u16) -> anyhow::Result<TcpListener> {
    let last_port = first_port.saturating_add(9);
    for port in first_port..=last_port {
        match TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => return Ok(listener),
            Err(e) => warn!(port, error = %e, "port unavailable"),
        }
    }
    anyhow::bail!("could not bind any port in {first_port}-{last_port}; is another agent running?")
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/task", post(task_handler))
        .route("/api/agent/toggle", post(toggle_handler))
        .route("/api/agent/status", get(status_handler))
        .route("/api/agent/history", get(history_handler))
        .route("/api/history/export", post(export_handler))
        .route("/api/blocklist/stats", get(blocklist_stats_handler))
        .route("/api/blocklist/reset", post(blocklist_reset_handler))
        .route("/events", get(sse_handler))
        .route("/favicon.ico", get(|| async { StatusCode::NO_CONTENT }))
        .with_state(Arc::new(state))
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    info!(addr = %listener.local_addr()?, "web UI listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn task_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TaskPayload>,
) -> Response {
    info!(description = %payload.description, "task submitted");
    // Detached so a dropped connection does not abandon the task.
    let coordinator = state.ctx.coordinator.clone();
    let running =
        tokio::spawn(async move { coordinator.execute_task(&payload.description).await });

    match running.await {
        Ok(Ok(outcome)) => Json(outcome).into_response(),
        Ok(Err(e)) => {
            if e.is_rejection() {
                info!(reason = %e, "task rejected");
            } else {
                error!(error = %e, "task aborted");
            }
            let status = match e {
                AgentError::AgentDisabled => StatusCode::FORBIDDEN,
                AgentError::TaskInProgress => StatusCode::CONFLICT,
                AgentError::CoordinationFault(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(json!({ "success": false, "error": e.to_string() }))).into_response()
        }
        Err(e) => {
            error!(error = %e, "task runner panicked");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": "task runner panicked" })),
            )
                .into_response()
        }
    }
}

async fn toggle_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TogglePayload>,
) -> Response {
    let coordinator = &state.ctx.coordinator;
    if payload.enabled {
        coordinator.enable();
    } else {
        coordinator.disable();
    }
    Json(json!({ "enabled": coordinator.is_enabled() })).into_response()
}

async fn status_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(state.ctx.coordinator.status()).into_response()
}

async fn history_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(state.ctx.coordinator.get_task_history()).into_response()
}

async fn export_handler(State(state): State<Arc<AppState>>) -> Response {
    let tasks = state.ctx.coordinator.get_task_history();
    let path = state.history_path.clone();
    let count = tasks.len();
    let saved = tokio::task::spawn_blocking(move || history::save_history(&path, &tasks)).await;

    match saved {
        Ok(Ok(())) => Json(json!({
            "path": state.history_path.display().to_string(),
            "count": count,
        }))
        .into_response(),
        Ok(Err(e)) => {
            error!(error = %format!("{e:#}"), "history export failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": format!("{e:#}") })),
            )
                .into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn blocklist_stats_handler(State(state): State<Arc<AppState>>) -> Response {
    Json(state.ctx.blocklist.stats()).into_response()
}

async fn blocklist_reset_handler(State(state): State<Arc<AppState>>) -> Response {
    state.ctx.blocklist.reset_stats();
    Json(state.ctx.blocklist.stats()).into_response()
}

async fn sse_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.ctx.coordinator.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result: Result<AgentEvent, _>| {
        let event = result.ok()?;
        Event::default().json_data(&event).ok().map(Ok::<_, Infallible>)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>Vox Interactive Mode</title>
<style>
  * { margin: 0; padding: 0; box-sizing: border-box; }
  body {
    background: #0a0a0f;
    color: #e0e0e0;
    font-family: 'Segoe UI', system-ui, -apple-system, sans-serif;
    height: 100vh;
    display: grid;
    grid-template-columns: 1fr 280px;
    grid-template-rows: auto 1fr;
  }
  header {
    grid-column: 1 / 3;
    padding: 18px 28px;
    border-bottom: 1px solid #1a1a2e;
    display: flex;
    align-items: center;
    gap: 12px;
  }
  header h1 { font-size: 18px; font-weight: 600; color: #fff; flex: 1; }
  .dot { width: 8px; height: 8px; border-radius: 50%; background: #555; }
  .dot.ready { background: #22c55e; }
  .dot.busy { background: #f59e0b; }
  label.toggle { font-size: 13px; color: #aaa; display: flex; gap: 6px; align-items: center; }
  .main { display: flex; flex-direction: column; padding: 20px 28px; gap: 14px; overflow: hidden; }
  #log { flex: 1; overflow-y: auto; display: flex; flex-direction: column; gap: 6px; }
  .entry { padding: 8px 12px; border-radius: 6px; font-size: 13px; background: #111118; border-left: 3px solid #3b82f6; }
  .entry.user { background: #1a1a2e; border-left-color: #6366f1; }
  .entry.error { color: #fca5a5; border-left-color: #ef4444; }
  .entry.done { color: #86efac; border-left-color: #22c55e; }
  .input-area { display: flex; gap: 8px; }
  #task {
    flex: 1; background: #111118; border: 1px solid #222; border-radius: 8px;
    padding: 10px 14px; color: #fff; font-size: 15px; outline: none;
  }
  #task:focus { border-color: #6366f1; }
  button {
    background: #6366f1; color: #fff; border: none; border-radius: 8px;
    padding: 10px 20px; font-size: 14px; font-weight: 600; cursor: pointer;
  }
  button:disabled { background: #333; cursor: not-allowed; }
  aside { border-left: 1px solid #1a1a2e; padding: 20px; overflow-y: auto; }
  aside h2 { font-size: 13px; text-transform: uppercase; color: #888; margin-bottom: 10px; }
  .history-item { font-size: 12px; padding: 8px; border-radius: 6px; background: #111118; margin-bottom: 6px; }
  .history-item.completed { border-left: 3px solid #22c55e; }
  .history-item.failed { border-left: 3px solid #ef4444; }
  .history-item small { color: #777; display: block; margin-top: 3px; }
</style>
</head>
<body>
  <header>
    <div class="dot" id="dot"></div>
    <h1>Interactive Mode</h1>
    <label class="toggle"><input type="checkbox" id="enabled" onchange="toggle()"> enabled</label>
  </header>
  <div class="main">
    <div id="log"></div>
    <div class="input-area">
      <input type="text" id="task" placeholder="e.g. go to example.com and scroll down" autofocus />
      <button id="send" onclick="send()">Run</button>
    </div>
  </div>
  <aside>
    <h2>History</h2>
    <div id="history"></div>
  </aside>
<script>
  const log = document.getElementById('log');
  const input = document.getElementById('task');
  const sendBtn = document.getElementById('send');
  const dot = document.getElementById('dot');
  const enabledBox = document.getElementById('enabled');
  const esc = s => String(s).replace(/&/g, '&amp;').replace(/</g, '&lt;');

  function addEntry(cls, html) {
    const div = document.createElement('div');
    div.className = 'entry ' + cls;
    div.innerHTML = html;
    log.appendChild(div);
    log.scrollTop = log.scrollHeight;
  }

  async function refreshStatus() {
    const s = await (await fetch('/api/agent/status')).json();
    enabledBox.checked = s.enabled;
    dot.className = 'dot ' + (s.isProcessing ? 'busy' : (s.enabled ? 'ready' : ''));
    sendBtn.disabled = s.isProcessing || !s.enabled;
  }

  async function refreshHistory() {
    const tasks = await (await fetch('/api/agent/history')).json();
    const box = document.getElementById('history');
    box.innerHTML = tasks.length ? '' : '<small>No tasks yet</small>';
    tasks.slice(-10).reverse().forEach(t => {
      const div = document.createElement('div');
      div.className = 'history-item ' + t.status;
      div.innerHTML = '<strong>' + esc(t.description) + '</strong><small>' + t.status +
        ' - ' + new Date(t.startTime).toLocaleTimeString() + '</small>';
      box.appendChild(div);
    });
  }

  async function toggle() {
    await fetch('/api/agent/toggle', {
      method: 'POST',
      headers: {'Content-Type': 'application/json'},
      body: JSON.stringify({enabled: enabledBox.checked}),
    });
    refreshStatus();
  }

  async function send() {
    const text = input.value.trim();
    if (!text) return;
    input.value = '';
    addEntry('user', '<strong>Task:</strong> ' + esc(text));
    const res = await fetch('/api/task', {
      method: 'POST',
      headers: {'Content-Type': 'application/json'},
      body: JSON.stringify({description: text}),
    });
    const out = await res.json();
    if (out.success) {
      addEntry('done', 'Task completed');
    } else {
      addEntry('error', 'Task failed: ' + esc(out.error || 'unknown error'));
    }
    refreshStatus();
    refreshHistory();
  }

  input.addEventListener('keydown', e => { if (e.key === 'Enter') send(); });

  const es = new EventSource('/events');
  es.onmessage = e => {
    const ev = JSON.parse(e.data);
    switch (ev.event) {
      case 'task_started': refreshStatus(); break;
      case 'action_dispatched':
        addEntry('', 'Step ' + (ev.index + 1) + ': ' + esc(ev.action.type));
        break;
      case 'action_finished':
        if (ev.result.success) {
          addEntry('done', esc(ev.result.message || ev.result.element || ev.result.field || ev.result.direction || 'ok'));
        } else {
          addEntry('error', esc(ev.result.error));
        }
        break;
      case 'task_finished': refreshStatus(); refreshHistory(); break;
      case 'toggled': refreshStatus(); break;
    }
  };

  refreshStatus();
  refreshHistory();
</script>
</body>
</html>
"##;

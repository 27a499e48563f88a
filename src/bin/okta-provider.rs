//! # okta-provider
//!
//! Host adapter for the plugin. Reads one JSON request per line from stdin
//! and writes one JSON response per line to stdout:
//!
//! ```text
//! -> {"id": 1, "method": "PlanChange", "params": {"type_name": "okta_group", ...}}
//! <- {"id": 1, "result": {"planned_state": {...}, "action": "create", ...}}
//! ```
//!
//! Requests are served concurrently, at most `parallelism` at a time (one
//! until `Configure` says otherwise). `{"id": 2, "method": "Cancel",
//! "params": {"request": 1}}` cancels an in-flight request, which then
//! answers with a cancellation diagnostic.
//!
//! Logs go to stderr. When `RUST_LOG` is set it controls logging entirely;
//! otherwise the threshold starts at `OKTA_LOG_LEVEL` (or `warn`) and follows
//! the configured `log_level` afterwards.

use log::{LevelFilter, debug, error, info, warn};
use okta_provider::{PluginServer, ProviderConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

const CANCEL_METHOD: &str = "Cancel";

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Serialize)]
struct Response {
    id: Value,
    result: Value,
}

type InFlight = Arc<Mutex<HashMap<String, CancellationToken>>>;

#[tokio::main]
async fn main() {
    let fixed_level = std::env::var_os("RUST_LOG").is_some();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("trace")).init();
    if !fixed_level {
        let level = std::env::var("OKTA_LOG_LEVEL")
            .ok()
            .and_then(|level| level.trim().parse().ok())
            .unwrap_or(LevelFilter::Warn);
        log::set_max_level(level);
    }

    let server = match PluginServer::standard() {
        Ok(server) if fixed_level => Arc::new(server.with_fixed_log_level()),
        Ok(server) => Arc::new(server),
        Err(e) => {
            error!("Failed to build object registry: {}", e);
            std::process::exit(1);
        }
    };
    info!(
        "okta-provider {} serving {} object types",
        env!("CARGO_PKG_VERSION"),
        server.registry().object_types().count()
    );

    let (tx, rx) = mpsc::unbounded_channel::<Response>();
    let writer = tokio::spawn(write_responses(rx));
    let in_flight: InFlight = Arc::default();
    let mut tasks = JoinSet::new();
    let mut workers = Workers::new(ProviderConfig::default().parallelism);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted; cancelling in-flight requests");
                cancel_all(&in_flight);
                break;
            }
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read request: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let request: Request = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                warn!("Malformed request line: {}", e);
                let _ = tx.send(Response {
                    id: Value::Null,
                    result: json!({
                        "diagnostics": [{"severity": "error", "summary": "Malformed request", "detail": e.to_string()}]
                    }),
                });
                continue;
            }
        };

        if request.method == CANCEL_METHOD {
            let target = request_key(&request.params["request"]);
            let token = lock(&in_flight).get(&target).cloned();
            match token {
                Some(token) => {
                    debug!("Cancelling request {}", target);
                    token.cancel();
                }
                None => debug!("Cancel for unknown request {}", target),
            }
            let _ = tx.send(Response {
                id: request.id,
                result: json!({"diagnostics": []}),
            });
            continue;
        }

        let key = request_key(&request.id);
        let cancel = CancellationToken::new();
        lock(&in_flight).insert(key.clone(), cancel.clone());

        if let Some(parallelism) = server.parallelism().await {
            workers.resize(parallelism);
        }
        let permits = workers.semaphore();
        let server = Arc::clone(&server);
        let in_flight = Arc::clone(&in_flight);
        let tx = tx.clone();
        let queued = cancel.clone();
        tasks.spawn(async move {
            let result = tokio::select! {
                permit = permits.acquire_owned() => {
                    let _permit = permit;
                    server.handle(&request.method, request.params, cancel).await
                }
                _ = queued.cancelled() => json!({
                    "diagnostics": [{"severity": "error", "summary": "Operation cancelled", "detail": "cancelled while queued"}]
                }),
            };
            lock(&in_flight).remove(&key);
            if tx.send(Response { id: request.id, result }).is_err() {
                warn!("Response writer closed before request {} finished", key);
            }
        });
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!("Request task failed: {}", e);
        }
    }
    drop(tx);
    if let Err(e) = writer.await {
        error!("Response writer failed: {}", e);
    }
}

async fn write_responses(mut rx: mpsc::UnboundedReceiver<Response>) {
    let mut stdout = tokio::io::stdout();
    while let Some(response) = rx.recv().await {
        let mut line = match serde_json::to_vec(&response) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to encode response: {}", e);
                continue;
            }
        };
        line.push(b'\n');
        if let Err(e) = stdout.write_all(&line).await {
            error!("Failed to write response: {}", e);
            return;
        }
        if let Err(e) = stdout.flush().await {
            error!("Failed to flush response: {}", e);
            return;
        }
    }
}

/// Bounds the number of requests executing at once.
///
/// Resizing swaps in a fresh semaphore; requests already holding a permit
/// of the old one run to completion.
struct Workers {
    size: usize,
    semaphore: Arc<Semaphore>,
}

impl Workers {
    fn new(size: usize) -> Self {
        Self {
            size,
            semaphore: Arc::new(Semaphore::new(size)),
        }
    }

    fn resize(&mut self, size: usize) {
        if size != self.size {
            debug!("Serving up to {} request(s) at once", size);
            *self = Self::new(size);
        }
    }

    fn semaphore(&self) -> Arc<Semaphore> {
        Arc::clone(&self.semaphore)
    }
}

/// Requests are keyed by the textual form of their id.
fn request_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn lock(in_flight: &InFlight) -> std::sync::MutexGuard<'_, HashMap<String, CancellationToken>> {
    in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn cancel_all(in_flight: &InFlight) {
    for token in lock(in_flight).values() {
        token.cancel();
    }
}

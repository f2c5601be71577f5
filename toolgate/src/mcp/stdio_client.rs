//! Stdio JSON-RPC client for child tool providers.
//!
//! Spawns the child process and speaks line-delimited JSON-RPC 2.0 over its
//! stdin/stdout. Three tasks service the connection: a stdout reader that
//! correlates responses to pending requests by id, a stderr reader that
//! relays the child's log lines, and a stdin writer fed through a channel.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, watch, Mutex, RwLock};

use crate::errors::{GatewayError, GatewayResult};

/// How long a request may wait for the child's response.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A client connected to one child provider process.
pub struct StdioClient {
    name: String,
    child: Arc<Mutex<Child>>,
    pending: Arc<RwLock<HashMap<String, oneshot::Sender<Value>>>>,
    tx: mpsc::Sender<String>,
    closed_rx: watch::Receiver<bool>,
}

impl std::fmt::Debug for StdioClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioClient")
            .field("name", &self.name)
            .field("closed", &*self.closed_rx.borrow())
            .finish()
    }
}

impl StdioClient {
    /// Spawn the child process and wire up the connection tasks.
    pub async fn spawn(
        name: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> GatewayResult<Self> {
        let mut child = Command::new(command)
            .args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                GatewayError::Transport(format!("failed to spawn provider '{}': {}", name, e))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| GatewayError::Transport("child stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GatewayError::Transport("child stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| GatewayError::Transport("child stderr not captured".to_string()))?;

        let (tx, mut rx) = mpsc::channel::<String>(64);
        let (closed_tx, closed_rx) = watch::channel(false);
        let pending: Arc<RwLock<HashMap<String, oneshot::Sender<Value>>>> =
            Arc::new(RwLock::new(HashMap::new()));

        // Stdout reader: parse responses and match them to pending requests.
        let pending_reader = Arc::clone(&pending);
        let reader_name = name.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout);
            let mut line = String::new();
            loop {
                line.clear();
                match lines.read_line(&mut line).await {
                    Ok(0) => {
                        log::info!("provider '{}' stdout EOF", reader_name);
                        break;
                    }
                    Ok(_) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        let Ok(value) = serde_json::from_str::<Value>(trimmed) else {
                            log::debug!(
                                "provider '{}' emitted non-JSON line on stdout",
                                reader_name
                            );
                            continue;
                        };
                        if let Some(id_val) = value.get("id") {
                            let id_str = match id_val {
                                Value::String(s) => s.clone(),
                                Value::Number(n) => n.to_string(),
                                _ => continue,
                            };
                            let mut pending = pending_reader.write().await;
                            if let Some(sender) = pending.remove(&id_str) {
                                let _ = sender.send(value);
                            }
                        }
                    }
                    Err(e) => {
                        log::error!("error reading provider '{}' stdout: {}", reader_name, e);
                        break;
                    }
                }
            }
            // Wake anyone still waiting, then flag the transport closed.
            pending_reader.write().await.clear();
            let _ = closed_tx.send(true);
        });

        // Stderr reader: relay the child's log lines.
        let stderr_name = name.to_string();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr);
            let mut line = String::new();
            loop {
                line.clear();
                match lines.read_line(&mut line).await {
                    Ok(0) => break,
                    Ok(_) => {
                        log::debug!("[provider:{}] {}", stderr_name, line.trim_end());
                    }
                    Err(_) => break,
                }
            }
        });

        // Stdin writer: serialize and send outgoing messages.
        let writer_name = name.to_string();
        tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                if let Err(e) = stdin.write_all(msg.as_bytes()).await {
                    log::error!("failed to write to provider '{}' stdin: {}", writer_name, e);
                    break;
                }
                if let Err(e) = stdin.write_all(b"\n").await {
                    log::error!("failed to write to provider '{}' stdin: {}", writer_name, e);
                    break;
                }
                if let Err(e) = stdin.flush().await {
                    log::error!("failed to flush provider '{}' stdin: {}", writer_name, e);
                    break;
                }
            }
        });

        Ok(Self {
            name: name.to_string(),
            child: Arc::new(Mutex::new(child)),
            pending,
            tx,
            closed_rx,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once the child's stdout has reached EOF.
    pub fn is_closed(&self) -> bool {
        *self.closed_rx.borrow()
    }

    /// A watch receiver that flips to `true` when the transport closes.
    pub fn closed_watch(&self) -> watch::Receiver<bool> {
        self.closed_rx.clone()
    }

    /// Make a JSON-RPC request and wait for the matching response.
    ///
    /// Returns the child's `result` value; a populated `error` member becomes
    /// a transport error.
    pub async fn request(&self, method: &str, params: Value) -> GatewayResult<Value> {
        if self.is_closed() {
            return Err(GatewayError::Transport(format!(
                "provider '{}' connection closed",
                self.name
            )));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let request = json!({
            "jsonrpc": "2.0",
            "id": id.clone(),
            "method": method,
            "params": params
        });

        let (resp_tx, resp_rx) = oneshot::channel();
        {
            let mut pending = self.pending.write().await;
            pending.insert(id.clone(), resp_tx);
        }

        let msg = serde_json::to_string(&request)?;
        if self.tx.send(msg).await.is_err() {
            self.pending.write().await.remove(&id);
            return Err(GatewayError::Transport(format!(
                "provider '{}' stdin writer gone",
                self.name
            )));
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, resp_rx).await {
            Ok(Ok(response)) => {
                if let Some(error) = response.get("error") {
                    let message = error
                        .get("message")
                        .and_then(|m| m.as_str())
                        .unwrap_or("unknown error");
                    return Err(GatewayError::Transport(format!(
                        "provider '{}' error: {}",
                        self.name, message
                    )));
                }
                Ok(response.get("result").cloned().unwrap_or(Value::Null))
            }
            Ok(Err(_)) => Err(GatewayError::Transport(format!(
                "provider '{}' response channel closed",
                self.name
            ))),
            Err(_) => {
                self.pending.write().await.remove(&id);
                Err(GatewayError::Transport(format!(
                    "request '{}' to provider '{}' timed out",
                    method, self.name
                )))
            }
        }
    }

    /// Send a JSON-RPC notification (no response expected).
    pub async fn notify(&self, method: &str, params: Value) -> GatewayResult<()> {
        let notification = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params
        });
        let msg = serde_json::to_string(&notification)?;
        self.tx.send(msg).await.map_err(|_| {
            GatewayError::Transport(format!("provider '{}' stdin writer gone", self.name))
        })
    }

    /// Kill the child process.
    pub async fn close(&self) {
        let mut child = self.child.lock().await;
        if let Err(e) = child.kill().await {
            log::debug!("kill for provider '{}' failed: {}", self.name, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A `cat` child echoes request lines back verbatim, which reads as a
    /// response carrying the same id.
    #[tokio::test]
    async fn test_request_roundtrip_via_cat() {
        let client = StdioClient::spawn("cat", "cat", &[], &HashMap::new())
            .await
            .unwrap();

        let result = client.request("ping", json!({"x": 1})).await;
        // The echoed request has no "result" member, so the value is null,
        // but the correlation by id must succeed.
        assert!(result.is_ok());
        assert!(result.unwrap().is_null());

        client.close().await;
    }

    #[tokio::test]
    async fn test_closed_watch_flips_on_exit() {
        let client = StdioClient::spawn("true", "true", &[], &HashMap::new())
            .await
            .unwrap();
        let mut watch = client.closed_watch();
        tokio::time::timeout(Duration::from_secs(5), async {
            while !*watch.borrow() {
                watch.changed().await.unwrap();
            }
        })
        .await
        .expect("transport should close after child exit");
        assert!(client.is_closed());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_error() {
        let result = StdioClient::spawn(
            "ghost",
            "/nonexistent/definitely-not-a-binary",
            &[],
            &HashMap::new(),
        )
        .await;
        assert!(result.is_err());
    }
}

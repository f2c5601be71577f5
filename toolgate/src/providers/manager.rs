//! Child-provider lifecycle: spawn, handshake, aggregation, routing and
//! bounded restart supervision.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};

use tokio::sync::{Mutex, RwLock};

use super::config::ServerLaunchSpec;
use super::schema;
use crate::errors::GatewayResult;
use crate::mcp::server::McpServer;
use crate::mcp::stdio_client::StdioClient;
use crate::mcp::types::PROTOCOL_VERSION;

/// Restart attempts per child before the supervisor gives up.
const MAX_RESTART_ATTEMPTS: u32 = 3;

/// Linear backoff unit: attempt N waits N times this long.
const RESTART_BACKOFF_UNIT: Duration = Duration::from_secs(5);

/// A restart older than this resets the attempt counter, so a long-healthy
/// child is not penalized for ancient failures.
const RESTART_COUNTER_RESET: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStatus {
    Starting,
    Connected,
    Failed,
    Disconnected,
}

/// One configured child provider.
#[derive(Debug)]
pub struct ChildProvider {
    pub name: String,
    pub launch: ServerLaunchSpec,
    pub client: Option<Arc<StdioClient>>,
    pub status: ProviderStatus,
    pub restart_count: u32,
    pub last_restart_at: Option<Instant>,
}

/// Aggregator over all configured children, wired into the tool dispatcher.
#[derive(Clone)]
pub struct ProviderManager {
    providers: Arc<RwLock<HashMap<String, Arc<Mutex<ChildProvider>>>>>,
    server: Arc<McpServer>,
}

impl ProviderManager {
    pub fn new(server: Arc<McpServer>) -> Self {
        Self {
            providers: Arc::new(RwLock::new(HashMap::new())),
            server,
        }
    }

    /// Spawn and connect every configured child concurrently. A child that
    /// fails its launch or handshake is marked `Failed` and skipped; the
    /// others proceed.
    pub async fn start_all(&self, servers: HashMap<String, ServerLaunchSpec>) {
        {
            let mut providers = self.providers.write().await;
            for (name, launch) in servers {
                providers.insert(
                    name.clone(),
                    Arc::new(Mutex::new(ChildProvider {
                        name,
                        launch,
                        client: None,
                        status: ProviderStatus::Starting,
                        restart_count: 0,
                        last_restart_at: None,
                    })),
                );
            }
        }

        let names: Vec<String> = self.providers.read().await.keys().cloned().collect();
        let startups = names.into_iter().map(|name| {
            let manager = self.clone();
            async move {
                if let Err(e) = manager.connect_and_register(&name).await {
                    log::error!("provider '{}' failed to start: {}", name, e);
                    manager.set_status(&name, ProviderStatus::Failed).await;
                }
            }
        });
        futures::future::join_all(startups).await;
    }

    pub async fn provider_status(&self, name: &str) -> Option<ProviderStatus> {
        let entry = self.providers.read().await.get(name).cloned()?;
        let provider = entry.lock().await;
        Some(provider.status)
    }

    /// Launch the child, run the MCP handshake, pull its tool list, and
    /// register the namespaced tools.
    async fn connect_and_register(&self, name: &str) -> GatewayResult<()> {
        let entry = self
            .providers
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| {
                crate::errors::GatewayError::Internal(format!("unknown provider '{}'", name))
            })?;

        let launch = {
            let mut provider = entry.lock().await;
            provider.status = ProviderStatus::Starting;
            provider.launch.clone()
        };

        let client = Arc::new(
            StdioClient::spawn(name, &launch.command, &launch.args, &launch.env).await?,
        );

        client
            .request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": { "name": "toolgate", "version": env!("CARGO_PKG_VERSION") }
                }),
            )
            .await?;
        client.notify("notifications/initialized", json!({})).await?;

        let listed = client.request("tools/list", json!({})).await?;
        let tools = listed
            .get("tools")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        {
            let mut provider = entry.lock().await;
            provider.client = Some(Arc::clone(&client));
            provider.status = ProviderStatus::Connected;
        }

        self.register_provider_tools(name, &tools).await;
        self.spawn_watch(name.to_string(), client);
        log::info!("provider '{}' connected, {} tool(s) aggregated", name, tools.len());
        Ok(())
    }

    /// Re-export the child's tools under `{name}:{tool}`, translating each
    /// declared input schema into the host representation.
    async fn register_provider_tools(&self, name: &str, tools: &[Value]) {
        let prefix = format!("{}:", name);
        self.server.remove_tools_with_prefix(&prefix).await;

        for tool in tools {
            let Some(original) = tool.get("name").and_then(|v| v.as_str()) else {
                log::warn!("provider '{}' listed a tool without a name, skipping", name);
                continue;
            };
            let description = tool
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            let declared = tool.get("inputSchema").cloned().unwrap_or(Value::Null);
            let translated = schema::translate_input_schema(&declared);
            let rendered = schema::render_json_schema(&translated);

            let namespaced = format!("{}{}", prefix, original);
            let manager = self.clone();
            let child_name = name.to_string();
            let tool_name = original.to_string();
            self.server
                .register_tool(
                    &namespaced,
                    &format!("[{}] {}", name, description),
                    rendered,
                    Box::new(move |arguments| {
                        let manager = manager.clone();
                        let child_name = child_name.clone();
                        let tool_name = tool_name.clone();
                        Box::pin(async move {
                            Ok(manager.route(&child_name, &tool_name, arguments).await)
                        })
                    }),
                )
                .await;
        }
    }

    /// Forward a call to the owning child, verbatim. Failures come back as
    /// text, never as protocol errors.
    pub async fn route(&self, child: &str, tool: &str, arguments: Value) -> Value {
        let Some(entry) = self.providers.read().await.get(child).cloned() else {
            return Value::String(format!("Error: Tool provider '{}' is not configured", child));
        };

        let client = {
            let provider = entry.lock().await;
            if provider.status != ProviderStatus::Connected {
                return Value::String(format!(
                    "Error: Tool provider '{}' is currently unavailable",
                    child
                ));
            }
            provider.client.clone()
        };
        let Some(client) = client else {
            return Value::String(format!(
                "Error: Tool provider '{}' is currently unavailable",
                child
            ));
        };

        match client
            .request("tools/call", json!({ "name": tool, "arguments": arguments }))
            .await
        {
            Ok(result) => result,
            Err(e) => Value::String(format!("Error calling {}:{}: {}", child, tool, e)),
        }
    }

    async fn set_status(&self, name: &str, status: ProviderStatus) {
        if let Some(entry) = self.providers.read().await.get(name).cloned() {
            entry.lock().await.status = status;
        }
    }

    /// Watch the client transport; when it closes, mark the child
    /// disconnected and engage the bounded restart loop.
    fn spawn_watch(&self, name: String, client: Arc<StdioClient>) {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut closed = client.closed_watch();
            while !*closed.borrow() {
                if closed.changed().await.is_err() {
                    break;
                }
            }
            log::warn!("provider '{}' transport closed", name);
            manager.supervise_restart(&name).await;
        });
    }

    async fn supervise_restart(&self, name: &str) {
        let Some(entry) = self.providers.read().await.get(name).cloned() else {
            return;
        };
        {
            let mut provider = entry.lock().await;
            provider.status = ProviderStatus::Disconnected;
            provider.client = None;
        }

        loop {
            let attempt = {
                let mut provider = entry.lock().await;
                if let Some(last) = provider.last_restart_at {
                    if last.elapsed() > RESTART_COUNTER_RESET {
                        provider.restart_count = 0;
                    }
                }
                if provider.restart_count >= MAX_RESTART_ATTEMPTS {
                    log::error!(
                        "provider '{}' exhausted {} restart attempts, giving up",
                        name,
                        MAX_RESTART_ATTEMPTS
                    );
                    return;
                }
                provider.restart_count += 1;
                provider.last_restart_at = Some(Instant::now());
                provider.restart_count
            };

            let delay = backoff_delay(attempt);
            log::info!(
                "restarting provider '{}' (attempt {}) in {:?}",
                name,
                attempt,
                delay
            );
            tokio::time::sleep(delay).await;

            match self.connect_and_register(name).await {
                Ok(()) => {
                    log::info!("provider '{}' reconnected", name);
                    return;
                }
                Err(e) => {
                    log::error!("provider '{}' restart attempt {} failed: {}", name, attempt, e);
                    self.set_status(name, ProviderStatus::Failed).await;
                }
            }
        }
    }
}

/// Linear backoff: attempt N waits N x 5 s.
fn backoff_delay(attempt: u32) -> Duration {
    RESTART_BACKOFF_UNIT * attempt
}

/// Split a namespaced tool name at the first `:`.
pub fn split_namespaced(name: &str) -> Option<(&str, &str)> {
    let idx = name.find(':')?;
    Some((&name[..idx], &name[idx + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_namespaced() {
        assert_eq!(split_namespaced("search:query"), Some(("search", "query")));
        assert_eq!(
            split_namespaced("search:ns:deep"),
            Some(("search", "ns:deep"))
        );
        assert_eq!(split_namespaced("native_tool"), None);
    }

    #[test]
    fn test_backoff_is_linear() {
        assert_eq!(backoff_delay(1), Duration::from_secs(5));
        assert_eq!(backoff_delay(2), Duration::from_secs(10));
        assert_eq!(backoff_delay(3), Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_route_to_unconfigured_provider() {
        let server = Arc::new(McpServer::new("test", "0.0.0"));
        let manager = ProviderManager::new(server);
        let result = manager.route("ghost", "tool", json!({})).await;
        assert_eq!(
            result,
            Value::String("Error: Tool provider 'ghost' is not configured".to_string())
        );
    }

    #[tokio::test]
    async fn test_failed_spawn_marks_provider_failed() {
        let server = Arc::new(McpServer::new("test", "0.0.0"));
        let manager = ProviderManager::new(server.clone());

        let mut servers = HashMap::new();
        servers.insert(
            "ghost".to_string(),
            ServerLaunchSpec {
                command: "/nonexistent/provider-binary".to_string(),
                args: vec![],
                env: HashMap::new(),
            },
        );
        manager.start_all(servers).await;

        assert_eq!(
            manager.provider_status("ghost").await,
            Some(ProviderStatus::Failed)
        );
        assert_eq!(server.tool_count().await, 0);

        // Routing to a failed provider answers with the unavailable text.
        let result = manager.route("ghost", "tool", json!({})).await;
        assert_eq!(
            result,
            Value::String("Error: Tool provider 'ghost' is currently unavailable".to_string())
        );
    }
}

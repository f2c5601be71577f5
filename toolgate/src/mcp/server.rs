//! Tool dispatcher.
//!
//! Owns the flat tool table: native tools register at startup (gated by the
//! optional allow-list), child-provider tools register under their namespaced
//! names once discovery finishes. Dispatch validates declared required
//! arguments and hands off to the owning handler; everything else about a
//! call lives in the handler itself.
//!
//! Also implements the stdio transport: line-delimited JSON-RPC over
//! stdin/stdout for subprocess mode.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;

use super::types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, ToolDefinition, PROTOCOL_VERSION};
use crate::errors::{GatewayError, GatewayResult};

/// Type alias for async tool handler functions.
pub type ToolHandler =
    Box<dyn Fn(Value) -> Pin<Box<dyn Future<Output = GatewayResult<Value>> + Send>> + Send + Sync>;

/// The MCP server: a name, a version, and the tool table.
pub struct McpServer {
    name: String,
    version: String,
    tools: RwLock<HashMap<String, (ToolDefinition, Arc<ToolHandler>)>>,
}

impl McpServer {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            tools: RwLock::new(HashMap::new()),
        }
    }

    pub async fn tool_count(&self) -> usize {
        self.tools.read().await.len()
    }

    /// All tool definitions, sorted by name for a stable listing.
    pub async fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let tools = self.tools.read().await;
        let mut defs: Vec<ToolDefinition> = tools.values().map(|(def, _)| def.clone()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Register a tool with its handler. Re-registering a name replaces the
    /// previous entry (used when a child provider reconnects).
    pub async fn register_tool(
        &self,
        name: &str,
        description: &str,
        input_schema: Value,
        handler: ToolHandler,
    ) {
        let definition = ToolDefinition {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
        };
        self.tools
            .write()
            .await
            .insert(name.to_string(), (definition, Arc::new(handler)));
    }

    /// Remove every tool whose name starts with the given prefix.
    ///
    /// Used before re-aggregating a restarted child provider so tools it no
    /// longer offers do not linger.
    pub async fn remove_tools_with_prefix(&self, prefix: &str) -> usize {
        let mut tools = self.tools.write().await;
        let doomed: Vec<String> = tools
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect();
        for name in &doomed {
            tools.remove(name);
        }
        doomed.len()
    }

    /// Call a tool by name with raw arguments.
    ///
    /// Missing required arguments are a protocol error; the handler's own
    /// operational failures come back as text inside an `Ok`.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> GatewayResult<Value> {
        let (definition, handler) = {
            let tools = self.tools.read().await;
            let (def, handler) = tools
                .get(name)
                .ok_or_else(|| GatewayError::UnknownTool(name.to_string()))?;
            (def.clone(), Arc::clone(handler))
        };

        validate_required_arguments(&definition, &arguments)?;
        handler(arguments).await
    }

    /// Run the server over stdio: one JSON-RPC message per line.
    pub async fn run_stdio(&self) -> GatewayResult<()> {
        let stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let mut reader = BufReader::new(stdin);
        let mut line = String::new();

        loop {
            line.clear();
            let bytes_read = reader.read_line(&mut line).await?;
            if bytes_read == 0 {
                // EOF - client disconnected
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
                Ok(request) => {
                    let is_notification = request.id.is_none();
                    let response = self.handle_request(request).await;
                    if is_notification {
                        continue;
                    }
                    response
                }
                Err(e) => JsonRpcResponse::error(
                    None,
                    JsonRpcError::parse_error(format!("Parse error: {}", e)),
                ),
            };

            let response_json = serde_json::to_string(&response)?;
            stdout.write_all(response_json.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }

        Ok(())
    }

    /// Handle a single JSON-RPC request.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        log::debug!("handling request: {}", request.method);

        let result = match request.method.as_str() {
            "initialize" => Ok(self.initialize_result()),
            "notifications/initialized" | "initialized" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.tool_definitions().await })),
            "tools/call" => self.handle_tools_call(&request.params).await,
            "ping" => Ok(json!({})),
            method => {
                return JsonRpcResponse::error(request.id, JsonRpcError::method_not_found(method));
            }
        };

        match result {
            Ok(result) => JsonRpcResponse::success(request.id, result),
            Err(e) => JsonRpcResponse::error(request.id, rpc_error_for(&e)),
        }
    }

    fn initialize_result(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {
                "tools": {}
            },
            "serverInfo": {
                "name": self.name,
                "version": self.version
            }
        })
    }

    async fn handle_tools_call(&self, params: &Value) -> GatewayResult<Value> {
        let tool_name = params
            .get("name")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayError::InvalidArguments("missing tool name".to_string()))?;

        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

        let result = self.call_tool(tool_name, arguments).await?;
        Ok(wrap_tool_result(result))
    }
}

/// Map a gateway error onto the JSON-RPC error object the client sees.
pub fn rpc_error_for(error: &GatewayError) -> JsonRpcError {
    match error {
        GatewayError::UnknownTool(name) => {
            JsonRpcError::invalid_params(format!("Unknown tool: {}", name))
        }
        GatewayError::InvalidArguments(msg) => JsonRpcError::invalid_params(msg.clone()),
        other => JsonRpcError::internal(other.to_string()),
    }
}

/// Shape a handler result into MCP `tools/call` content.
///
/// Native handlers return plain text; routed child calls return a ready-made
/// content object which passes through verbatim.
fn wrap_tool_result(result: Value) -> Value {
    match result {
        Value::String(text) => json!({
            "content": [{ "type": "text", "text": text }]
        }),
        other if other.get("content").is_some() => other,
        other => json!({
            "content": [{
                "type": "text",
                "text": serde_json::to_string_pretty(&other).unwrap_or_default()
            }]
        }),
    }
}

/// Check that every argument declared `required` by the tool schema is
/// present in the call.
fn validate_required_arguments(
    definition: &ToolDefinition,
    arguments: &Value,
) -> GatewayResult<()> {
    let required = match definition.input_schema.get("required").and_then(|v| v.as_array()) {
        Some(list) => list,
        None => return Ok(()),
    };

    for key in required.iter().filter_map(|v| v.as_str()) {
        let present = arguments.get(key).map(|v| !v.is_null()).unwrap_or(false);
        if !present {
            return Err(GatewayError::InvalidArguments(format!(
                "missing required argument '{}' for tool '{}'",
                key, definition.name
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_handler() -> ToolHandler {
        Box::new(|params| Box::pin(async move { Ok(params) }))
    }

    fn text_handler(text: &'static str) -> ToolHandler {
        Box::new(move |_params| Box::pin(async move { Ok(Value::String(text.to_string())) }))
    }

    async fn test_server() -> McpServer {
        let server = McpServer::new("toolgate-test", "0.0.0");
        server
            .register_tool(
                "echo",
                "Echo arguments back",
                json!({
                    "type": "object",
                    "properties": { "message": { "type": "string" } },
                    "required": ["message"]
                }),
                echo_handler(),
            )
            .await;
        server
    }

    #[tokio::test]
    async fn test_register_and_call() {
        let server = test_server().await;
        assert_eq!(server.tool_count().await, 1);

        let result = server
            .call_tool("echo", json!({"message": "hi"}))
            .await
            .unwrap();
        assert_eq!(result["message"], "hi");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error() {
        let server = test_server().await;
        let err = server.call_tool("nope", json!({})).await.unwrap_err();
        assert!(matches!(err, GatewayError::UnknownTool(_)));
    }

    #[tokio::test]
    async fn test_missing_required_argument_is_error() {
        let server = test_server().await;
        let err = server.call_tool("echo", json!({})).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArguments(_)));

        let err = server
            .call_tool("echo", json!({"message": null}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn test_initialize_shape() {
        let server = test_server().await;
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(1)),
            method: "initialize".to_string(),
            params: json!({}),
        };
        let response = server.handle_request(request).await;
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], "toolgate-test");
        assert!(result["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn test_tools_call_wraps_text() {
        let server = test_server().await;
        server
            .register_tool("greet", "Say hello", json!({"type": "object"}), text_handler("hello"))
            .await;

        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(2)),
            method: "tools/call".to_string(),
            params: json!({"name": "greet", "arguments": {}}),
        };
        let response = server.handle_request(request).await;
        let result = response.result.unwrap();
        assert_eq!(result["content"][0]["type"], "text");
        assert_eq!(result["content"][0]["text"], "hello");
    }

    #[tokio::test]
    async fn test_remove_tools_with_prefix() {
        let server = test_server().await;
        server
            .register_tool("web:fetch", "", json!({"type": "object"}), text_handler("a"))
            .await;
        server
            .register_tool("web:search", "", json!({"type": "object"}), text_handler("b"))
            .await;

        let removed = server.remove_tools_with_prefix("web:").await;
        assert_eq!(removed, 2);
        assert_eq!(server.tool_count().await, 1);
        assert!(matches!(
            server.call_tool("web:fetch", json!({})).await.unwrap_err(),
            GatewayError::UnknownTool(_)
        ));
    }

    #[tokio::test]
    async fn test_method_not_found() {
        let server = test_server().await;
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(3)),
            method: "resources/list".to_string(),
            params: json!({}),
        };
        let response = server.handle_request(request).await;
        assert_eq!(response.error.unwrap().code, -32601);
    }
}

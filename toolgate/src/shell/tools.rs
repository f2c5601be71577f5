//! Native shell tool registration.

use std::sync::Arc;

use serde_json::{json, Value};

use super::executor::ShellExecutor;
use crate::config::AllowedToolSet;
use crate::mcp::server::McpServer;

/// Register `execute_command`, `check_process` and `send_input`, filtered by
/// the allow-list.
pub async fn register_shell_tools(
    server: &McpServer,
    executor: Arc<ShellExecutor>,
    allowed: &AllowedToolSet,
) {
    if allowed.allows("execute_command") {
        let exec = Arc::clone(&executor);
        server
            .register_tool(
                "execute_command",
                "Execute a shell command in the workspace. Returns synchronously once the \
                 command completes, or backgrounds it (returning a process id to poll with \
                 check_process) after the output-inactivity timeout elapses.",
                json!({
                    "type": "object",
                    "properties": {
                        "command": {
                            "type": "string",
                            "description": "The shell command to execute"
                        },
                        "rationale": {
                            "type": "string",
                            "description": "One-line reason this command is being run (logged only)"
                        },
                        "inactivityTimeout": {
                            "type": "integer",
                            "default": 20,
                            "description": "Seconds of no output before the call returns a backgrounded handle. Clamped to 0-600; 0 backgrounds immediately."
                        }
                    },
                    "required": ["command", "rationale"]
                }),
                Box::new(move |params| {
                    let exec = Arc::clone(&exec);
                    Box::pin(async move {
                        let command = params
                            .get("command")
                            .and_then(|v| v.as_str())
                            .unwrap_or("")
                            .to_string();
                        let rationale = params
                            .get("rationale")
                            .and_then(|v| v.as_str())
                            .map(|s| s.to_string());
                        let inactivity = params
                            .get("inactivityTimeout")
                            .and_then(|v| v.as_u64());
                        if command.trim().is_empty() {
                            return Ok(Value::String("Error: command cannot be empty".to_string()));
                        }
                        let text = exec.execute(&command, rationale, inactivity).await;
                        Ok(Value::String(text))
                    })
                }),
            )
            .await;
    }

    if allowed.allows("check_process") {
        let exec = Arc::clone(&executor);
        server
            .register_tool(
                "check_process",
                "Poll a backgrounded process: returns its final output once completed, or \
                 the current status and buffered output after a bounded wait for progress.",
                json!({
                    "type": "object",
                    "properties": {
                        "processId": {
                            "type": "string",
                            "description": "Process id returned by execute_command"
                        },
                        "rationale": {
                            "type": "string",
                            "description": "One-line reason for the poll (logged only)"
                        }
                    },
                    "required": ["processId", "rationale"]
                }),
                Box::new(move |params| {
                    let exec = Arc::clone(&exec);
                    Box::pin(async move {
                        let process_id = params
                            .get("processId")
                            .and_then(|v| v.as_str())
                            .unwrap_or("")
                            .to_string();
                        let rationale = params
                            .get("rationale")
                            .and_then(|v| v.as_str())
                            .map(|s| s.to_string());
                        let text = exec.check(&process_id, rationale.as_deref()).await;
                        Ok(Value::String(text))
                    })
                }),
            )
            .await;
    }

    if allowed.allows("send_input") {
        let exec = Arc::clone(&executor);
        server
            .register_tool(
                "send_input",
                "Write to the stdin of a still-running backgrounded process.",
                json!({
                    "type": "object",
                    "properties": {
                        "processId": {
                            "type": "string",
                            "description": "Process id returned by execute_command"
                        },
                        "input": {
                            "type": "string",
                            "description": "Data to write to the process stdin"
                        },
                        "rationale": {
                            "type": "string",
                            "description": "One-line reason for the write (logged only)"
                        },
                        "autoNewline": {
                            "type": "boolean",
                            "default": true,
                            "description": "Append a trailing newline when missing"
                        }
                    },
                    "required": ["processId", "input", "rationale"]
                }),
                Box::new(move |params| {
                    let exec = Arc::clone(&exec);
                    Box::pin(async move {
                        let process_id = params
                            .get("processId")
                            .and_then(|v| v.as_str())
                            .unwrap_or("")
                            .to_string();
                        let input = params
                            .get("input")
                            .and_then(|v| v.as_str())
                            .unwrap_or("")
                            .to_string();
                        let auto_newline = params
                            .get("autoNewline")
                            .and_then(|v| v.as_bool())
                            .unwrap_or(true);
                        if let Some(rationale) = params.get("rationale").and_then(|v| v.as_str()) {
                            log::info!("send_input id={} rationale={}", process_id, rationale);
                        }
                        let text = exec.send_input(&process_id, &input, auto_newline).await;
                        Ok(Value::String(text))
                    })
                }),
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell::registry::ProcessRegistry;

    #[tokio::test]
    async fn test_registration_respects_allow_list() {
        let server = McpServer::new("test", "0.0.0");
        let executor = Arc::new(ShellExecutor::new(ProcessRegistry::new(), 20));

        let allowed = AllowedToolSet::parse("execute_command");
        register_shell_tools(&server, executor, &allowed).await;

        assert_eq!(server.tool_count().await, 1);
        let defs = server.tool_definitions().await;
        assert_eq!(defs[0].name, "execute_command");
    }

    #[tokio::test]
    async fn test_all_three_register_by_default() {
        let server = McpServer::new("test", "0.0.0");
        let executor = Arc::new(ShellExecutor::new(ProcessRegistry::new(), 20));
        register_shell_tools(&server, executor, &AllowedToolSet::default()).await;
        assert_eq!(server.tool_count().await, 3);
    }
}

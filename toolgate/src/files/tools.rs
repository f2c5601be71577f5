//! Native file tool registration.

use std::future::Future;
use std::time::Duration;

use serde_json::{json, Value};

use super::{edit, read, search, write};
use crate::config::AllowedToolSet;
use crate::mcp::server::McpServer;
use crate::shell::output::truncate_head_tail;

/// Every file operation is bounded; a stuck filesystem must not wedge a
/// request slot.
const FILE_OP_TIMEOUT: Duration = Duration::from_secs(30);

async fn bounded<F>(op: F) -> String
where
    F: Future<Output = String>,
{
    match tokio::time::timeout(FILE_OP_TIMEOUT, op).await {
        Ok(text) => truncate_head_tail(&text),
        Err(_) => "Error: File operation timed out after 30 seconds".to_string(),
    }
}

fn arg_str(params: &Value, key: &str) -> String {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

fn log_rationale(tool: &str, params: &Value) {
    if let Some(rationale) = params.get("rationale").and_then(|v| v.as_str()) {
        log::info!("{} rationale={}", tool, rationale);
    }
}

/// Register the file tool suite, filtered by the allow-list.
pub async fn register_file_tools(server: &McpServer, allowed: &AllowedToolSet) {
    if allowed.allows("file_read") {
        server
            .register_tool(
                "file_read",
                "Read a file from the workspace with line numbers. Lines longer than 2000 \
                 characters are truncated.",
                json!({
                    "type": "object",
                    "properties": {
                        "filePath": { "type": "string", "description": "Path to the file, relative to the workspace root" },
                        "rationale": { "type": "string", "description": "One-line reason for the read (logged only)" },
                        "offset": { "type": "integer", "default": 0, "description": "Line offset to start reading from (0-based)" },
                        "limit": { "type": "integer", "default": 2000, "description": "Maximum number of lines to read" }
                    },
                    "required": ["filePath", "rationale"]
                }),
                Box::new(move |params| {
                    Box::pin(async move {
                        log_rationale("file_read", &params);
                        let path = arg_str(&params, "filePath");
                        let offset =
                            params.get("offset").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
                        let limit = params
                            .get("limit")
                            .and_then(|v| v.as_u64())
                            .unwrap_or(2000) as usize;
                        Ok(Value::String(
                            bounded(read::read_file(&path, offset, limit)).await,
                        ))
                    })
                }),
            )
            .await;
    }

    if allowed.allows("file_write") {
        server
            .register_tool(
                "file_write",
                "Write content to a workspace file verbatim, creating parent directories as \
                 needed. Read the file first before overwriting it.",
                json!({
                    "type": "object",
                    "properties": {
                        "filePath": { "type": "string", "description": "Path to the file, relative to the workspace root" },
                        "content": { "type": "string", "description": "Content to write" },
                        "rationale": { "type": "string", "description": "One-line reason for the write (logged only)" }
                    },
                    "required": ["filePath", "content", "rationale"]
                }),
                Box::new(move |params| {
                    Box::pin(async move {
                        log_rationale("file_write", &params);
                        let path = arg_str(&params, "filePath");
                        let content = arg_str(&params, "content");
                        Ok(Value::String(
                            bounded(write::write_file(&path, &content)).await,
                        ))
                    })
                }),
            )
            .await;
    }

    if allowed.allows("file_edit") {
        server
            .register_tool(
                "file_edit",
                "Replace an exact substring in a workspace file (first occurrence, or every \
                 occurrence with replaceAll). Fails when the string is absent.",
                json!({
                    "type": "object",
                    "properties": {
                        "filePath": { "type": "string", "description": "Path to the file, relative to the workspace root" },
                        "oldString": { "type": "string", "description": "Exact text to replace" },
                        "newString": { "type": "string", "description": "Replacement text" },
                        "rationale": { "type": "string", "description": "One-line reason for the edit (logged only)" },
                        "replaceAll": { "type": "boolean", "default": false, "description": "Replace every occurrence instead of the first" }
                    },
                    "required": ["filePath", "oldString", "newString", "rationale"]
                }),
                Box::new(move |params| {
                    Box::pin(async move {
                        log_rationale("file_edit", &params);
                        let path = arg_str(&params, "filePath");
                        let old_string = arg_str(&params, "oldString");
                        let new_string = arg_str(&params, "newString");
                        let replace_all = params
                            .get("replaceAll")
                            .and_then(|v| v.as_bool())
                            .unwrap_or(false);
                        Ok(Value::String(
                            bounded(edit::edit_file(&path, &old_string, &new_string, replace_all))
                                .await,
                        ))
                    })
                }),
            )
            .await;
    }

    if allowed.allows("file_ls") {
        server
            .register_tool(
                "file_ls",
                "List workspace files as a tree. Version-control metadata, build outputs and \
                 editor cruft are skipped by default; additional ignore globs may be supplied.",
                json!({
                    "type": "object",
                    "properties": {
                        "rationale": { "type": "string", "description": "One-line reason for the listing (logged only)" },
                        "path": { "type": "string", "default": ".", "description": "Directory to list, relative to the workspace root" },
                        "ignore": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "Additional glob patterns to skip"
                        }
                    },
                    "required": ["rationale"]
                }),
                Box::new(move |params| {
                    Box::pin(async move {
                        log_rationale("file_ls", &params);
                        let path = params
                            .get("path")
                            .and_then(|v| v.as_str())
                            .unwrap_or(".")
                            .to_string();
                        let ignore: Vec<String> = params
                            .get("ignore")
                            .and_then(|v| v.as_array())
                            .map(|items| {
                                items
                                    .iter()
                                    .filter_map(|v| v.as_str().map(|s| s.to_string()))
                                    .collect()
                            })
                            .unwrap_or_default();
                        Ok(Value::String(bounded(search::list_dir(&path, &ignore)).await))
                    })
                }),
            )
            .await;
    }

    if allowed.allows("file_glob") {
        server
            .register_tool(
                "file_glob",
                "Find workspace files matching a glob pattern, newest first.",
                json!({
                    "type": "object",
                    "properties": {
                        "pattern": { "type": "string", "description": "Glob pattern, e.g. \"**/*.rs\"" },
                        "rationale": { "type": "string", "description": "One-line reason for the search (logged only)" },
                        "path": { "type": "string", "default": ".", "description": "Directory to search, relative to the workspace root" },
                        "maxResults": { "type": "integer", "default": 100, "description": "Maximum number of files to return" }
                    },
                    "required": ["pattern", "rationale"]
                }),
                Box::new(move |params| {
                    Box::pin(async move {
                        log_rationale("file_glob", &params);
                        let pattern = arg_str(&params, "pattern");
                        let path = params
                            .get("path")
                            .and_then(|v| v.as_str())
                            .unwrap_or(".")
                            .to_string();
                        let max_results = params
                            .get("maxResults")
                            .and_then(|v| v.as_u64())
                            .unwrap_or(100) as usize;
                        Ok(Value::String(
                            bounded(search::glob_files(&pattern, &path, max_results)).await,
                        ))
                    })
                }),
            )
            .await;
    }

    if allowed.allows("file_grep") {
        server
            .register_tool(
                "file_grep",
                "Search workspace file contents with a regular expression. Matches are grouped \
                 by file, newest files first; matched lines longer than 200 characters are \
                 truncated.",
                json!({
                    "type": "object",
                    "properties": {
                        "pattern": { "type": "string", "description": "Regular expression to search for" },
                        "rationale": { "type": "string", "description": "One-line reason for the search (logged only)" },
                        "path": { "type": "string", "default": ".", "description": "Directory to search, relative to the workspace root" },
                        "include": { "type": "string", "description": "Glob filter on file names, e.g. \"*.rs\"" },
                        "caseInsensitive": { "type": "boolean", "default": false, "description": "Match case-insensitively" },
                        "maxResults": { "type": "integer", "default": 100, "description": "Maximum number of matches to return" }
                    },
                    "required": ["pattern", "rationale"]
                }),
                Box::new(move |params| {
                    Box::pin(async move {
                        log_rationale("file_grep", &params);
                        let pattern = arg_str(&params, "pattern");
                        let path = params
                            .get("path")
                            .and_then(|v| v.as_str())
                            .unwrap_or(".")
                            .to_string();
                        let include = params
                            .get("include")
                            .and_then(|v| v.as_str())
                            .map(|s| s.to_string());
                        let case_insensitive = params
                            .get("caseInsensitive")
                            .and_then(|v| v.as_bool())
                            .unwrap_or(false);
                        let max_results = params
                            .get("maxResults")
                            .and_then(|v| v.as_u64())
                            .unwrap_or(100) as usize;
                        Ok(Value::String(
                            bounded(search::grep_files(
                                &pattern,
                                &path,
                                include.as_deref(),
                                case_insensitive,
                                max_results,
                            ))
                            .await,
                        ))
                    })
                }),
            )
            .await;
    }
}

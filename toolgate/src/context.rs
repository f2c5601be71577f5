//! Ambient per-call execution context.
//!
//! Each RPC call runs inside a task-local scope carrying the optional
//! execution id taken from the `Execution-Id` request header. The id selects
//! the workspace root that all file and command operations resolve their
//! paths against for the duration of that call.

use std::future::Future;
use std::path::PathBuf;

use crate::config::DEFAULT_WORKSPACE_ROOT;

/// Ambient state for one in-flight RPC call.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    /// Workspace selector from the `Execution-Id` header, if any.
    pub execution_id: Option<String>,
}

impl ExecutionContext {
    pub fn with_execution_id(id: impl Into<String>) -> Self {
        Self {
            execution_id: Some(id.into()),
        }
    }
}

tokio::task_local! {
    static EXECUTION_CONTEXT: ExecutionContext;
}

/// Run a future inside the given execution context.
pub async fn scope<F>(ctx: ExecutionContext, fut: F) -> F::Output
where
    F: Future,
{
    EXECUTION_CONTEXT.scope(ctx, fut).await
}

/// The context of the current call, or the default context when running
/// outside a scoped request (stdio transport, tests).
pub fn current() -> ExecutionContext {
    EXECUTION_CONTEXT
        .try_with(|ctx| ctx.clone())
        .unwrap_or_default()
}

/// Base directory under which per-execution workspaces live.
///
/// `TOOLGATE_WORKSPACE_ROOT` overrides the container default so the server
/// can run outside the image (local runs, tests).
pub fn workspace_base() -> PathBuf {
    match std::env::var("TOOLGATE_WORKSPACE_ROOT") {
        Ok(raw) if !raw.trim().is_empty() => PathBuf::from(raw),
        _ => PathBuf::from(DEFAULT_WORKSPACE_ROOT),
    }
}

/// Workspace root for the current call: `<base>/<execution-id>` when an id is
/// set, the base itself otherwise.
pub fn workspace_root() -> PathBuf {
    let base = workspace_base();
    match current().execution_id {
        Some(id) => base.join(sanitize_component(&id)),
        None => base,
    }
}

/// Workspace root for the current call, created on demand.
pub async fn ensure_workspace_root() -> std::io::Result<PathBuf> {
    let root = workspace_root();
    tokio::fs::create_dir_all(&root).await?;
    Ok(root)
}

/// Sanitize an execution id for use as a directory name.
///
/// Keeps alphanumerics, hyphens, underscores and dots; everything else
/// becomes an underscore, with runs collapsed.
fn sanitize_component(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut last_was_underscore = false;

    for c in input.chars() {
        if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
            result.push(c);
            last_was_underscore = c == '_';
        } else if !last_was_underscore {
            result.push('_');
            last_was_underscore = true;
        }
    }

    let trimmed = result.trim_matches(|c| c == '_' || c == '.').to_string();
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed
    }
}

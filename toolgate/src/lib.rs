//! toolgate: an MCP gateway for containerized agent execution.
//!
//! Exposes a fixed set of native tools (an interactive shell executor with a
//! background process registry, plus a workspace-scoped file tool suite) over
//! the MCP Streamable HTTP transport, and federates additional out-of-process
//! MCP servers by re-exporting their tools under a per-server name prefix.

pub mod config;
pub mod context;
pub mod errors;
pub mod files;
pub mod mcp;
pub mod providers;
pub mod shell;

pub use errors::{GatewayError, GatewayResult};

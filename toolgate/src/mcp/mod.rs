//! MCP protocol surface: JSON-RPC types, the tool dispatcher, the Streamable
//! HTTP front end, and the stdio client used to talk to child providers.

pub mod http_transport;
pub mod server;
pub mod stdio_client;
pub mod types;

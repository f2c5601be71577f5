//! Child tool-server configuration file.
//!
//! A single JSON file maps a short provider name to its launch spec:
//!
//! ```json
//! { "servers": { "search": { "command": "npx", "args": ["-y", "@mcp/search"] } } }
//! ```
//!
//! A missing file is a normal case: the aggregator is simply empty.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::GatewayResult;

/// How to launch one child provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerLaunchSpec {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServersFile {
    #[serde(default)]
    servers: HashMap<String, ServerLaunchSpec>,
}

/// Load the configuration file. Absent file yields an empty map.
pub async fn load_servers_config(path: &Path) -> GatewayResult<HashMap<String, ServerLaunchSpec>> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!("no tool-server config at {}", path.display());
            return Ok(HashMap::new());
        }
        Err(e) => return Err(e.into()),
    };

    let parsed: ServersFile = serde_json::from_str(&raw)?;
    Ok(parsed.servers)
}

//! Server configuration.

use std::collections::HashSet;
use std::path::PathBuf;

use rand::Rng;

/// Default workspace base directory inside the container.
pub const DEFAULT_WORKSPACE_ROOT: &str = "/app/workspace";

/// Default location of the child tool-server configuration file.
pub const DEFAULT_SERVERS_CONFIG: &str = "/app/config/servers.json";

/// Default per-call inactivity budget for `execute_command`, in seconds.
pub const DEFAULT_INACTIVITY_SECS: u64 = 20;

/// HTTP transport configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    /// Bearer token required on every non-preflight request.
    pub token: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            token: generate_token(),
        }
    }
}

/// Generate a random opaque bearer token.
pub fn generate_token() -> String {
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

/// Optional allow-list of native tool names, loaded once from `ALLOWED_TOOLS`.
///
/// When the variable is absent every native tool registers; when present only
/// the named tools do. Child-provider tools are not gated by this set.
#[derive(Debug, Clone, Default)]
pub struct AllowedToolSet {
    names: Option<HashSet<String>>,
}

impl AllowedToolSet {
    /// Load from the `ALLOWED_TOOLS` environment variable.
    pub fn from_env() -> Self {
        match std::env::var("ALLOWED_TOOLS") {
            Ok(raw) => Self::parse(&raw),
            Err(_) => Self { names: None },
        }
    }

    /// Parse a comma-separated list of tool names.
    pub fn parse(raw: &str) -> Self {
        let names: HashSet<String> = raw
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        Self { names: Some(names) }
    }

    /// Whether the given native tool may register.
    pub fn allows(&self, name: &str) -> bool {
        match &self.names {
            Some(names) => names.contains(name),
            None => true,
        }
    }
}

/// Resolve the path of the child tool-server configuration file.
pub fn servers_config_path(override_path: Option<&str>) -> PathBuf {
    match override_path {
        Some(p) => PathBuf::from(p),
        None => PathBuf::from(DEFAULT_SERVERS_CONFIG),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_token_shape() {
        let token = generate_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(generate_token(), token);
    }

    #[test]
    fn test_allowed_tools_absent_allows_all() {
        let set = AllowedToolSet::default();
        assert!(set.allows("execute_command"));
        assert!(set.allows("file_read"));
    }

    #[test]
    fn test_allowed_tools_parse_filters() {
        let set = AllowedToolSet::parse("file_read, file_write ,execute_command,");
        assert!(set.allows("file_read"));
        assert!(set.allows("file_write"));
        assert!(set.allows("execute_command"));
        assert!(!set.allows("send_input"));
        assert!(!set.allows("file_grep"));
    }
}

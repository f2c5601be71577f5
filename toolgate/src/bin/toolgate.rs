//! toolgate server binary.
//!
//! Supports two transports:
//!   - HTTP (default): Streamable HTTP for a persistent long-running daemon
//!   - stdio: JSON-RPC over stdin/stdout for subprocess mode
//!
//! Usage:
//!   toolgate                      # HTTP on 0.0.0.0:3000
//!   toolgate --port 8080          # HTTP on custom port
//!   toolgate --transport stdio    # stdio mode

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use toolgate::config::{self, AllowedToolSet, HttpConfig};
use toolgate::files;
use toolgate::mcp::http_transport::run_http_transport;
use toolgate::mcp::server::McpServer;
use toolgate::providers::{load_servers_config, ProviderManager};
use toolgate::shell::{self, ProcessRegistry, ShellExecutor};

/// Delay before child-provider discovery, so the native tool surface is
/// complete by the time the first clients connect.
const PROVIDER_SETTLE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Transport {
    /// Streamable HTTP transport (persistent daemon)
    Http,
    /// Stdio transport (subprocess mode)
    Stdio,
}

#[derive(Parser, Debug)]
#[command(version, about = "toolgate - MCP gateway for shell and workspace file access", author)]
struct Args {
    /// Transport to use
    #[arg(short, long, value_enum, default_value = "http")]
    transport: Transport,

    /// Host to bind for HTTP transport
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port for HTTP transport
    #[arg(short, long, default_value = "3000")]
    port: u16,

    /// Bearer token; generated when absent
    #[arg(long)]
    token: Option<String>,

    /// Default output-inactivity budget for execute_command, in seconds
    #[arg(long, default_value_t = config::DEFAULT_INACTIVITY_SECS)]
    inactivity_timeout: u64,

    /// Path to the child tool-server configuration file
    #[arg(long, default_value = config::DEFAULT_SERVERS_CONFIG)]
    servers_config: String,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if args.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    eprintln!("[toolgate] starting (transport: {:?})", args.transport);

    let token = match &args.token {
        Some(token) => token.clone(),
        None => {
            let token = config::generate_token();
            eprintln!("[toolgate] generated bearer token: {}", token);
            token
        }
    };

    // Core components: dispatcher, process registry, executor.
    let server = Arc::new(McpServer::new("toolgate", env!("CARGO_PKG_VERSION")));
    let registry = ProcessRegistry::new();
    let executor = Arc::new(ShellExecutor::new(registry.clone(), args.inactivity_timeout));

    let allowed = AllowedToolSet::from_env();
    shell::tools::register_shell_tools(&server, Arc::clone(&executor), &allowed).await;
    files::tools::register_file_tools(&server, &allowed).await;
    eprintln!("[toolgate] registered {} native tools", server.tool_count().await);

    // Child providers register after a settle interval, without blocking the
    // transport from coming up.
    let manager = ProviderManager::new(Arc::clone(&server));
    let servers_config = std::path::PathBuf::from(&args.servers_config);
    tokio::spawn(async move {
        tokio::time::sleep(PROVIDER_SETTLE).await;
        match load_servers_config(&servers_config).await {
            Ok(servers) if servers.is_empty() => {
                log::info!("no child providers configured");
            }
            Ok(servers) => {
                eprintln!("[toolgate] starting {} child provider(s)", servers.len());
                manager.start_all(servers).await;
            }
            Err(e) => {
                log::error!(
                    "failed to load tool-server config {}: {}",
                    servers_config.display(),
                    e
                );
            }
        }
    });

    match args.transport {
        Transport::Http => {
            let config = HttpConfig {
                host: args.host,
                port: args.port,
                token,
            };
            run_http_transport(server, registry, config).await?;
        }
        Transport::Stdio => {
            eprintln!("[toolgate] listening on stdio...");
            server.run_stdio().await?;
            registry.drain().await;
        }
    }

    Ok(())
}

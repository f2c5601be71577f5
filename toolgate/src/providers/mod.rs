//! Child tool-provider aggregation: configuration, schema translation,
//! lifecycle and routing.

pub mod config;
pub mod manager;
pub mod schema;

pub use config::{load_servers_config, ServerLaunchSpec};
pub use manager::{ProviderManager, ProviderStatus};

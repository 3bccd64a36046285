use serde::Deserialize;
use serde_json::Value;
use std::net::SocketAddr;
use std::time::Duration;

use crate::collection::Capabilities;
use crate::rules::config::RuleNodeConfig;

/// Root configuration for fieldgated
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// RPC server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Admin API configuration
    #[serde(default)]
    pub admin: AdminConfig,

    /// Telemetry settings
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Storage backend
    #[serde(default)]
    pub storage: StorageConfig,

    /// Identity tokens
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Collections exposed over RPC
    #[serde(default)]
    pub collections: Vec<CollectionConfig>,
}

/// RPC server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_listen_address")]
    pub address: SocketAddr,

    /// Connection limits
    #[serde(default)]
    pub limits: ConnectionLimits,

    /// Shutdown behavior
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_listen_address(),
            limits: ConnectionLimits::default(),
            shutdown: ShutdownConfig::default(),
        }
    }
}

fn default_listen_address() -> SocketAddr {
    "127.0.0.1:4850".parse().expect("valid default address")
}

/// Connection limits
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionLimits {
    /// Maximum concurrent connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Connection idle timeout
    #[serde(default = "default_idle_timeout", with = "humantime_serde")]
    pub idle_timeout: Duration,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            idle_timeout: default_idle_timeout(),
        }
    }
}

fn default_max_connections() -> usize {
    10000
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(300)
}

/// Shutdown configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownConfig {
    /// How long to wait for connections to drain
    #[serde(default = "default_drain_timeout", with = "humantime_serde")]
    pub drain_timeout: Duration,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_timeout: default_drain_timeout(),
        }
    }
}

fn default_drain_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Admin API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    /// Whether the admin endpoint is served
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Bind address
    #[serde(default = "default_admin_address")]
    pub address: SocketAddr,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            address: default_admin_address(),
        }
    }
}

fn default_admin_address() -> SocketAddr {
    "127.0.0.1:4851".parse().expect("valid default address")
}

fn default_true() -> bool {
    true
}

/// Telemetry settings
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// JSON log format
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// Backend type
    #[serde(default)]
    pub backend: StorageBackend,
}

/// Available storage backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
}

/// Identity provider configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentityConfig {
    /// Static token-to-claims entries
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

/// One token entry
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    /// The opaque token clients present
    pub token: String,

    /// Claims attached to the resulting identity
    #[serde(default)]
    pub claims: Value,
}

/// A collection declared in config
#[derive(Debug, Clone, Deserialize)]
pub struct CollectionConfig {
    /// Collection name (the first target segment on the wire)
    pub name: String,

    /// Nested rule declaration
    #[serde(default)]
    pub rules: RuleNodeConfig,

    /// Supported data operations
    #[serde(default)]
    pub capabilities: CapabilitiesConfig,
}

/// Capability flags for a config-declared collection
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CapabilitiesConfig {
    #[serde(default = "default_true")]
    pub document: bool,

    #[serde(default = "default_true")]
    pub save: bool,

    #[serde(default = "default_true")]
    pub validate: bool,

    #[serde(default = "default_true")]
    pub query: bool,

    #[serde(default = "default_true")]
    pub create: bool,
}

impl Default for CapabilitiesConfig {
    fn default() -> Self {
        Self {
            document: true,
            save: true,
            validate: true,
            query: true,
            create: true,
        }
    }
}

impl From<CapabilitiesConfig> for Capabilities {
    fn from(config: CapabilitiesConfig) -> Self {
        Self {
            document: config.document,
            save: config.save,
            validate: config.validate,
            query: config.query,
            create: config.create,
        }
    }
}

//! Configuration loading and management.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server information.
    pub server: ServerConfig,
    /// Network listen configuration.
    pub listen: ListenConfig,
    /// Shared store configuration.
    pub store: StoreConfig,
    /// Room policy configuration.
    #[serde(default)]
    pub rooms: RoomsConfig,
}

/// Server identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Instance name, used in logs (e.g., "roomd-1").
    pub name: String,
    /// Prometheus metrics port. 0 disables the endpoint (used by tests).
    pub metrics_port: Option<u16>,
}

/// Network listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Address to bind the WebSocket listener to (e.g., "0.0.0.0:7380").
    pub address: SocketAddr,
    /// Origins allowed during the websocket handshake. Empty allows all.
    #[serde(default)]
    pub allow_origins: Vec<String>,
}

/// Shared store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Redis connection URL (e.g., "redis://127.0.0.1:6379/0").
    pub url: String,
    /// Per-room lease time-to-live in milliseconds.
    #[serde(default = "default_lease_ttl_ms")]
    pub lease_ttl_ms: u64,
}

fn default_lease_ttl_ms() -> u64 {
    3_000
}

/// Room policy configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RoomsConfig {
    /// Whether a user may belong to more than one room at a time.
    #[serde(default)]
    pub allow_multiple_rooms: bool,
}

impl Default for RoomsConfig {
    fn default() -> Self {
        Self {
            allow_multiple_rooms: false,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

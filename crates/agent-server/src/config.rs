//! Server configuration from the environment.

use std::path::PathBuf;
use std::time::Duration;

use agent_core::session::DEFAULT_HISTORY_LIMIT;
use agent_gateway::models::DEFAULT_MODEL_FILE;
use agent_gateway::registry::DEFAULT_REGISTRY_FILE;
use agent_gateway::{GatewayError, Result};

pub const DEFAULT_MCP_SERVER: &str = "http://localhost:8000/sse";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,

    /// Endpoint connected at startup and preselected in forms
    pub default_mcp_server: String,

    pub servers_file: PathBuf,
    pub model_file: PathBuf,

    /// Exchanges retained per session
    pub history_limit: usize,

    /// Sessions idle longer than this are dropped
    pub idle_ttl: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5001".into(),
            default_mcp_server: DEFAULT_MCP_SERVER.into(),
            servers_file: DEFAULT_REGISTRY_FILE.into(),
            model_file: DEFAULT_MODEL_FILE.into(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            idle_ttl: Duration::from_secs(3600),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            bind_addr: env_or("BIND_ADDR", defaults.bind_addr),
            default_mcp_server: env_or("DEFAULT_MCP_SERVER", defaults.default_mcp_server),
            servers_file: std::env::var("MCP_SERVERS_FILE").map_or(defaults.servers_file, PathBuf::from),
            model_file: std::env::var("MODEL_LIST_FILE").map_or(defaults.model_file, PathBuf::from),
            history_limit: parse_env("SESSION_HISTORY_LIMIT")?.unwrap_or(defaults.history_limit),
            idle_ttl: parse_env("SESSION_IDLE_TTL_SECS")?
                .map_or(defaults.idle_ttl, Duration::from_secs),
        })
    }
}

pub fn env_or(key: &str, default: String) -> String {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty()).unwrap_or(default)
}

/// Unset is `None`; set but unparseable is a config error.
fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| GatewayError::Config(format!("{key} must be a number, got '{raw}'"))),
        Err(_) => Ok(None),
    }
}

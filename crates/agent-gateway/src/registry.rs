//! MCP server registry stored as `{"mcpServers": {name: {...}}}` JSON.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{GatewayError, Result};

pub const DEFAULT_REGISTRY_FILE: &str = "mcp_servers.json";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    pub url: String,

    #[serde(default = "default_command")]
    pub command: String,

    #[serde(default = "default_transport")]
    pub transport: String,

    #[serde(default)]
    pub allow_http: bool,
}

fn default_command() -> String {
    "npx".into()
}

fn default_transport() -> String {
    "sse-only".into()
}

impl ServerEntry {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            command: default_command(),
            transport: default_transport(),
            allow_http: false,
        }
    }
}

#[derive(Default, Serialize, Deserialize)]
struct RegistryFile {
    #[serde(rename = "mcpServers", default)]
    servers: BTreeMap<String, ServerEntry>,

    /// Unrelated top-level keys survive a rewrite
    #[serde(flatten)]
    other: serde_json::Map<String, serde_json::Value>,
}

pub struct ServerRegistry {
    path: PathBuf,
    /// Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl ServerRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path from `MCP_SERVERS_FILE`, or `mcp_servers.json`
    pub fn from_env() -> Self {
        Self::new(std::env::var("MCP_SERVERS_FILE").unwrap_or_else(|_| DEFAULT_REGISTRY_FILE.into()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Configured servers by name. A missing file is an empty registry.
    pub async fn list(&self) -> Result<BTreeMap<String, ServerEntry>> {
        Ok(self.read().await?.servers)
    }

    /// Insert or replace `name`, rewriting the whole file. The new content
    /// goes to a sibling file that is renamed over the old one.
    pub async fn add(&self, name: &str, entry: ServerEntry) -> Result<()> {
        let name = name.trim();
        if name.is_empty() || entry.url.trim().is_empty() {
            return Err(GatewayError::Config("server name and URL are required".into()));
        }

        let _guard = self.write_lock.lock().await;
        let mut file = self.read().await?;
        file.servers.insert(name.to_string(), entry);

        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| GatewayError::Config(format!("serialize server registry: {e}")))?;
        let staged = self.staging_path();
        tokio::fs::write(&staged, json)
            .await
            .map_err(|e| GatewayError::Config(format!("write {}: {e}", staged.display())))?;
        if let Err(e) = tokio::fs::rename(&staged, &self.path).await {
            let _ = tokio::fs::remove_file(&staged).await;
            return Err(GatewayError::Config(format!("replace {}: {e}", self.path.display())));
        }

        tracing::info!(name, path = %self.path.display(), "Server added to registry");
        Ok(())
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn read(&self) -> Result<RegistryFile> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                GatewayError::Config(format!("malformed {}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(RegistryFile::default()),
            Err(e) => Err(GatewayError::Config(format!("read {}: {e}", self.path.display()))),
        }
    }
}

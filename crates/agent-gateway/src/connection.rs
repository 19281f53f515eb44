//! Connection Manager
//!
//! Owns the single process-wide pairing of a tool-source client and the
//! agent built over its tools. Queries share the live connection through a
//! read lock; switching to another endpoint takes the write lock, so a
//! rebuild waits for in-flight queries and at most one connection is ever
//! live.
//!
//! ```text
//!            ensure_connection(E)
//!   Absent ───────────────────────▶ Live(E)
//!     ▲   connect fails               │  ensure_connection(E') / teardown()
//!     └───────────────────────────────┘  / transport died (old source closed first)
//! ```

use std::sync::Arc;

use agent_core::tool::{Tool, ToolRegistry};
use agent_core::{Agent, AgentConfig, LlmProvider};
use agent_mcp::{McpClient, McpClientConfig, McpTool};
use async_trait::async_trait;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

use crate::error::{GatewayError, Result};

/// An open connection to something that provides tools.
#[async_trait]
pub trait ToolSource: Send + Sync {
    async fn list_tools(&self) -> anyhow::Result<Vec<Arc<dyn Tool>>>;

    /// Release the transport
    async fn close(&self) -> anyhow::Result<()>;

    /// False once the transport has gone away underneath us
    fn is_alive(&self) -> bool {
        true
    }
}

/// Opens [`ToolSource`]s by endpoint URL.
#[async_trait]
pub trait ToolSourceConnector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> anyhow::Result<Box<dyn ToolSource>>;
}

/// Connector for MCP servers over HTTP+SSE
#[derive(Default)]
pub struct McpConnector {
    config: McpClientConfig,
}

impl McpConnector {
    pub const fn new(config: McpClientConfig) -> Self {
        Self { config }
    }
}

struct McpSource {
    client: Arc<McpClient>,
}

#[async_trait]
impl ToolSource for McpSource {
    async fn list_tools(&self) -> anyhow::Result<Vec<Arc<dyn Tool>>> {
        let definitions = self.client.list_tools().await?;
        Ok(McpTool::wrap_all(&self.client, definitions))
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.client.close().await;
        Ok(())
    }

    fn is_alive(&self) -> bool {
        !self.client.is_closed()
    }
}

#[async_trait]
impl ToolSourceConnector for McpConnector {
    async fn connect(&self, endpoint: &str) -> anyhow::Result<Box<dyn ToolSource>> {
        let client = McpClient::connect(endpoint, &self.config).await?;
        Ok(Box::new(McpSource {
            client: Arc::new(client),
        }))
    }
}

/// Live tool source plus the agent bound to its tools
pub struct Connection {
    endpoint: String,
    source: Box<dyn ToolSource>,
    agent: Agent,
}

impl Connection {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub const fn agent(&self) -> &Agent {
        &self.agent
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.agent.tools().names()
    }

    fn serves(&self, endpoint: &str) -> bool {
        self.endpoint == endpoint && self.source.is_alive()
    }

    async fn close(self) {
        if let Err(e) = self.source.close().await {
            tracing::warn!(endpoint = %self.endpoint, error = %e, "Error closing tool source");
        }
    }
}

pub enum ConnectionState {
    Absent,
    Live(Connection),
}

impl ConnectionState {
    fn live(&self) -> Option<&Connection> {
        match self {
            Self::Live(connection) => Some(connection),
            Self::Absent => None,
        }
    }
}

/// Shared access to the live connection; a rebuild waits until every
/// handle has been dropped.
pub type ConnectionHandle = OwnedRwLockReadGuard<ConnectionState, Connection>;

pub struct ConnectionManager {
    state: Arc<RwLock<ConnectionState>>,
    connector: Arc<dyn ToolSourceConnector>,
    provider: Arc<dyn LlmProvider>,
    agent_config: AgentConfig,
}

impl ConnectionManager {
    pub fn new(
        connector: Arc<dyn ToolSourceConnector>,
        provider: Arc<dyn LlmProvider>,
        agent_config: AgentConfig,
    ) -> Self {
        Self {
            state: Arc::new(RwLock::new(ConnectionState::Absent)),
            connector,
            provider,
            agent_config,
        }
    }

    /// Return the live connection for `endpoint`, rebuilding it if the
    /// current one is absent, bound elsewhere or its transport has died.
    pub async fn ensure_connection(&self, endpoint: &str) -> Result<ConnectionHandle> {
        let read = self.state.clone().read_owned().await;
        if let Ok(handle) = OwnedRwLockReadGuard::try_map(read, |s| {
            s.live().filter(|c| c.serves(endpoint))
        }) {
            return Ok(handle);
        }

        let mut write = self.state.clone().write_owned().await;
        // another caller may have rebuilt while we waited
        if write.live().is_none_or(|c| !c.serves(endpoint)) {
            self.transition(&mut write, endpoint).await?;
        }

        OwnedRwLockReadGuard::try_map(OwnedRwLockWriteGuard::downgrade(write), ConnectionState::live)
            .map_err(|_| GatewayError::Connection {
                endpoint: endpoint.to_string(),
                reason: "connection vanished after rebuild".into(),
            })
    }

    /// Close the live connection, if any.
    pub async fn teardown(&self) {
        let mut state = self.state.write().await;
        if let ConnectionState::Live(old) = std::mem::replace(&mut *state, ConnectionState::Absent) {
            tracing::info!(endpoint = %old.endpoint, "Tearing down connection");
            old.close().await;
        }
    }

    /// Endpoint of the live connection
    pub async fn current_endpoint(&self) -> Option<String> {
        self.state.read().await.live().map(|c| c.endpoint.clone())
    }

    /// The only place the state changes. Leaves `Absent` on failure.
    async fn transition(&self, state: &mut ConnectionState, endpoint: &str) -> Result<()> {
        if let ConnectionState::Live(old) = std::mem::replace(state, ConnectionState::Absent) {
            if old.endpoint == endpoint {
                tracing::warn!(endpoint, "Tool source closed, rebuilding connection");
            } else {
                tracing::info!(from = %old.endpoint, to = endpoint, "Endpoint changed, rebuilding connection");
            }
            old.close().await;
        }

        *state = ConnectionState::Live(self.establish(endpoint).await?);
        Ok(())
    }

    async fn establish(&self, endpoint: &str) -> Result<Connection> {
        let failed = |e: &anyhow::Error| {
            tracing::error!(endpoint, error = %format!("{e:#}"), "Failed to establish connection");
            GatewayError::Connection {
                endpoint: endpoint.to_string(),
                reason: format!("{e:#}"),
            }
        };

        let source = self.connector.connect(endpoint).await.map_err(|e| failed(&e))?;
        let tools = match source.list_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                if let Err(close_err) = source.close().await {
                    tracing::warn!(endpoint, error = %close_err, "Error closing tool source");
                }
                return Err(failed(&e));
            }
        };

        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register_arc(tool);
        }
        tracing::info!(endpoint, tools = ?registry.names(), "Connection established");

        let agent = Agent::new(
            self.provider.clone(),
            Arc::new(registry),
            self.agent_config.clone(),
        );

        Ok(Connection {
            endpoint: endpoint.to_string(),
            source,
            agent,
        })
    }
}

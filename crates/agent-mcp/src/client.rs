//! MCP client: handshake, tool discovery and tool invocation.

use std::time::Duration;

use serde_json::{Value, json};

use crate::error::{McpError, Result};
use crate::transport::SseTransport;
use crate::types::{
    CallToolResult, Implementation, InitializeResult, ListToolsResult, McpToolDefinition,
    PROTOCOL_VERSION,
};

#[derive(Debug, Clone)]
pub struct McpClientConfig {
    /// Sent as `clientInfo` during `initialize`
    pub client_info: Implementation,

    /// Bound on opening the stream and completing `initialize`
    pub handshake_timeout: Duration,

    /// Bound on each request once connected
    pub request_timeout: Duration,
}

impl Default for McpClientConfig {
    fn default() -> Self {
        Self {
            client_info: Implementation {
                name: "mcp-agent-gateway".into(),
                version: env!("CARGO_PKG_VERSION").into(),
            },
            handshake_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(120),
        }
    }
}

/// An initialized session with one MCP server.
pub struct McpClient {
    endpoint: String,
    transport: SseTransport,
    server_info: Option<Implementation>,
}

impl McpClient {
    /// Open the transport and run the `initialize` handshake.
    pub async fn connect(endpoint: &str, config: &McpClientConfig) -> Result<Self> {
        let transport =
            SseTransport::connect(endpoint, config.handshake_timeout, config.request_timeout)
                .await?;

        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": config.client_info,
        });

        let init = match tokio::time::timeout(
            config.handshake_timeout,
            transport.request("initialize", Some(params)),
        )
        .await
        {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                transport.close().await;
                return Err(McpError::Handshake(e.to_string()));
            }
            Err(_) => {
                transport.close().await;
                return Err(McpError::Handshake(format!(
                    "initialize timed out after {}s",
                    config.handshake_timeout.as_secs()
                )));
            }
        };

        let init: InitializeResult = serde_json::from_value(init)?;
        transport.notify("notifications/initialized", None).await?;

        tracing::info!(
            endpoint,
            server = init.server_info.as_ref().map_or("unknown", |s| s.name.as_str()),
            protocol = init.protocol_version.as_deref().unwrap_or(PROTOCOL_VERSION),
            "Connected to MCP server"
        );

        Ok(Self {
            endpoint: endpoint.to_string(),
            transport,
            server_info: init.server_info,
        })
    }

    /// Every tool the server offers, following pagination cursors.
    pub async fn list_tools(&self) -> Result<Vec<McpToolDefinition>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let page: ListToolsResult =
                serde_json::from_value(self.transport.request("tools/list", params).await?)?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        tracing::debug!(endpoint = %self.endpoint, count = tools.len(), "Listed MCP tools");
        Ok(tools)
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        let result = self
            .transport
            .request("tools/call", Some(json!({ "name": name, "arguments": arguments })))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn close(&self) {
        self.transport.close().await;
        tracing::info!(endpoint = %self.endpoint, "MCP connection closed");
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub const fn server_info(&self) -> Option<&Implementation> {
        self.server_info.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.transport.is_closed()
    }
}

//! # agent-mcp
//!
//! Client for Model Context Protocol servers reached over HTTP+SSE.
//!
//! ```rust,ignore
//! let client = Arc::new(McpClient::connect("http://localhost:8000/sse", &McpClientConfig::default()).await?);
//! let tools = McpTool::wrap_all(&client, client.list_tools().await?);
//! ```

pub mod client;
pub mod error;
pub mod sse;
pub mod tool;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

pub use client::{McpClient, McpClientConfig};
pub use error::{McpError, Result};
pub use tool::McpTool;
pub use types::McpToolDefinition;

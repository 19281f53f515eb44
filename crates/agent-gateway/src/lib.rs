//! # agent-gateway
//!
//! The stateful middle of the gateway: one shared MCP connection and agent,
//! per-session query flow, and the on-disk server and model lists.
//!
//! ```text
//! handler ──▶ QueryService ──▶ SessionStore        (per-session history)
//!                  │
//!                  └────────▶ ConnectionManager   (single live Connection)
//!                                   │
//!                                   └──▶ ToolSourceConnector ──▶ MCP server
//! ```

pub mod connection;
pub mod error;
pub mod models;
pub mod query;
pub mod registry;

#[cfg(test)]
mod testing;

pub use connection::{
    Connection, ConnectionHandle, ConnectionManager, ConnectionState, McpConnector, ToolSource,
    ToolSourceConnector,
};
pub use error::{GatewayError, Result};
pub use models::{ModelCatalog, ModelOption};
pub use query::QueryService;
pub use registry::{ServerEntry, ServerRegistry};

//! MCP client error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, McpError>;

/// Errors raised while talking to an MCP server.
#[derive(Debug, Error)]
pub enum McpError {
    /// The SSE stream could not be opened.
    #[error("failed to connect to '{endpoint}': {reason}")]
    Connect { endpoint: String, reason: String },

    /// `initialize` or the endpoint announcement failed.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// HTTP failure while posting a message.
    #[error("transport error: {0}")]
    Transport(String),

    /// Server answered with a JSON-RPC error object.
    #[error("server error [{code}]: {message}")]
    Server { code: i64, message: String },

    /// No response arrived in time.
    #[error("'{method}' timed out after {secs}s")]
    Timeout { method: String, secs: u64 },

    /// The event stream ended; the connection is unusable.
    #[error("connection closed")]
    Closed,

    /// A message did not match the protocol shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<reqwest::Error> for McpError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

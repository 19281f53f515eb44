//! Gateway error taxonomy.
//!
//! Everything the request handlers can surface maps onto one of these kinds.

use agent_core::AgentError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Session id unknown, removed or expired
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Transport or handshake failure while (re)building the connection
    #[error("Failed to connect to {endpoint}: {reason}")]
    Connection { endpoint: String, reason: String },

    /// The agent failed to produce a response
    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Authentication required")]
    AuthenticationRequired,

    /// Malformed server registry, model list or environment
    #[error("Configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    /// Message safe to show to an end user
    pub fn user_message(&self) -> String {
        match self {
            Self::SessionNotFound(_) => {
                "Your session has expired or does not exist. Please connect again.".into()
            }
            Self::Connection { endpoint, .. } => {
                format!("Could not connect to the MCP server at {endpoint}.")
            }
            Self::QueryFailed(_) => "The agent could not answer that query. Please try again.".into(),
            Self::AuthenticationRequired => "Please log in to continue.".into(),
            Self::Config(msg) => format!("Configuration problem: {msg}"),
        }
    }

    /// Stable machine-readable code for JSON error bodies
    pub const fn code(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::Connection { .. } => "CONNECTION_ERROR",
            Self::QueryFailed(_) => "QUERY_FAILED",
            Self::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }
}

impl From<AgentError> for GatewayError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::SessionNotFound(id) => Self::SessionNotFound(id),
            AgentError::Config(msg) => Self::Config(msg),
            other => Self::QueryFailed(other.to_string()),
        }
    }
}

//! Application State

use std::path::PathBuf;
use std::sync::Arc;

use agent_gateway::{QueryService, ServerRegistry};

use crate::auth::AuthService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Session store plus the single shared MCP connection
    pub queries: Arc<QueryService>,

    /// `mcp_servers.json`
    pub registry: Arc<ServerRegistry>,

    /// Model list, re-read on each connect form
    pub model_file: PathBuf,

    pub default_server: String,

    pub auth: Arc<AuthService>,
}

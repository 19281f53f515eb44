//! Router test fixtures: a tool source that never leaves the process and a
//! provider that echoes the latest user message.

use std::path::Path;
use std::sync::Arc;

use agent_core::message::{Message, Role};
use agent_core::provider::{Completion, GenerationOptions, LlmProvider, ModelInfo};
use agent_core::tool::Tool;
use agent_core::{AgentConfig, AgentError, Result, SessionStore};
use agent_gateway::{ConnectionManager, QueryService, ServerRegistry, ToolSource, ToolSourceConnector};
use async_trait::async_trait;
use axum::http::HeaderValue;

use crate::auth::SESSION_COOKIE;
use crate::auth::tests::{test_auth, test_user};
use crate::state::AppState;

pub const DOWN: &str = "http://down/sse";

struct StubConnector;

#[async_trait]
impl ToolSourceConnector for StubConnector {
    async fn connect(&self, endpoint: &str) -> anyhow::Result<Box<dyn ToolSource>> {
        if endpoint == DOWN {
            anyhow::bail!("connection refused");
        }
        Ok(Box::new(EmptySource))
    }
}

struct EmptySource;

#[async_trait]
impl ToolSource for EmptySource {
    async fn list_tools(&self) -> anyhow::Result<Vec<Arc<dyn Tool>>> {
        Ok(Vec::new())
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Answers `"{model}: {query}"`; fails on queries containing "fail".
struct EchoProvider;

#[async_trait]
impl LlmProvider for EchoProvider {
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn complete(&self, messages: &[Message], options: &GenerationOptions) -> Result<Completion> {
        let query = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        if query.contains("fail") {
            return Err(AgentError::Provider("model refused".into()));
        }
        Ok(Completion {
            content: format!("{}: {query}", options.model),
            model: options.model.clone(),
            usage: None,
            finish_reason: None,
        })
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        Ok(Vec::new())
    }
}

pub fn test_state(dir: &Path) -> AppState {
    let connections = ConnectionManager::new(
        Arc::new(StubConnector),
        Arc::new(EchoProvider),
        AgentConfig::default(),
    );
    AppState {
        queries: Arc::new(QueryService::new(
            Arc::new(SessionStore::new()),
            Arc::new(connections),
        )),
        registry: Arc::new(ServerRegistry::new(dir.join("mcp_servers.json"))),
        model_file: dir.join("model_tooluse.txt"),
        default_server: "http://localhost:8000/sse".into(),
        auth: Arc::new(test_auth()),
    }
}

/// Cookie header for a freshly logged-in test user
pub async fn login(state: &AppState) -> HeaderValue {
    let token = state.auth.logins().insert(test_user()).await;
    HeaderValue::from_str(&format!("{SESSION_COOKIE}={token}")).unwrap()
}

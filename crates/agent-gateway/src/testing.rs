//! Test doubles for the tool-source and LLM boundaries.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use agent_core::message::{Message, Role};
use agent_core::provider::{Completion, GenerationOptions, LlmProvider, ModelInfo};
use agent_core::tool::{Tool, ToolCall, ToolResult, ToolSchema};
use agent_core::{AgentError, Result};
use async_trait::async_trait;

use crate::connection::{ToolSource, ToolSourceConnector};

/// Counts connects and closes; refuses endpoints listed in `unreachable`.
/// The most recent source can be killed to simulate a dropped stream.
#[derive(Default)]
pub struct CountingConnector {
    pub connects: AtomicUsize,
    pub closes: Arc<AtomicUsize>,
    pub unreachable: HashSet<String>,
    current: Mutex<Option<Arc<AtomicBool>>>,
}

impl CountingConnector {
    pub fn refusing(endpoints: &[&str]) -> Self {
        Self {
            unreachable: endpoints.iter().map(|e| (*e).to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn kill_current(&self) {
        if let Some(alive) = self.current.lock().unwrap().as_ref() {
            alive.store(false, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl ToolSourceConnector for CountingConnector {
    async fn connect(&self, endpoint: &str) -> anyhow::Result<Box<dyn ToolSource>> {
        if self.unreachable.contains(endpoint) {
            anyhow::bail!("connection refused");
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        let alive = Arc::new(AtomicBool::new(true));
        *self.current.lock().unwrap() = Some(alive.clone());
        Ok(Box::new(StubSource {
            endpoint: endpoint.to_string(),
            closes: self.closes.clone(),
            alive,
        }))
    }
}

struct StubSource {
    endpoint: String,
    closes: Arc<AtomicUsize>,
    alive: Arc<AtomicBool>,
}

#[async_trait]
impl ToolSource for StubSource {
    async fn list_tools(&self) -> anyhow::Result<Vec<Arc<dyn Tool>>> {
        Ok(vec![Arc::new(WhereTool {
            endpoint: self.endpoint.clone(),
        })])
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

/// Reports which endpoint it was discovered on
struct WhereTool {
    endpoint: String,
}

#[async_trait]
impl Tool for WhereTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: "where".into(),
            description: "Name the connected server".into(),
            parameters: Vec::new(),
        }
    }

    async fn execute(&self, _call: &ToolCall) -> Result<ToolResult> {
        Ok(ToolResult::success("where", self.endpoint.clone()))
    }
}

/// Calls the `where` tool once, then answers with the tool output and the
/// number of prior user turns it was shown. Fails on queries containing "fail".
pub struct WhereProvider;

#[async_trait]
impl LlmProvider for WhereProvider {
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    async fn complete(&self, messages: &[Message], options: &GenerationOptions) -> Result<Completion> {
        let last = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
        if last.contains("fail") {
            return Err(AgentError::Provider("model refused".into()));
        }

        let content = match messages.last().map(|m| m.role) {
            Some(Role::Tool) => {
                let endpoint = last.lines().last().unwrap_or_default();
                let users = messages.iter().filter(|m| m.role == Role::User).count();
                format!("{endpoint} via {} after {users} turns", options.model)
            }
            _ => "```tool\n{\"tool\": \"where\", \"arguments\": {}}\n```".to_string(),
        };

        Ok(Completion {
            content,
            model: options.model.clone(),
            usage: None,
            finish_reason: None,
        })
    }

    async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        Ok(Vec::new())
    }
}

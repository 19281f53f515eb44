//! Adapter exposing remote MCP tools through the agent's [`Tool`] trait.

use std::sync::Arc;

use agent_core::error::{AgentError, Result};
use agent_core::tool::{ParameterSchema, Tool, ToolCall, ToolResult, ToolSchema};
use async_trait::async_trait;
use serde_json::Value;

use crate::client::McpClient;
use crate::types::McpToolDefinition;

pub struct McpTool {
    client: Arc<McpClient>,
    definition: McpToolDefinition,
}

impl McpTool {
    pub const fn new(client: Arc<McpClient>, definition: McpToolDefinition) -> Self {
        Self { client, definition }
    }

    /// Wrap every definition as a tool bound to `client`.
    pub fn wrap_all(client: &Arc<McpClient>, definitions: Vec<McpToolDefinition>) -> Vec<Arc<dyn Tool>> {
        definitions
            .into_iter()
            .map(|d| Arc::new(Self::new(client.clone(), d)) as Arc<dyn Tool>)
            .collect()
    }
}

/// Flatten a JSON Schema `object` into the agent's parameter list.
fn parameters_from_schema(schema: &Value) -> Vec<ParameterSchema> {
    let required: Vec<&str> = schema["required"]
        .as_array()
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let Some(properties) = schema["properties"].as_object() else {
        return Vec::new();
    };

    properties
        .iter()
        .map(|(name, prop)| ParameterSchema {
            name: name.clone(),
            param_type: match &prop["type"] {
                Value::String(t) => t.clone(),
                Value::Array(types) => types
                    .iter()
                    .filter_map(Value::as_str)
                    .collect::<Vec<_>>()
                    .join("|"),
                _ => "any".to_string(),
            },
            description: prop["description"].as_str().unwrap_or_default().to_string(),
            required: required.contains(&name.as_str()),
        })
        .collect()
}

#[async_trait]
impl Tool for McpTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: self.definition.name.clone(),
            description: self.definition.description.clone().unwrap_or_default(),
            parameters: parameters_from_schema(&self.definition.input_schema),
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        let arguments = Value::Object(
            call.arguments
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );

        let result = self
            .client
            .call_tool(&self.definition.name, arguments)
            .await
            .map_err(|e| AgentError::ToolExecution(e.to_string()))?;

        let text = result.text();
        if result.is_error {
            Ok(ToolResult::failure(&self.definition.name, text))
        } else {
            Ok(ToolResult::success(&self.definition.name, text))
        }
    }
}

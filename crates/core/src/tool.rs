//! Tool trait — the uniform executor contract every tool implements.
//!
//! Tools are registered in a [`ToolRegistry`] which the agent loop uses to:
//! 1. Embed tool definitions in every outbound request
//! 2. Dispatch the model's tool-use requests by name

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ToolError;

/// Immutable descriptor sent to the model so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique across the registry
    pub name: String,

    /// What the tool does, written for the model
    pub description: String,

    /// JSON Schema describing the tool's input
    pub input_schema: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// A tool invocation requested by the model, ready for dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Model-generated id, echoed in the matching tool result
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Input as a JSON value
    pub input: serde_json::Value,
}

/// The core Tool trait.
///
/// A failing tool returns an error string; it must never take the process
/// down, because one tool failure must not end the conversation.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name the model uses to call this tool.
    fn name(&self) -> &str;

    /// The definition sent to the model.
    fn definition(&self) -> ToolDefinition;

    /// Execute with the model-supplied JSON input.
    async fn execute(&self, input: serde_json::Value) -> Result<String, String>;
}

/// Name-indexed set of tools, iterated in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A duplicate name replaces the earlier tool in place;
    /// treat that as a configuration mistake rather than a feature.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!(tool = %name, "Tool registered twice, replacing the earlier one");
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// All definitions, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    /// Execute a tool by name.
    ///
    /// Adds only the "not found" case; the tool's own output or error is
    /// returned untouched.
    pub async fn execute(&self, name: &str, input: serde_json::Value) -> Result<String, ToolError> {
        let tool = self.get(name).ok_or_else(|| ToolError::UnknownTool {
            name: name.to_string(),
        })?;
        tool.execute(input).await.map_err(ToolError::Execution)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

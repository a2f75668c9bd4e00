//! Current time tool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use johnathan_core::{Tool, ToolDefinition};
use serde_json::json;

/// Reports the current wall-clock time in UTC.
#[derive(Debug, Default)]
pub struct GetTimeTool;

impl GetTimeTool {
    pub fn new() -> Self {
        Self
    }

    fn render(now: DateTime<Utc>) -> String {
        format!(
            "Current time: {} UTC (Unix timestamp {})",
            now.format("%Y-%m-%d %H:%M:%S"),
            now.timestamp()
        )
    }
}

#[async_trait]
impl Tool for GetTimeTool {
    fn name(&self) -> &str {
        "get_current_time"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "get_current_time",
            "Get the current date and time. Use this when the user asks about the current time or date.",
            json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        )
    }

    async fn execute(&self, _input: serde_json::Value) -> Result<String, String> {
        Ok(Self::render(Utc::now()))
    }
}

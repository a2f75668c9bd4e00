//! File read tool: returns the text contents of a local file.

use std::path::PathBuf;

use async_trait::async_trait;
use johnathan_core::{Tool, ToolDefinition};
use serde_json::json;
use tracing::debug;

/// Files larger than this are refused rather than truncated.
pub const DEFAULT_MAX_BYTES: u64 = 256 * 1024;

pub struct ReadFileTool {
    /// Relative paths resolve against this directory. `None` = process cwd.
    pub root: Option<PathBuf>,
    pub max_bytes: u64,
}

impl ReadFileTool {
    pub fn new() -> Self {
        Self {
            root: None,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
            ..Self::new()
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = PathBuf::from(path);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path,
        }
    }
}

impl Default for ReadFileTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            "read_file",
            "Read the text contents of a file on the local machine.",
            json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Path of the file to read"
                    }
                },
                "required": ["path"]
            }),
        )
    }

    async fn execute(&self, input: serde_json::Value) -> Result<String, String> {
        let path = input["path"]
            .as_str()
            .filter(|p| !p.trim().is_empty())
            .ok_or_else(|| "Missing 'path' argument".to_string())?;
        let resolved = self.resolve(path);
        debug!(path = %resolved.display(), "Reading file");

        let meta = tokio::fs::metadata(&resolved)
            .await
            .map_err(|e| format!("Failed to read {path}: {e}"))?;
        if !meta.is_file() {
            return Err(format!("{path} is not a regular file"));
        }
        if meta.len() > self.max_bytes {
            return Err(format!(
                "{path} is {} bytes, larger than the {} byte limit",
                meta.len(),
                self.max_bytes
            ));
        }

        tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| format!("Failed to read {path}: {e}"))
    }
}

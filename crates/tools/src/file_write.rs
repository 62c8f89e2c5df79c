//! File write tool — write content to a file, creating parent directories.
//!
//! Structured content aimed at a `.json` path is pretty-printed; string
//! content is written verbatim.

use async_trait::async_trait;
use std::path::PathBuf;

use loopwright_core::error::ToolError;
use loopwright_core::tool::Tool;

pub struct FileWriteTool {
    workspace_root: Option<PathBuf>,
}

impl FileWriteTool {
    /// Create a file write tool with no path restrictions.
    pub fn new() -> Self {
        Self {
            workspace_root: None,
        }
    }

    /// Create a file write tool confined to a workspace root.
    pub fn confined(root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: Some(root.into()),
        }
    }
}

impl Default for FileWriteTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating parent directories as needed. Structured content written to a .json path is pretty-printed."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to write"
                },
                "content": {
                    "description": "The content to write; strings are written verbatim, other values as JSON"
                }
            },
            "required": ["path", "content"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;
        let content = arguments
            .get("content")
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'content' argument".into()))?;

        let resolved =
            crate::workspace::resolve_path("file_write", self.workspace_root.as_deref(), path)?;

        let is_json = resolved
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let rendered = match content {
            serde_json::Value::String(s) => s.clone(),
            other if is_json => serde_json::to_string_pretty(other)
                .map_err(|e| ToolError::ExecutionFailed {
                    tool_name: "file_write".into(),
                    reason: format!("Failed to serialize content: {e}"),
                })?,
            other => other.to_string(),
        };

        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::ExecutionFailed {
                    tool_name: "file_write".into(),
                    reason: format!("Failed to create directories for '{path}': {e}"),
                })?;
        }

        tokio::fs::write(&resolved, rendered.as_bytes())
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "file_write".into(),
                reason: format!("Failed to write '{path}': {e}"),
            })?;

        Ok(serde_json::json!({
            "path": path,
            "bytes_written": rendered.len(),
        }))
    }
}

//! File read tool — read file contents with workspace confinement.
//!
//! JSON files are parsed and returned structured; everything else comes
//! back as text. A read failure is a tool error so the loop can attempt a
//! corrected step (wrong path, missing file).

use async_trait::async_trait;
use std::path::PathBuf;

use loopwright_core::error::ToolError;
use loopwright_core::tool::Tool;

pub struct FileReadTool {
    workspace_root: Option<PathBuf>,
}

impl FileReadTool {
    /// Create a file read tool with no path restrictions.
    pub fn new() -> Self {
        Self {
            workspace_root: None,
        }
    }

    /// Create a file read tool confined to a workspace root.
    pub fn confined(root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: Some(root.into()),
        }
    }
}

impl Default for FileReadTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read the contents of a file. JSON files are returned as structured data, everything else as text."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read"
                }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;

        let resolved =
            crate::workspace::resolve_path("file_read", self.workspace_root.as_deref(), path)?;

        let raw = tokio::fs::read_to_string(&resolved)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "file_read".into(),
                reason: format!("Failed to read '{path}': {e}"),
            })?;

        let is_json = resolved
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            let content: serde_json::Value =
                serde_json::from_str(&raw).map_err(|e| ToolError::ExecutionFailed {
                    tool_name: "file_read".into(),
                    reason: format!("'{path}' is not valid JSON: {e}"),
                })?;
            Ok(serde_json::json!({
                "path": path,
                "file_type": "json",
                "content": content,
            }))
        } else {
            Ok(serde_json::json!({
                "path": path,
                "file_type": "text",
                "content": raw,
            }))
        }
    }
}

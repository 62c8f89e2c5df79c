//! Workspace path confinement for the file tools.
//!
//! When a workspace root is configured, relative paths resolve under it and
//! absolute paths must already live under it. Parent-directory components
//! are rejected outright so a resolved path can never escape the root.

use std::path::{Component, Path, PathBuf};

use loopwright_core::error::ToolError;

/// Resolve `raw` against an optional workspace root.
///
/// With no root configured the path is used as given (parent-directory
/// components are still rejected for relative paths, matching the
/// confined behavior).
pub fn resolve_path(
    tool_name: &str,
    root: Option<&Path>,
    raw: &str,
) -> Result<PathBuf, ToolError> {
    let candidate = Path::new(raw);

    if candidate
        .components()
        .any(|c| matches!(c, Component::ParentDir))
    {
        return Err(ToolError::PermissionDenied {
            tool_name: tool_name.into(),
            reason: format!("Path '{raw}' contains parent-directory components"),
        });
    }

    let Some(root) = root else {
        return Ok(candidate.to_path_buf());
    };

    let resolved = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };

    if !resolved.starts_with(root) {
        return Err(ToolError::PermissionDenied {
            tool_name: tool_name.into(),
            reason: format!(
                "Path '{raw}' is outside the workspace root '{}'",
                root.display()
            ),
        });
    }

    Ok(resolved)
}

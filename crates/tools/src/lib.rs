//! Built-in tool implementations for loopwright.
//!
//! Tools give the agent its hands: reading and writing files inside a
//! workspace, running commands through an allowlist, and managing a shared
//! in-memory search index for stashing intermediate findings.

pub mod file_read;
pub mod file_write;
pub mod run_command;
pub mod search_index;
pub mod workspace;

pub use file_read::FileReadTool;
pub use file_write::FileWriteTool;
pub use run_command::RunCommandTool;
pub use search_index::{IndexCreateTool, IndexSearchTool, IndexUploadTool, SearchIndexStore};

use loopwright_config::ToolsConfig;
use loopwright_core::Result;
use loopwright_core::tool::ToolRegistry;

/// Build a registry with all built-in tools, wired from config.
///
/// File tools are confined to the configured workspace root when one is
/// set; the command tool enforces the configured allowlist.
pub fn default_registry(config: &ToolsConfig) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    let store = SearchIndexStore::new();

    match &config.workspace_root {
        Some(root) => {
            registry.register(Box::new(FileReadTool::confined(root)))?;
            registry.register(Box::new(FileWriteTool::confined(root)))?;
        }
        None => {
            registry.register(Box::new(FileReadTool::new()))?;
            registry.register(Box::new(FileWriteTool::new()))?;
        }
    }
    registry.register(Box::new(RunCommandTool::new(
        config.allowed_commands.clone(),
    )))?;
    registry.register(Box::new(IndexCreateTool::new(store.clone())))?;
    registry.register(Box::new(IndexUploadTool::new(store.clone())))?;
    registry.register(Box::new(IndexSearchTool::new(store)))?;

    Ok(registry)
}

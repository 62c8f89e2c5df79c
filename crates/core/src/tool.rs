//! Tool trait and registry — the closed capability set of the loop.
//!
//! A tool is any external operation with a declared name, a JSON Schema for
//! its parameters, and an invoke operation. The registry is populated once
//! at startup and immutable afterwards; the loop resolves tools by name with
//! an explicit failure path for unknown names.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result, ToolError};

/// A tool definition sent to the model backend so it knows what it can call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// The core Tool trait.
///
/// Each capability (file I/O, command execution, index management, ...)
/// implements this trait and is registered in the [`ToolRegistry`]. The
/// loop never sees a tool's internals — only this contract.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "file_read").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Invoke the tool with validated arguments.
    async fn invoke(
        &self,
        arguments: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// An immutable mapping from tool name to its callable contract.
///
/// Registered once at startup, then shared read-only across sessions.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Names are unique: a second registration under the
    /// same name fails rather than silently replacing the first.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(Error::DuplicateTool(name));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Look up a tool by name.
    pub fn lookup(&self, name: &str) -> Result<&dyn Tool> {
        self.tools
            .get(name)
            .map(|t| t.as_ref())
            .ok_or_else(|| Error::UnknownTool(name.to_string()))
    }

    /// Whether a tool with this name is registered.
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Get all tool definitions (for sending to the model).
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Check an argument set against the named tool's declared schema.
    ///
    /// Collects EVERY violation — missing required parameters, unexpected
    /// parameters, and non-coercible types — so the caller can report all
    /// problems at once instead of fixing them one round-trip at a time.
    pub fn validate(&self, name: &str, arguments: &serde_json::Value) -> Result<()> {
        let tool = self.lookup(name)?;
        let schema = tool.parameters_schema();

        let mut violations = Vec::new();

        let Some(args) = arguments.as_object() else {
            return Err(Error::SchemaMismatch {
                tool_name: name.to_string(),
                violations: vec![format!(
                    "arguments must be a JSON object, got {}",
                    json_type_name(arguments)
                )],
            });
        };

        let properties = schema
            .get("properties")
            .and_then(|p| p.as_object())
            .cloned()
            .unwrap_or_default();

        // Required parameters must be present.
        if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
            for req in required.iter().filter_map(|r| r.as_str()) {
                if !args.contains_key(req) {
                    violations.push(format!("missing required parameter '{req}'"));
                }
            }
        }

        let additional_allowed = schema
            .get("additionalProperties")
            .and_then(|a| a.as_bool())
            .unwrap_or(true);

        for (key, value) in args {
            match properties.get(key) {
                Some(descriptor) => {
                    if let Some(expected) = descriptor.get("type").and_then(|t| t.as_str())
                        && !is_coercible(value, expected)
                    {
                        violations.push(format!(
                            "parameter '{key}' expects {expected}, got {}",
                            json_type_name(value)
                        ));
                    }
                }
                None if !additional_allowed => {
                    violations.push(format!("unexpected parameter '{key}'"));
                }
                None => {}
            }
        }

        if violations.is_empty() {
            Ok(())
        } else {
            violations.sort();
            Err(Error::SchemaMismatch {
                tool_name: name.to_string(),
                violations,
            })
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(n) if n.is_f64() => "number",
        serde_json::Value::Number(_) => "integer",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Loose type check: a value satisfies a schema type if it has that type or
/// can be trivially coerced into it (numeric strings for numbers, any scalar
/// for strings).
fn is_coercible(value: &serde_json::Value, expected: &str) -> bool {
    use serde_json::Value;
    match expected {
        "string" => matches!(
            value,
            Value::String(_) | Value::Number(_) | Value::Bool(_)
        ),
        "integer" => match value {
            Value::Number(n) => n.is_i64() || n.is_u64(),
            Value::String(s) => s.trim().parse::<i64>().is_ok(),
            _ => false,
        },
        "number" => match value {
            Value::Number(_) => true,
            Value::String(s) => s.trim().parse::<f64>().is_ok(),
            _ => false,
        },
        "boolean" => match value {
            Value::Bool(_) => true,
            Value::String(s) => matches!(s.as_str(), "true" | "false"),
            _ => false,
        },
        "array" => value.is_array(),
        "object" => value.is_object(),
        // Unknown schema type: don't reject what we can't check.
        _ => true,
    }
}

//! Error types for the loopwright domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all loopwright operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Registry errors ---
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Arguments for '{tool_name}' do not match its schema: {}", violations.join("; "))]
    SchemaMismatch {
        tool_name: String,
        /// Every violation found, not just the first.
        violations: Vec<String>,
    },

    // --- Loop errors ---
    #[error("Planning failed after {attempts} attempt(s): {message}")]
    Planning { message: String, attempts: u32 },

    #[error("Recovery budget exhausted for '{tool_name}' after {attempts} attempt(s)")]
    RecoveryExhausted { tool_name: String, attempts: u32 },

    #[error("Iteration limit of {limit} exceeded")]
    IterationLimitExceeded { limit: u32 },

    #[error("Run cancelled")]
    Cancelled,

    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed completion: {0}")]
    MalformedResponse(String),
}

/// Faults raised by tool implementations.
///
/// These never terminate a run on their own: the executor catches every
/// variant and converts it into a `Failure` observation.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool execution failed: {tool_name} — {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Permission denied: {tool_name} — {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_mismatch_lists_every_violation() {
        let err = Error::SchemaMismatch {
            tool_name: "file_read".into(),
            violations: vec![
                "missing required parameter 'path'".into(),
                "unexpected parameter 'mode'".into(),
            ],
        };
        let rendered = err.to_string();
        assert!(rendered.contains("path"));
        assert!(rendered.contains("mode"));
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = ToolError::Timeout {
            tool_name: "run_command".into(),
            timeout_secs: 60,
        };
        assert!(err.to_string().contains("run_command"));
        assert!(err.to_string().contains("60"));
    }

    #[test]
    fn provider_error_converts_to_top_level() {
        let err: Error = ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        }
        .into();
        assert!(err.to_string().contains("429"));
    }
}

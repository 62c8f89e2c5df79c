//! Provider trait — the abstraction over model backends.
//!
//! A Provider knows how to send a conversation (plus the declared tool set)
//! to a language model and get a structured completion back. The loop calls
//! it for three things: planning decisions, repair decisions during
//! recovery, and the final synthesis pass.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::message::Message;
use crate::session::PlanStep;
use crate::tool::ToolDefinition;

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-4o")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Available tools the model can call. Empty = unconstrained text
    /// completion (the synthesis pass).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

fn default_temperature() -> f32 {
    0.2
}

impl ProviderRequest {
    /// A request constrained to the declared tool set — the decision
    /// round-trip used by the planner and recovery controller.
    pub fn constrained(
        model: impl Into<String>,
        messages: Vec<Message>,
        tools: Vec<ToolDefinition>,
    ) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: default_temperature(),
            max_tokens: None,
            tools,
        }
    }

    /// An unconstrained text request — the synthesis pass.
    pub fn unconstrained(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: default_temperature(),
            max_tokens: None,
            tools: Vec::new(),
        }
    }
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated message
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A structured decision interpreted from a constrained completion.
///
/// The model either picks a tool (a [`PlanStep`]) or signals that it is
/// finished and the synthesizer should run.
#[derive(Debug, Clone)]
pub enum Decision {
    /// Invoke a tool with these arguments.
    Act(PlanStep),
    /// No more tool calls needed; the text is the model's closing remark.
    Finish(String),
}

impl Decision {
    /// Interpret a provider response as a decision.
    ///
    /// A response with a tool call becomes `Act` (the first call wins — the
    /// loop is strictly sequential, so additional calls in the same response
    /// are superseded by the next planning round). A response without tool
    /// calls is the "finished" signal. Unparseable tool-call arguments are
    /// surfaced so the caller can retry with that context.
    pub fn from_response(response: &ProviderResponse) -> Result<Self, ProviderError> {
        let message = &response.message;

        let Some(call) = message.tool_calls.first() else {
            return Ok(Decision::Finish(message.content.clone()));
        };

        let arguments: serde_json::Value =
            serde_json::from_str(&call.arguments).map_err(|e| {
                ProviderError::MalformedResponse(format!(
                    "tool call '{}' carries invalid JSON arguments: {e}",
                    call.name
                ))
            })?;

        Ok(Decision::Act(PlanStep::new(
            &call.name,
            arguments,
            &message.content,
        )))
    }
}

/// The core Provider trait.
///
/// Every model backend implements this. The loop calls `complete()` without
/// knowing which backend is in use.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai", "scripted").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Health check — can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

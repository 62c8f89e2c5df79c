//! Scripted provider — replays pre-programmed turns.
//!
//! Used by the agent test suites (deterministic decision sequences) and by
//! the CLI's `--offline` mode. Records every request it receives so tests
//! can assert on prompt construction.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use loopwright_core::error::ProviderError;
use loopwright_core::message::{Message, MessageToolCall};
use loopwright_core::provider::{Provider, ProviderRequest, ProviderResponse};

/// One pre-programmed model turn.
#[derive(Debug, Clone)]
pub enum ScriptedTurn {
    /// Respond with a tool call.
    ToolCall {
        name: String,
        arguments: serde_json::Value,
        rationale: String,
    },
    /// Respond with plain text (the "finished" signal in constrained mode).
    Text(String),
    /// Fail the round-trip.
    Fail(ProviderError),
}

impl ScriptedTurn {
    /// Convenience constructor for a tool-call turn.
    pub fn tool_call(name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self::ToolCall {
            name: name.into(),
            arguments,
            rationale: String::new(),
        }
    }

    /// Convenience constructor for a text turn.
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text(content.into())
    }
}

/// A provider that pops turns off a fixed script.
///
/// An exhausted script yields a plain-text turn, which the loop reads as
/// "finished" — offline runs always terminate.
pub struct ScriptedProvider {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(turns: impl IntoIterator<Item = ScriptedTurn>) -> Self {
        Self {
            turns: Mutex::new(turns.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A provider with no script at all: every call returns a finishing text.
    pub fn empty() -> Self {
        Self::new([])
    }

    /// All requests received so far, in order.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// How many completion calls have been made.
    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        let turn = self
            .turns
            .lock()
            .ok()
            .and_then(|mut turns| turns.pop_front());

        let message = match turn {
            Some(ScriptedTurn::ToolCall {
                name,
                arguments,
                rationale,
            }) => {
                let mut message = Message::assistant(rationale);
                message.tool_calls.push(MessageToolCall {
                    id: format!("scripted_{}", uuid::Uuid::new_v4()),
                    name,
                    arguments: arguments.to_string(),
                });
                message
            }
            Some(ScriptedTurn::Text(content)) => Message::assistant(content),
            Some(ScriptedTurn::Fail(error)) => return Err(error),
            None => Message::assistant("I have nothing further to add."),
        };

        Ok(ProviderResponse {
            message,
            usage: None,
            model: "scripted".into(),
        })
    }
}

//! Planner — asks the model for the next action and validates it.
//!
//! A decision round-trip is constrained to the registered tool set: the
//! model either calls a tool or replies in plain text, which the loop reads
//! as "finished". Invalid choices (unknown tool, schema violations,
//! unparseable calls) are fed back to the model and re-asked a bounded
//! number of times before planning fails the run. Validating here turns a
//! would-be runtime tool failure into a cheaper planning-time correction.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use loopwright_core::error::{Error, ProviderError, Result};
use loopwright_core::message::Message;
use loopwright_core::provider::{Decision, Provider, ProviderRequest};
use loopwright_core::session::SessionSnapshot;
use loopwright_core::tool::ToolRegistry;

use crate::prompt;

pub struct Planner {
    provider: Arc<dyn Provider>,
    registry: Arc<ToolRegistry>,
    model: String,
    temperature: f32,
    planning_retries: u32,
    model_timeout: Duration,
}

impl Planner {
    pub fn new(
        provider: Arc<dyn Provider>,
        registry: Arc<ToolRegistry>,
        model: impl Into<String>,
        temperature: f32,
        planning_retries: u32,
        model_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            registry,
            model: model.into(),
            temperature,
            planning_retries,
            model_timeout,
        }
    }

    /// Draft an initial step-by-step plan for the request.
    ///
    /// One unconstrained completion before the first decision round; the
    /// numbered lines become the session plan and are echoed into every
    /// later planning prompt.
    pub async fn draft_plan(&self, snapshot: &SessionSnapshot<'_>) -> Result<Vec<String>> {
        let mut names = self.registry.names();
        names.sort_unstable();

        let mut request = ProviderRequest::unconstrained(
            &self.model,
            prompt::plan_messages(snapshot, &names),
        );
        request.temperature = self.temperature;

        let response =
            match tokio::time::timeout(self.model_timeout, self.provider.complete(request)).await
            {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    return Err(ProviderError::Timeout(format!(
                        "plan round-trip exceeded {}s",
                        self.model_timeout.as_secs()
                    ))
                    .into());
                }
            };

        let steps = prompt::parse_plan(&response.message.content);
        debug!(steps = steps.len(), "Plan drafted");
        Ok(steps)
    }

    /// Decide the next action from the current session snapshot.
    pub async fn decide(&self, snapshot: &SessionSnapshot<'_>) -> Result<Decision> {
        let messages = prompt::planning_messages(snapshot);
        request_valid_decision(
            self.provider.as_ref(),
            &self.registry,
            &self.model,
            self.temperature,
            messages,
            self.planning_retries,
            self.model_timeout,
        )
        .await
    }
}

/// One bounded decision loop: request, interpret, validate, re-ask.
///
/// Shared by the planner and the recovery controller so corrected steps go
/// through exactly the same validation as planned ones. Transport-level
/// provider errors propagate immediately; only invalid decisions consume
/// re-asks.
pub(crate) async fn request_valid_decision(
    provider: &dyn Provider,
    registry: &ToolRegistry,
    model: &str,
    temperature: f32,
    mut messages: Vec<Message>,
    retries: u32,
    model_timeout: Duration,
) -> Result<Decision> {
    let definitions = registry.definitions();
    let max_attempts = retries + 1;
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        let mut request =
            ProviderRequest::constrained(model, messages.clone(), definitions.clone());
        request.temperature = temperature;

        let response = match tokio::time::timeout(model_timeout, provider.complete(request)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(ProviderError::Timeout(format!(
                    "decision round-trip exceeded {}s",
                    model_timeout.as_secs()
                ))
                .into());
            }
        };

        match Decision::from_response(&response) {
            Ok(Decision::Act(step)) => {
                match registry.validate(&step.tool_name, &step.arguments) {
                    Ok(()) => {
                        debug!(tool = %step.tool_name, attempt, "Decision validated");
                        return Ok(Decision::Act(step));
                    }
                    Err(e) => {
                        warn!(tool = %step.tool_name, attempt, error = %e, "Decision failed validation");
                        last_error = e.to_string();
                        messages.push(Message::system(format!(
                            "Your tool call was invalid: {last_error}. Choose again, fixing every problem listed."
                        )));
                    }
                }
            }
            Ok(finish @ Decision::Finish(_)) => return Ok(finish),
            Err(e) => {
                warn!(attempt, error = %e, "Decision could not be interpreted");
                last_error = e.to_string();
                messages.push(Message::system(format!(
                    "Your response could not be interpreted: {last_error}. Reply with a single well-formed tool call, or plain text if you are finished."
                )));
            }
        }
    }

    Err(Error::Planning {
        message: last_error,
        attempts: max_attempts,
    })
}

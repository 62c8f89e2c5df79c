//! Recovery controller — bounded retry-with-repair after a failed step.
//!
//! Idle/Active as a state machine: the controller is Active exactly while
//! the session status is Recovering. Each attempt spends one unit of the
//! retry budget, asks the model for a corrected step (validated exactly
//! like a planned one), and hands it back to the executor. Reaching the
//! budget forces abandonment.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use loopwright_core::error::{Error, Result};
use loopwright_core::event::{EventBus, RunEvent};
use loopwright_core::provider::{Decision, Provider};
use loopwright_core::session::{Observation, PlanStep, SessionState};
use loopwright_core::tool::ToolRegistry;

use crate::planner::request_valid_decision;
use crate::prompt;

/// What the controller proposes after a failure.
#[derive(Debug)]
pub enum Repair {
    /// A corrected, validated step ready for the executor.
    Corrected(PlanStep),
    /// Give up on this step; the run fails with recovery exhaustion.
    Abandoned(String),
}

pub struct RecoveryController {
    provider: Arc<dyn Provider>,
    registry: Arc<ToolRegistry>,
    event_bus: Arc<EventBus>,
    model: String,
    temperature: f32,
    retry_budget: u32,
    planning_retries: u32,
    model_timeout: Duration,
}

impl RecoveryController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<dyn Provider>,
        registry: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
        model: impl Into<String>,
        temperature: f32,
        retry_budget: u32,
        planning_retries: u32,
        model_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            registry,
            event_bus,
            model: model.into(),
            temperature,
            retry_budget,
            planning_retries,
            model_timeout,
        }
    }

    /// Attempt one repair for the given failed observation.
    ///
    /// A spent budget forces [`Repair::Abandoned`] without consulting the
    /// model, which is what guarantees exactly `retry_budget` attempts per
    /// failure streak.
    pub async fn attempt(
        &self,
        session: &mut SessionState,
        failed: &Observation,
    ) -> Result<Repair> {
        if session.retry_count() >= self.retry_budget {
            warn!(
                tool = %failed.step.tool_name,
                budget = self.retry_budget,
                "Retry budget exhausted, abandoning"
            );
            return Ok(Repair::Abandoned(format!(
                "retry budget of {} exhausted",
                self.retry_budget
            )));
        }

        let attempt = session.begin_recovery();
        info!(
            tool = %failed.step.tool_name,
            attempt,
            budget = self.retry_budget,
            "Attempting recovery"
        );
        self.event_bus.publish(RunEvent::RecoveryAttempted {
            session_id: session.id.clone(),
            attempt,
            tool_name: failed.step.tool_name.clone(),
            timestamp: chrono::Utc::now(),
        });

        let messages =
            prompt::repair_messages(&session.snapshot(), failed, attempt, self.retry_budget);

        match request_valid_decision(
            self.provider.as_ref(),
            &self.registry,
            &self.model,
            self.temperature,
            messages,
            self.planning_retries,
            self.model_timeout,
        )
        .await
        {
            Ok(Decision::Act(step)) => Ok(Repair::Corrected(step)),
            Ok(Decision::Finish(text)) => {
                // The model declared the action unrecoverable.
                Ok(Repair::Abandoned(if text.is_empty() {
                    "the model declared the action unrecoverable".into()
                } else {
                    text
                }))
            }
            Err(Error::Planning { message, .. }) => Ok(Repair::Abandoned(format!(
                "no valid corrected step: {message}"
            ))),
            Err(e) => Err(e),
        }
    }
}

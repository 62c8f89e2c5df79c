//! Executor — runs a validated plan step and records what happened.
//!
//! Every fault a tool can raise is caught and converted into a `Failure`
//! observation; the executor never propagates a tool fault upward. The
//! per-invocation timeout and the run's cancellation signal feed the same
//! conversion, so the scratchpad always gains exactly one observation per
//! presented step, carrying that step verbatim.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use loopwright_core::error::ToolError;
use loopwright_core::event::{EventBus, RunEvent};
use loopwright_core::session::{FailureKind, Observation, Outcome, PlanStep, SessionState};
use loopwright_core::tool::ToolRegistry;
use tokio_util::sync::CancellationToken;

pub struct Executor {
    registry: Arc<ToolRegistry>,
    event_bus: Arc<EventBus>,
    tool_timeout: Duration,
}

impl Executor {
    pub fn new(
        registry: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
        tool_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            event_bus,
            tool_timeout,
        }
    }

    /// Execute a step, record the observation, and publish it.
    ///
    /// Arguments are re-validated here as the last gate before invocation —
    /// no step reaches a tool unvalidated, wherever it came from.
    pub async fn execute(
        &self,
        session: &mut SessionState,
        step: PlanStep,
        cancel: &CancellationToken,
    ) -> Observation {
        let outcome = self.run_step(&step, cancel).await;

        match &outcome {
            Outcome::Success { .. } => debug!(tool = %step.tool_name, "Step succeeded"),
            Outcome::Failure { kind, message } => {
                warn!(tool = %step.tool_name, ?kind, %message, "Step failed");
            }
        }

        let observation = session.record_observation(step, outcome);
        self.event_bus.publish(RunEvent::ObservationRecorded {
            session_id: session.id.clone(),
            observation: observation.clone(),
            timestamp: chrono::Utc::now(),
        });
        observation
    }

    async fn run_step(&self, step: &PlanStep, cancel: &CancellationToken) -> Outcome {
        if let Err(e) = self.registry.validate(&step.tool_name, &step.arguments) {
            return Outcome::Failure {
                kind: FailureKind::Tool,
                message: e.to_string(),
            };
        }

        let tool = match self.registry.lookup(&step.tool_name) {
            Ok(tool) => tool,
            Err(e) => {
                return Outcome::Failure {
                    kind: FailureKind::Tool,
                    message: e.to_string(),
                };
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => Outcome::Failure {
                kind: FailureKind::Cancelled,
                message: format!("run cancelled while '{}' was in flight", step.tool_name),
            },
            result = tokio::time::timeout(self.tool_timeout, tool.invoke(step.arguments.clone())) => {
                match result {
                    Ok(Ok(value)) => Outcome::Success { value },
                    Ok(Err(fault)) => Outcome::Failure {
                        kind: match fault {
                            ToolError::Timeout { .. } => FailureKind::Timeout,
                            _ => FailureKind::Tool,
                        },
                        message: fault.to_string(),
                    },
                    Err(_) => Outcome::Failure {
                        kind: FailureKind::Timeout,
                        message: format!(
                            "tool '{}' timed out after {}s",
                            step.tool_name,
                            self.tool_timeout.as_secs()
                        ),
                    },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loopwright_core::tool::Tool;

    struct EchoTool;

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes its input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"],
                "additionalProperties": false
            })
        }
        async fn invoke(
            &self,
            arguments: serde_json::Value,
        ) -> std::result::Result<serde_json::Value, ToolError> {
            Ok(arguments["text"].clone())
        }
    }

    struct FailingTool;

    #[async_trait::async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        async fn invoke(
            &self,
            _arguments: serde_json::Value,
        ) -> std::result::Result<serde_json::Value, ToolError> {
            Err(ToolError::ExecutionFailed {
                tool_name: "broken".into(),
                reason: "deliberate fault".into(),
            })
        }
    }

    struct SlowTool;

    #[async_trait::async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "Sleeps for a long time"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        async fn invoke(
            &self,
            _arguments: serde_json::Value,
        ) -> std::result::Result<serde_json::Value, ToolError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(serde_json::json!("too late"))
        }
    }

    fn executor(timeout: Duration) -> Executor {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();
        registry.register(Box::new(FailingTool)).unwrap();
        registry.register(Box::new(SlowTool)).unwrap();
        Executor::new(
            Arc::new(registry),
            Arc::new(EventBus::default()),
            timeout,
        )
    }

    #[tokio::test]
    async fn observation_carries_the_input_step_verbatim() {
        let executor = executor(Duration::from_secs(5));
        let mut session = SessionState::seed("req");
        let step = PlanStep::new("echo", serde_json::json!({"text": "hi"}), "test");
        let step_id = step.id.clone();

        let observation = executor
            .execute(&mut session, step, &CancellationToken::new())
            .await;

        assert_eq!(observation.step.id, step_id);
        assert_eq!(observation.step.tool_name, "echo");
        assert!(observation.outcome.is_success());
        assert_eq!(session.iteration_count(), 1);
    }

    #[tokio::test]
    async fn tool_fault_becomes_failure_observation() {
        let executor = executor(Duration::from_secs(5));
        let mut session = SessionState::seed("req");
        let step = PlanStep::new("broken", serde_json::json!({}), "");

        let observation = executor
            .execute(&mut session, step, &CancellationToken::new())
            .await;

        let Outcome::Failure { kind, message } = &observation.outcome else {
            panic!("expected failure");
        };
        assert_eq!(*kind, FailureKind::Tool);
        assert!(message.contains("deliberate fault"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_tool_times_out() {
        let executor = executor(Duration::from_secs(1));
        let mut session = SessionState::seed("req");
        let step = PlanStep::new("slow", serde_json::json!({}), "");

        let observation = executor
            .execute(&mut session, step, &CancellationToken::new())
            .await;

        assert!(matches!(
            observation.outcome,
            Outcome::Failure {
                kind: FailureKind::Timeout,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn cancellation_becomes_cancelled_failure() {
        let executor = executor(Duration::from_secs(3600));
        let mut session = SessionState::seed("req");
        let step = PlanStep::new("slow", serde_json::json!({}), "");

        let cancel = CancellationToken::new();
        cancel.cancel();
        let observation = executor.execute(&mut session, step, &cancel).await;

        assert!(matches!(
            observation.outcome,
            Outcome::Failure {
                kind: FailureKind::Cancelled,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn invalid_arguments_never_reach_the_tool() {
        let executor = executor(Duration::from_secs(5));
        let mut session = SessionState::seed("req");
        let step = PlanStep::new("echo", serde_json::json!({"wrong": 1}), "");

        let observation = executor
            .execute(&mut session, step, &CancellationToken::new())
            .await;

        let Outcome::Failure { kind, message } = &observation.outcome else {
            panic!("expected failure");
        };
        assert_eq!(*kind, FailureKind::Tool);
        assert!(message.contains("text"), "message: {message}");
    }

    #[tokio::test]
    async fn recorded_observation_is_published() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool)).unwrap();
        let bus = Arc::new(EventBus::default());
        let executor = Executor::new(Arc::new(registry), bus.clone(), Duration::from_secs(5));

        let mut rx = bus.subscribe();
        let mut session = SessionState::seed("req");
        executor
            .execute(
                &mut session,
                PlanStep::new("echo", serde_json::json!({"text": "hi"}), ""),
                &CancellationToken::new(),
            )
            .await;

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event.as_ref(),
            RunEvent::ObservationRecorded { .. }
        ));
    }
}

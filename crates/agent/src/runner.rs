//! Graph runner — the state machine that drives one run to a terminal state.
//!
//! States: Planning, Executing, Recovering, Synthesizing, Done, Failed.
//! The runner owns the session exclusively; the provider, registry, and
//! event bus are shared handles. Every entry into Executing checks the
//! iteration count against the configured maximum, so a run fails the step
//! after it would exceed the limit, never later. The driver contract holds
//! either way: `run` always returns a reply or a terminal error carrying
//! the full scratchpad, never a session stuck in a non-terminal state.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use loopwright_core::error::{Error, Result};
use loopwright_core::event::{EventBus, RunEvent};
use loopwright_core::provider::{Decision, Provider};
use loopwright_core::session::{
    FailureKind, Observation, Outcome, PlanStep, RunStatus, SessionState,
};
use loopwright_core::tool::ToolRegistry;

use crate::executor::Executor;
use crate::planner::Planner;
use crate::recovery::{RecoveryController, Repair};
use crate::synthesizer::Synthesizer;

/// Bounds on a single run.
#[derive(Debug, Clone)]
pub struct RunLimits {
    /// Global cap on tool invocations per run
    pub max_iterations: u32,
    /// Recovery attempts allowed per failure streak
    pub retry_budget: u32,
    /// Model re-asks allowed when a decision fails validation
    pub planning_retries: u32,
    /// Timeout per tool invocation
    pub tool_timeout: Duration,
    /// Timeout per model round-trip
    pub model_timeout: Duration,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            retry_budget: 3,
            planning_retries: 2,
            tool_timeout: Duration::from_secs(60),
            model_timeout: Duration::from_secs(120),
        }
    }
}

/// A completed run: the reply plus everything recorded along the way.
#[derive(Debug)]
pub struct RunReport {
    pub session_id: String,
    pub reply: String,
    pub iterations: u32,
    pub scratchpad: Vec<Observation>,
}

/// A failed run. The scratchpad is attached for diagnosis; nothing is
/// discarded.
#[derive(Debug)]
pub struct RunError {
    pub error: Error,
    pub scratchpad: Vec<Observation>,
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({} observation(s) recorded)", self.error, self.scratchpad.len())
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

enum Phase {
    Planning,
    Executing(PlanStep),
    Recovering(Observation),
    Synthesizing,
}

pub struct GraphRunner {
    provider: Arc<dyn Provider>,
    registry: Arc<ToolRegistry>,
    event_bus: Arc<EventBus>,
    model: String,
    temperature: f32,
    limits: RunLimits,
    cancel: CancellationToken,
}

impl GraphRunner {
    pub fn new(
        provider: Arc<dyn Provider>,
        registry: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            registry,
            event_bus,
            model: model.into(),
            temperature: 0.2,
            limits: RunLimits::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_limits(mut self, limits: RunLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Handle for aborting in-flight runs. Cancelling mid-tool-call records
    /// a `Cancelled` failure observation before the run terminates.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drive one user request to a terminal state.
    pub async fn run(
        &self,
        user_request: impl Into<String>,
    ) -> std::result::Result<RunReport, RunError> {
        let planner = Planner::new(
            self.provider.clone(),
            self.registry.clone(),
            &self.model,
            self.temperature,
            self.limits.planning_retries,
            self.limits.model_timeout,
        );
        let executor = Executor::new(
            self.registry.clone(),
            self.event_bus.clone(),
            self.limits.tool_timeout,
        );
        let recovery = RecoveryController::new(
            self.provider.clone(),
            self.registry.clone(),
            self.event_bus.clone(),
            &self.model,
            self.temperature,
            self.limits.retry_budget,
            self.limits.planning_retries,
            self.limits.model_timeout,
        );
        let synthesizer = Synthesizer::new(
            self.provider.clone(),
            &self.model,
            self.temperature,
            self.limits.model_timeout,
        );

        let mut session = SessionState::seed(user_request);
        info!(session_id = %session.id, "Run started");

        let mut phase = Phase::Planning;
        let outcome: Result<String> = loop {
            if self.cancel.is_cancelled() {
                break Err(Error::Cancelled);
            }

            phase = match phase {
                Phase::Planning => {
                    // One plan draft per run, before the first decision.
                    if session.snapshot().plan.is_none() {
                        match planner.draft_plan(&session.snapshot()).await {
                            Ok(steps) => {
                                info!(
                                    session_id = %session.id,
                                    steps = steps.len(),
                                    "Initial plan drafted"
                                );
                                session.set_plan(steps);
                            }
                            Err(e) => break Err(e),
                        }
                    }
                    match planner.decide(&session.snapshot()).await {
                        Ok(Decision::Act(step)) => {
                            self.event_bus.publish(RunEvent::PlannerDecided {
                                session_id: session.id.clone(),
                                tool_name: Some(step.tool_name.clone()),
                                rationale: step.rationale.clone(),
                                timestamp: chrono::Utc::now(),
                            });
                            Phase::Executing(step)
                        }
                        Ok(Decision::Finish(remark)) => {
                            self.event_bus.publish(RunEvent::PlannerDecided {
                                session_id: session.id.clone(),
                                tool_name: None,
                                rationale: remark,
                                timestamp: chrono::Utc::now(),
                            });
                            if let Err(e) =
                                self.transition(&mut session, RunStatus::ReadyToSynthesize)
                            {
                                break Err(e);
                            }
                            Phase::Synthesizing
                        }
                        Err(e) => break Err(e),
                    }
                }

                Phase::Executing(step) => {
                    if session.iteration_count() + 1 > self.limits.max_iterations {
                        warn!(
                            session_id = %session.id,
                            limit = self.limits.max_iterations,
                            "Iteration limit reached"
                        );
                        break Err(Error::IterationLimitExceeded {
                            limit: self.limits.max_iterations,
                        });
                    }
                    if let Err(e) = self.transition(&mut session, RunStatus::AwaitingTool) {
                        break Err(e);
                    }

                    let mid_recovery = session.retry_count() > 0;
                    let observation = executor.execute(&mut session, step, &self.cancel).await;
                    match &observation.outcome {
                        Outcome::Success { .. } => {
                            if mid_recovery {
                                session.end_recovery(true);
                                self.event_bus.publish(RunEvent::StatusChanged {
                                    session_id: session.id.clone(),
                                    from: RunStatus::AwaitingTool,
                                    to: RunStatus::Running,
                                    timestamp: chrono::Utc::now(),
                                });
                            } else if let Err(e) =
                                self.transition(&mut session, RunStatus::Running)
                            {
                                break Err(e);
                            }
                            Phase::Planning
                        }
                        Outcome::Failure {
                            kind: FailureKind::Cancelled,
                            ..
                        } => break Err(Error::Cancelled),
                        Outcome::Failure { .. } => Phase::Recovering(observation),
                    }
                }

                Phase::Recovering(failed) => {
                    let before = session.status();
                    let repair = recovery.attempt(&mut session, &failed).await;
                    if session.status() != before {
                        self.event_bus.publish(RunEvent::StatusChanged {
                            session_id: session.id.clone(),
                            from: before,
                            to: session.status(),
                            timestamp: chrono::Utc::now(),
                        });
                    }
                    match repair {
                        Ok(Repair::Corrected(step)) => Phase::Executing(step),
                        Ok(Repair::Abandoned(reason)) => {
                            let exhaustion = session.record_observation(
                                failed.step.clone(),
                                Outcome::Failure {
                                    kind: FailureKind::RecoveryExhausted,
                                    message: reason,
                                },
                            );
                            self.event_bus.publish(RunEvent::ObservationRecorded {
                                session_id: session.id.clone(),
                                observation: exhaustion,
                                timestamp: chrono::Utc::now(),
                            });
                            break Err(Error::RecoveryExhausted {
                                tool_name: failed.step.tool_name.clone(),
                                attempts: session.retry_count(),
                            });
                        }
                        Err(e) => break Err(e),
                    }
                }

                Phase::Synthesizing => match synthesizer.synthesize(&session.snapshot()).await {
                    Ok(reply) => break Ok(reply),
                    Err(e) => break Err(e),
                },
            };
        };

        let final_status = if outcome.is_ok() {
            RunStatus::Done
        } else {
            RunStatus::Failed
        };
        if !session.status().is_terminal()
            && let Ok(from) = session.transition_to(final_status)
        {
            self.event_bus.publish(RunEvent::StatusChanged {
                session_id: session.id.clone(),
                from,
                to: final_status,
                timestamp: chrono::Utc::now(),
            });
        }
        self.event_bus.publish(RunEvent::RunCompleted {
            session_id: session.id.clone(),
            status: session.status(),
            iterations: session.iteration_count(),
            timestamp: chrono::Utc::now(),
        });

        match outcome {
            Ok(reply) => {
                info!(
                    session_id = %session.id,
                    iterations = session.iteration_count(),
                    "Run completed"
                );
                Ok(RunReport {
                    session_id: session.id.clone(),
                    reply,
                    iterations: session.iteration_count(),
                    scratchpad: session.into_scratchpad(),
                })
            }
            Err(error) => {
                warn!(session_id = %session.id, %error, "Run failed");
                Err(RunError {
                    error,
                    scratchpad: session.into_scratchpad(),
                })
            }
        }
    }

    fn transition(&self, session: &mut SessionState, to: RunStatus) -> Result<()> {
        let from = session.transition_to(to)?;
        self.event_bus.publish(RunEvent::StatusChanged {
            session_id: session.id.clone(),
            from,
            to,
            timestamp: chrono::Utc::now(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loopwright_core::error::ToolError;
    use loopwright_core::tool::Tool;
    use loopwright_providers::{ScriptedProvider, ScriptedTurn};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ListFilesTool;

    #[async_trait::async_trait]
    impl Tool for ListFilesTool {
        fn name(&self) -> &str {
            "list_files"
        }
        fn description(&self) -> &str {
            "List files in a directory"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "path": { "type": "string" } },
                "required": ["path"],
                "additionalProperties": false
            })
        }
        async fn invoke(
            &self,
            _arguments: serde_json::Value,
        ) -> std::result::Result<serde_json::Value, ToolError> {
            Ok(serde_json::json!(["a.txt", "b.txt"]))
        }
    }

    /// Fails a fixed number of times, then succeeds forever.
    struct FlakyTool {
        name: &'static str,
        remaining_failures: AtomicU32,
    }

    impl FlakyTool {
        fn new(name: &'static str, failures: u32) -> Self {
            Self {
                name,
                remaining_failures: AtomicU32::new(failures),
            }
        }
    }

    #[async_trait::async_trait]
    impl Tool for FlakyTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "Fails a few times, then works"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        async fn invoke(
            &self,
            _arguments: serde_json::Value,
        ) -> std::result::Result<serde_json::Value, ToolError> {
            let remaining = self.remaining_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.remaining_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(ToolError::ExecutionFailed {
                    tool_name: self.name.into(),
                    reason: "transient fault".into(),
                });
            }
            Ok(serde_json::json!("recovered"))
        }
    }

    struct AlwaysFailsTool;

    #[async_trait::async_trait]
    impl Tool for AlwaysFailsTool {
        fn name(&self) -> &str {
            "always_fails"
        }
        fn description(&self) -> &str {
            "Never succeeds"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {}})
        }
        async fn invoke(
            &self,
            _arguments: serde_json::Value,
        ) -> std::result::Result<serde_json::Value, ToolError> {
            Err(ToolError::ExecutionFailed {
                tool_name: "always_fails".into(),
                reason: "permanent fault".into(),
            })
        }
    }

    fn runner_with(
        tools: Vec<Box<dyn Tool>>,
        turns: Vec<ScriptedTurn>,
        limits: RunLimits,
    ) -> (GraphRunner, Arc<ScriptedProvider>, Arc<EventBus>) {
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool).unwrap();
        }
        let provider = Arc::new(ScriptedProvider::new(turns));
        let event_bus = Arc::new(EventBus::default());
        let runner = GraphRunner::new(
            provider.clone(),
            Arc::new(registry),
            event_bus.clone(),
            "test-model",
        )
        .with_limits(limits);
        (runner, provider, event_bus)
    }

    fn drain(
        rx: &mut tokio::sync::broadcast::Receiver<Arc<RunEvent>>,
    ) -> Vec<Arc<RunEvent>> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn recovery_attempts(events: &[Arc<RunEvent>]) -> u32 {
        events
            .iter()
            .filter(|e| matches!(e.as_ref(), RunEvent::RecoveryAttempted { .. }))
            .count() as u32
    }

    #[tokio::test]
    async fn list_files_scenario_reaches_done() {
        let (runner, provider, bus) = runner_with(
            vec![Box::new(ListFilesTool)],
            vec![
                ScriptedTurn::text("1. Call list_files on the working directory."),
                ScriptedTurn::tool_call("list_files", serde_json::json!({"path": "."})),
                ScriptedTurn::text("That covers it."),
                ScriptedTurn::text("Your files are a.txt and b.txt."),
            ],
            RunLimits::default(),
        );
        let mut rx = bus.subscribe();

        let report = runner.run("list files").await.unwrap();
        assert_eq!(report.reply, "Your files are a.txt and b.txt.");
        assert_eq!(report.iterations, 1);
        assert_eq!(report.scratchpad.len(), 1);
        assert!(report.scratchpad[0].outcome.is_success());
        // plan draft + decision + finish + synthesis
        assert_eq!(provider.call_count(), 4);

        let events = drain(&mut rx);
        let last = events.last().unwrap();
        assert!(matches!(
            last.as_ref(),
            RunEvent::RunCompleted {
                status: RunStatus::Done,
                iterations: 1,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn drafted_plan_reaches_every_planning_round() {
        let (runner, provider, _) = runner_with(
            vec![Box::new(ListFilesTool)],
            vec![
                ScriptedTurn::text("1. Call list_files on the current directory."),
                ScriptedTurn::tool_call("list_files", serde_json::json!({"path": "."})),
                ScriptedTurn::text("Done."),
                ScriptedTurn::text("a.txt and b.txt."),
            ],
            RunLimits::default(),
        );

        runner.run("list files").await.unwrap();

        let requests = provider.requests();
        // The draft is unconstrained; the decision rounds carry the plan.
        assert!(requests[0].tools.is_empty());
        assert!(!requests[1].tools.is_empty());
        for request in &requests[1..=2] {
            let contents = request
                .messages
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            assert!(
                contents.contains("Call list_files on the current directory"),
                "plan missing from decision round: {contents}"
            );
        }
    }

    #[tokio::test]
    async fn fails_twice_then_recovers_to_done() {
        let (runner, _, bus) = runner_with(
            vec![Box::new(FlakyTool::new("flaky", 2))],
            vec![
                ScriptedTurn::text("1. Call flaky until it works."),
                ScriptedTurn::tool_call("flaky", serde_json::json!({})),
                ScriptedTurn::tool_call("flaky", serde_json::json!({})),
                ScriptedTurn::tool_call("flaky", serde_json::json!({})),
                ScriptedTurn::text("Done."),
                ScriptedTurn::text("Recovered and finished."),
            ],
            RunLimits {
                retry_budget: 3,
                ..RunLimits::default()
            },
        );
        let mut rx = bus.subscribe();

        let report = runner.run("do the flaky thing").await.unwrap();
        assert_eq!(report.reply, "Recovered and finished.");

        // Exactly two failures, then one success.
        assert_eq!(report.scratchpad.len(), 3);
        assert!(!report.scratchpad[0].outcome.is_success());
        assert!(!report.scratchpad[1].outcome.is_success());
        assert!(report.scratchpad[2].outcome.is_success());

        assert_eq!(recovery_attempts(&drain(&mut rx)), 2);
    }

    #[tokio::test]
    async fn always_failing_tool_exhausts_budget_exactly() {
        let budget = 2;
        let (runner, _, bus) = runner_with(
            vec![Box::new(AlwaysFailsTool)],
            vec![
                ScriptedTurn::text("1. Call always_fails."),
                ScriptedTurn::tool_call("always_fails", serde_json::json!({})),
                ScriptedTurn::tool_call("always_fails", serde_json::json!({})),
                ScriptedTurn::tool_call("always_fails", serde_json::json!({})),
            ],
            RunLimits {
                retry_budget: budget,
                ..RunLimits::default()
            },
        );
        let mut rx = bus.subscribe();

        let err = runner.run("try anyway").await.unwrap_err();
        let Error::RecoveryExhausted { tool_name, attempts } = &err.error else {
            panic!("expected RecoveryExhausted, got {}", err.error);
        };
        assert_eq!(tool_name.as_str(), "always_fails");
        assert_eq!(*attempts, budget);

        // K recovery attempts, never K+1.
        assert_eq!(recovery_attempts(&drain(&mut rx)), budget);

        // Initial failure + budget failures + the terminal exhaustion entry.
        assert_eq!(err.scratchpad.len(), (budget + 2) as usize);
        assert!(matches!(
            err.scratchpad.last().unwrap().outcome,
            Outcome::Failure {
                kind: FailureKind::RecoveryExhausted,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn successful_recovery_restores_the_full_budget() {
        // Two independent failure streaks, each needing one repair, with a
        // budget of one. Only a reset after the first success lets the
        // second streak recover.
        let (runner, _, bus) = runner_with(
            vec![
                Box::new(FlakyTool::new("flaky_a", 1)),
                Box::new(FlakyTool::new("flaky_b", 1)),
            ],
            vec![
                ScriptedTurn::text("1. Call flaky_a.\n2. Call flaky_b."),
                ScriptedTurn::tool_call("flaky_a", serde_json::json!({})),
                ScriptedTurn::tool_call("flaky_a", serde_json::json!({})),
                ScriptedTurn::tool_call("flaky_b", serde_json::json!({})),
                ScriptedTurn::tool_call("flaky_b", serde_json::json!({})),
                ScriptedTurn::text("Done."),
                ScriptedTurn::text("Both recovered."),
            ],
            RunLimits {
                retry_budget: 1,
                ..RunLimits::default()
            },
        );
        let mut rx = bus.subscribe();

        let report = runner.run("run both").await.unwrap();
        assert_eq!(report.reply, "Both recovered.");
        assert_eq!(report.scratchpad.len(), 4);
        assert_eq!(recovery_attempts(&drain(&mut rx)), 2);
    }

    #[tokio::test]
    async fn iteration_limit_fails_before_the_second_call() {
        let (runner, provider, _) = runner_with(
            vec![Box::new(ListFilesTool)],
            vec![
                ScriptedTurn::text("1. List the working directory.\n2. List src."),
                ScriptedTurn::tool_call("list_files", serde_json::json!({"path": "."})),
                ScriptedTurn::tool_call("list_files", serde_json::json!({"path": "src"})),
            ],
            RunLimits {
                max_iterations: 1,
                ..RunLimits::default()
            },
        );

        let err = runner.run("list twice").await.unwrap_err();
        assert!(matches!(
            err.error,
            Error::IterationLimitExceeded { limit: 1 }
        ));
        // The first call executed; the second never did.
        assert_eq!(err.scratchpad.len(), 1);
        assert!(err.scratchpad[0].outcome.is_success());
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn unknown_tool_fails_planning_without_execution() {
        let (runner, provider, _) = runner_with(
            vec![Box::new(ListFilesTool)],
            vec![
                ScriptedTurn::text("1. Call the mystery tool."),
                ScriptedTurn::tool_call("unknown_tool", serde_json::json!({})),
                ScriptedTurn::tool_call("unknown_tool", serde_json::json!({})),
                ScriptedTurn::tool_call("unknown_tool", serde_json::json!({})),
            ],
            RunLimits::default(),
        );

        let err = runner.run("use the mystery tool").await.unwrap_err();
        assert!(matches!(err.error, Error::Planning { attempts: 3, .. }));
        assert!(err.scratchpad.is_empty());
        // Plan draft, then three rejected decisions.
        assert_eq!(provider.call_count(), 4);
    }

    #[tokio::test]
    async fn cancelled_run_terminates_failed() {
        let (runner, provider, bus) = runner_with(
            vec![Box::new(ListFilesTool)],
            vec![ScriptedTurn::tool_call(
                "list_files",
                serde_json::json!({"path": "."}),
            )],
            RunLimits::default(),
        );
        let mut rx = bus.subscribe();
        runner.cancellation_token().cancel();

        let err = runner.run("list files").await.unwrap_err();
        assert!(matches!(err.error, Error::Cancelled));
        assert_eq!(provider.call_count(), 0);

        let events = drain(&mut rx);
        assert!(events.iter().any(|e| matches!(
            e.as_ref(),
            RunEvent::RunCompleted {
                status: RunStatus::Failed,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn no_tools_needed_goes_straight_to_synthesis() {
        let (runner, provider, _) = runner_with(
            vec![Box::new(ListFilesTool)],
            vec![
                ScriptedTurn::text("No tool calls are needed."),
                ScriptedTurn::text("Nothing to do."),
                ScriptedTurn::text("Hello! Nothing needed doing."),
            ],
            RunLimits::default(),
        );

        let report = runner.run("just say hi").await.unwrap();
        assert_eq!(report.reply, "Hello! Nothing needed doing.");
        assert!(report.scratchpad.is_empty());
        assert_eq!(report.iterations, 0);
        assert_eq!(provider.call_count(), 3);
    }
}

//! Session state — the single mutable record of one run.
//!
//! Exactly one `SessionState` exists per run. It is owned by the graph
//! runner and mutated only through the named operations here; everything
//! else reads through [`SessionState::snapshot`]. The scratchpad is an
//! append-only audit log: observations land in invocation order and are
//! never removed or reordered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::message::{Conversation, Message};

/// One decided action: a tool plus validated arguments.
///
/// Produced by the planner (or recovery controller), consumed by the
/// executor, never mutated after creation. Replanning supersedes a step
/// with a new one rather than editing it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    /// Unique step ID
    pub id: String,

    /// Name of the tool to invoke
    pub tool_name: String,

    /// Arguments as a JSON object keyed by parameter name
    pub arguments: serde_json::Value,

    /// The model's stated reason for choosing this step
    #[serde(default)]
    pub rationale: String,
}

impl PlanStep {
    pub fn new(
        tool_name: impl Into<String>,
        arguments: serde_json::Value,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tool_name: tool_name.into(),
            arguments,
            rationale: rationale.into(),
        }
    }
}

/// Why a step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The tool itself raised a fault
    Tool,
    /// The per-invocation timeout elapsed
    Timeout,
    /// The run's cancellation signal was raised mid-call
    Cancelled,
    /// The recovery budget ran out for this step
    RecoveryExhausted,
}

/// The recorded result of executing a plan step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Success { value: serde_json::Value },
    Failure { kind: FailureKind, message: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

/// One entry in the scratchpad: which step ran, and how it went.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    /// The step exactly as it was handed to the executor
    pub step: PlanStep,

    /// Success or failure
    pub outcome: Outcome,

    /// When this observation was recorded
    pub recorded_at: DateTime<Utc>,
}

impl Observation {
    pub fn new(step: PlanStep, outcome: Outcome) -> Self {
        Self {
            step,
            outcome,
            recorded_at: Utc::now(),
        }
    }
}

/// Lifecycle status of a run.
///
/// Transitions are monotone: once Done or Failed is reached, no further
/// transition is accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    AwaitingTool,
    Recovering,
    /// The planner signalled "finished"; the synthesizer runs next.
    ReadyToSynthesize,
    Done,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Done | RunStatus::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunStatus::Running => "running",
            RunStatus::AwaitingTool => "awaiting_tool",
            RunStatus::Recovering => "recovering",
            RunStatus::ReadyToSynthesize => "ready_to_synthesize",
            RunStatus::Done => "done",
            RunStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// A read-only view of the session for the planner and synthesizer.
///
/// Borrowed data only — callers cannot mutate the session through it.
#[derive(Debug, Clone, Copy)]
pub struct SessionSnapshot<'a> {
    pub conversation: &'a Conversation,
    pub plan: Option<&'a [String]>,
    pub scratchpad: &'a [Observation],
    pub iteration_count: u32,
    pub retry_count: u32,
    pub status: RunStatus,
}

/// The mutable record threaded through every step of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    /// Unique session ID
    pub id: String,

    conversation: Conversation,

    /// Pending step descriptions from the initial plan, if one was made
    plan: Option<Vec<String>>,

    /// Append-only log of executed steps
    scratchpad: Vec<Observation>,

    iteration_count: u32,
    retry_count: u32,
    status: RunStatus,
}

impl SessionState {
    /// Initialize a fresh session from a user request.
    ///
    /// Status starts at Running with an empty scratchpad and zero counters.
    pub fn seed(user_request: impl Into<String>) -> Self {
        let mut conversation = Conversation::new();
        conversation.push(Message::user(user_request));

        Self {
            id: Uuid::new_v4().to_string(),
            conversation,
            plan: None,
            scratchpad: Vec::new(),
            iteration_count: 0,
            retry_count: 0,
            status: RunStatus::Running,
        }
    }

    /// Append an observation to the scratchpad and advance the iteration count.
    ///
    /// Returns a copy of the recorded observation so the caller can publish
    /// it on the audit stream.
    pub fn record_observation(&mut self, step: PlanStep, outcome: Outcome) -> Observation {
        let observation = Observation::new(step, outcome);
        self.scratchpad.push(observation.clone());
        self.iteration_count += 1;
        observation
    }

    /// Enter recovery: status becomes Recovering and the retry counter
    /// advances by one. Returns the new retry count.
    pub fn begin_recovery(&mut self) -> u32 {
        self.status = RunStatus::Recovering;
        self.retry_count += 1;
        self.retry_count
    }

    /// Leave recovery. A successful recovery restores the full retry budget
    /// for future independent failures.
    pub fn end_recovery(&mut self, success: bool) {
        if success {
            self.retry_count = 0;
            self.status = RunStatus::Running;
        }
    }

    /// Replace the stored plan.
    pub fn set_plan(&mut self, steps: Vec<String>) {
        self.plan = Some(steps);
    }

    /// Append a message to the conversation.
    pub fn push_message(&mut self, message: Message) {
        self.conversation.push(message);
    }

    /// Move to a new status. Terminal states absorb: transitioning out of
    /// Done or Failed is an error.
    pub fn transition_to(&mut self, status: RunStatus) -> Result<RunStatus> {
        if self.status.is_terminal() {
            return Err(Error::Internal(format!(
                "attempted transition {} -> {} out of a terminal state",
                self.status, status
            )));
        }
        let from = self.status;
        self.status = status;
        Ok(from)
    }

    /// Read-only view for the planner and synthesizer.
    pub fn snapshot(&self) -> SessionSnapshot<'_> {
        SessionSnapshot {
            conversation: &self.conversation,
            plan: self.plan.as_deref(),
            scratchpad: &self.scratchpad,
            iteration_count: self.iteration_count,
            retry_count: self.retry_count,
            status: self.status,
        }
    }

    /// Consume the session, yielding the scratchpad for diagnosis.
    pub fn into_scratchpad(self) -> Vec<Observation> {
        self.scratchpad
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn scratchpad(&self) -> &[Observation] {
        &self.scratchpad
    }

    pub fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }
}

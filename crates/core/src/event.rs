//! Run event stream — the read-only audit interface.
//!
//! Events are published as the loop progresses so a collaborator UI can show
//! live progress. The core does not mandate a rendering surface; consumers
//! subscribe and filter for what they care about.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::session::{Observation, RunStatus};

/// Everything observable about a run, in the order it happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RunEvent {
    /// The session moved between states
    StatusChanged {
        session_id: String,
        from: RunStatus,
        to: RunStatus,
        timestamp: DateTime<Utc>,
    },

    /// The planner (or recovery controller) decided on a next action
    PlannerDecided {
        session_id: String,
        /// Tool name, or None for the "finished" signal
        tool_name: Option<String>,
        rationale: String,
        timestamp: DateTime<Utc>,
    },

    /// An observation was appended to the scratchpad
    ObservationRecorded {
        session_id: String,
        observation: Observation,
        timestamp: DateTime<Utc>,
    },

    /// A recovery attempt started
    RecoveryAttempted {
        session_id: String,
        attempt: u32,
        tool_name: String,
        timestamp: DateTime<Utc>,
    },

    /// The run reached a terminal state
    RunCompleted {
        session_id: String,
        status: RunStatus,
        iterations: u32,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based bus for run events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub. Publishing with
/// no subscribers is a no-op.
pub struct EventBus {
    sender: broadcast::Sender<Arc<RunEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: RunEvent) {
        // Ignore send errors (no subscribers = that's fine)
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<RunEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Outcome, PlanStep};

    #[tokio::test]
    async fn publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let observation = Observation::new(
            PlanStep::new("list_files", serde_json::json!({}), ""),
            Outcome::Success {
                value: serde_json::json!(["a.txt"]),
            },
        );
        bus.publish(RunEvent::ObservationRecorded {
            session_id: "s1".into(),
            observation,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            RunEvent::ObservationRecorded { observation, .. } => {
                assert_eq!(observation.step.tool_name, "list_files");
                assert!(observation.outcome.is_success());
            }
            other => panic!("expected ObservationRecorded, got {other:?}"),
        }
    }

    #[test]
    fn no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(RunEvent::RunCompleted {
            session_id: "s1".into(),
            status: RunStatus::Done,
            iterations: 3,
            timestamp: Utc::now(),
        });
    }
}

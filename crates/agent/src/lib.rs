//! The loopwright orchestration loop.
//!
//! One run flows through a bounded state machine: the [`Planner`] asks the
//! model to pick a tool or finish, the [`Executor`] invokes the tool and
//! records an observation, the [`RecoveryController`] repairs failures
//! within a retry budget, and the [`Synthesizer`] writes the final reply.
//! The [`GraphRunner`] owns the session and drives the transitions.

pub mod executor;
pub mod planner;
pub mod prompt;
pub mod recovery;
pub mod runner;
pub mod synthesizer;

pub use executor::Executor;
pub use planner::Planner;
pub use recovery::{RecoveryController, Repair};
pub use runner::{GraphRunner, RunError, RunLimits, RunReport};
pub use synthesizer::Synthesizer;

//! # Loopwright Core
//!
//! Domain types, traits, and error definitions for the loopwright agent
//! orchestration loop. This crate has **zero framework dependencies** — it
//! defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! The two external capability seams — model backends and tools — are
//! defined as traits here. Implementations live in their respective crates.
//! This enables:
//! - Swapping implementations via configuration
//! - Easy testing with scripted/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod event;
pub mod message;
pub mod provider;
pub mod session;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError};
pub use event::{EventBus, RunEvent};
pub use message::{Conversation, Message, MessageToolCall, Role};
pub use provider::{Decision, Provider, ProviderRequest, ProviderResponse, Usage};
pub use session::{
    FailureKind, Observation, Outcome, PlanStep, RunStatus, SessionSnapshot, SessionState,
};
pub use tool::{Tool, ToolDefinition, ToolRegistry};

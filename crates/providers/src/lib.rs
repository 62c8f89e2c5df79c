//! Model backend implementations for loopwright.
//!
//! - [`OpenAiCompatProvider`] — talks to any OpenAI-compatible
//!   `/chat/completions` endpoint over HTTP.
//! - [`ScriptedProvider`] — replays pre-programmed turns; used by the test
//!   suites and the CLI's offline mode.

pub mod openai_compat;
pub mod scripted;

pub use openai_compat::OpenAiCompatProvider;
pub use scripted::{ScriptedProvider, ScriptedTurn};

//! Tool-calling emulation for text-only backends
//!
//! Accepts `OpenAI` and Anthropic chat requests carrying tool definitions,
//! renders the tools into the prompt of a plain text backend, and turns
//! whatever the model writes back into well-formed tool calls. Calls to
//! registered built-ins can be executed server-side; everything else is
//! handed back to the client.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod backend;
pub mod convert;
pub mod emulation;
pub mod error;
mod handler;
pub mod protocol;
mod state;
pub mod stream;
pub mod tools;
pub mod types;

pub use backend::{BackendKind, BackendPayload, CompletionBackend, TextRequest};
pub use emulation::{Completion, EmulationEngine};
pub use error::{LlmError, ToolSpecIssue};
pub use handler::llm_router;
pub use state::LlmState;
pub use tools::{ToolExecutionEngine, ToolHandler, ToolOutcome, ToolRegistry, ToolResponse};
pub use types::{CompletionRequest, CompletionResponse, StreamEvent};

//! Server-side tool execution
//!
//! Built-in functions are registered at startup. Calls naming anything else
//! are handed back to the client as pass-through results.

pub mod builtins;
mod coerce;
mod engine;
mod error;
mod handler;
mod registry;
mod security;

pub use coerce::{coerce_arguments, coerce_value};
pub use engine::ToolExecutionEngine;
pub use error::{ToolError, ValidationError};
pub use handler::{ToolHandler, ToolOutcome, ToolResponse};
pub use registry::ToolRegistry;
pub use security::{SecurityPolicy, sandboxed_path};

//! Conversion between canonical types and the client-facing wire formats

pub mod anthropic;
pub mod openai;

use crate::error::LlmError;
use crate::types::{ToolChoice, ToolDefinition};

/// A pinned function must be one of the declared tools
fn check_pinned(choice: &ToolChoice, tools: &[ToolDefinition]) -> Result<(), LlmError> {
    match choice.pinned() {
        Some(name) if !tools.iter().any(|t| t.function.name == name) => Err(LlmError::InvalidRequest(format!(
            "tool_choice names `{name}`, which is not among the declared tools"
        ))),
        _ => Ok(()),
    }
}

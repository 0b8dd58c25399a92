use std::time::Duration;

use async_trait::async_trait;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

use super::error::ToolError;
use crate::types::FunctionDefinition;

/// A function the gateway can execute itself
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Schema advertised to the model
    fn definition(&self) -> &FunctionDefinition;

    /// Synonym keys rewritten to canonical parameter names, as `(alias, canonical)`
    fn aliases(&self) -> &[(&'static str, &'static str)] {
        &[]
    }

    /// Whether the handler touches the host and needs explicit opt-in
    fn is_dangerous(&self) -> bool {
        false
    }

    /// Run with validated arguments
    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError>;
}

/// Result of one tool call
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutcome {
    /// Handler produced a value
    Success(Value),
    /// No handler is registered; the client is expected to run the call
    Passthrough,
    /// Validation, policy, timeout or handler failure
    Error(String),
}

/// Outcome of a tool call along with its identity and timing
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResponse {
    pub tool_call_id: String,
    pub function_name: String,
    pub outcome: ToolOutcome,
    /// Arguments handed back for passthrough calls
    pub arguments: Option<Map<String, Value>>,
    pub duration: Duration,
}

impl ToolResponse {
    pub const fn is_success(&self) -> bool {
        !matches!(self.outcome, ToolOutcome::Error(_))
    }

    pub const fn is_passthrough(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Passthrough)
    }

    /// Text fed back to the model as the tool message
    pub fn content(&self) -> String {
        match &self.outcome {
            ToolOutcome::Success(Value::String(text)) => text.clone(),
            ToolOutcome::Success(value) => value.to_string(),
            ToolOutcome::Passthrough => String::new(),
            ToolOutcome::Error(message) => format!("Error: {message}"),
        }
    }
}

impl Serialize for ToolResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("tool_call_id", &self.tool_call_id)?;
        map.serialize_entry("function_name", &self.function_name)?;
        map.serialize_entry("success", &self.is_success())?;

        match &self.outcome {
            ToolOutcome::Success(value) => map.serialize_entry("result", value)?,
            ToolOutcome::Passthrough => map.serialize_entry("passthrough", &true)?,
            ToolOutcome::Error(message) => map.serialize_entry("error", message)?,
        }

        if let Some(arguments) = &self.arguments {
            map.serialize_entry("arguments", arguments)?;
        }

        let duration_ms = u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX);
        map.serialize_entry("duration_ms", &duration_ms)?;
        map.end()
    }
}

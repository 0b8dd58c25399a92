use std::time::Duration;

use thiserror::Error;

/// Argument validation failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Required argument absent or null
    #[error("missing required argument `{field}`")]
    Missing { field: String },

    /// Value could not be coerced to the declared type
    #[error("argument `{field}` must be {expected}, got {found}")]
    Type {
        field: String,
        expected: &'static str,
        found: String,
    },

    /// Value is not one of the declared enum values
    #[error("argument `{field}` must be one of {allowed}")]
    NotInEnum { field: String, allowed: String },

    /// Domain-level constraint on a coerced value
    #[error("argument `{field}` {message}")]
    Invalid { field: String, message: String },
}

/// Failures while executing a single tool call
#[derive(Debug, Error)]
pub enum ToolError {
    /// Arguments did not satisfy the function schema
    #[error("invalid arguments: {0}")]
    InvalidArguments(#[from] ValidationError),

    /// Blocked by the security policy
    #[error("call to `{function}` denied: {reason}")]
    Denied { function: String, reason: String },

    /// Function exists but is switched off
    #[error("function `{0}` is disabled")]
    Disabled(String),

    /// Handler failed
    #[error("execution failed: {0}")]
    Execution(String),

    /// Handler exceeded the per-call timeout
    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
}

impl ToolError {
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArguments(ValidationError::Invalid {
            field: field.into(),
            message: message.into(),
        })
    }
}

impl From<std::io::Error> for ToolError {
    fn from(error: std::io::Error) -> Self {
        Self::Execution(error.to_string())
    }
}

use http::StatusCode;
use serde::Serialize;
use thiserror::Error;
use toolgate_core::HttpError;

/// A single problem found while validating caller-supplied tool definitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolSpecIssue {
    /// Function name, or `tools[i]` when the name itself is unusable
    pub tool: String,
    /// Dotted path of the offending field
    pub field: String,
    /// What is wrong with it
    pub message: String,
}

impl std::fmt::Display for ToolSpecIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}: {}", self.tool, self.field, self.message)
    }
}

/// Errors that can occur while serving a completion
#[derive(Debug, Error)]
pub enum LlmError {
    /// Named backend does not exist in configuration
    #[error("backend not found: {backend}")]
    BackendNotFound { backend: String },

    /// No stored conversation under this id
    #[error("conversation not found: {id}")]
    ConversationNotFound { id: String },

    /// Upstream backend failed or returned an unusable body
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Client sent a malformed or invalid request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// One or more tool definitions were rejected
    #[error("tool definitions rejected: {} issue(s)", .0.len())]
    ValidationFailed(Vec<ToolSpecIssue>),

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl HttpError for LlmError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BackendNotFound { .. } | Self::ConversationNotFound { .. } => StatusCode::NOT_FOUND,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::InvalidRequest(_) | Self::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::BackendNotFound { .. } | Self::ConversationNotFound { .. } => "not_found_error",
            Self::Upstream(_) => "upstream_error",
            Self::InvalidRequest(_) | Self::ValidationFailed(_) => "invalid_request_error",
            Self::Internal(_) => "internal_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Internal(_) => "an internal error occurred".to_owned(),
            Self::ValidationFailed(issues) => {
                let listed = issues.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ");
                format!("tool definitions rejected: {listed}")
            }
            other => other.to_string(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::ValidationFailed(issues) => serde_json::to_value(issues).ok(),
            _ => None,
        }
    }
}

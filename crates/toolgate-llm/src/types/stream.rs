use super::message::Role;
use super::response::{FinishReason, Usage};

/// Event in a synthesized response stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Incremental content delta
    Delta(StreamDelta),
    /// Final usage statistics (sent at stream end)
    Usage(Usage),
    /// Stream has completed
    Done,
}

/// Incremental update within a streaming response
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamDelta {
    /// Choice index this delta belongs to
    pub index: u32,
    /// Role (first delta only)
    pub role: Option<Role>,
    /// Incremental text content
    pub content: Option<String>,
    /// Incremental tool call data
    pub tool_call: Option<StreamToolCall>,
    /// Reason generation finished (present on final delta)
    pub finish_reason: Option<FinishReason>,
}

/// Partial tool call data within a stream delta
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamToolCall {
    /// Index of this tool call in the `tool_calls` array
    pub index: u32,
    /// Tool call ID (present on first chunk only)
    pub id: Option<String>,
    /// Function name (present on first chunk only)
    pub name: Option<String>,
    /// Incremental arguments JSON fragment
    pub arguments: Option<String>,
}

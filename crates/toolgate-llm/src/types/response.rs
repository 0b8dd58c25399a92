use serde::Serialize;

use super::message::{Role, ToolCall};

/// Reason the model stopped generating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// Natural end of generation
    Stop,
    /// Hit the `max_tokens` limit
    Length,
    /// Model decided to call a tool
    ToolCalls,
    /// Content was filtered by safety systems
    ContentFilter,
}

impl FinishReason {
    /// Decide the finish reason from the three signals, in priority order
    pub const fn decide(has_tool_calls: bool, content_filtered: bool, truncated: bool) -> Self {
        if has_tool_calls {
            Self::ToolCalls
        } else if content_filtered {
            Self::ContentFilter
        } else if truncated {
            Self::Length
        } else {
            Self::Stop
        }
    }

    /// `OpenAI` wire value
    pub const fn as_openai(self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Length => "length",
            Self::ToolCalls => "tool_calls",
            Self::ContentFilter => "content_filter",
        }
    }

    /// Anthropic `stop_reason` value
    pub const fn as_anthropic(self) -> &'static str {
        match self {
            Self::Stop | Self::ContentFilter => "end_turn",
            Self::Length => "max_tokens",
            Self::ToolCalls => "tool_use",
        }
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    /// Tokens consumed by the prompt
    pub prompt_tokens: u32,
    /// Tokens generated in the completion
    pub completion_tokens: u32,
    /// Total tokens (prompt + completion)
    pub total_tokens: u32,
}

impl Usage {
    pub const fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// A single completion choice
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    /// Index of this choice
    pub index: u32,
    /// Generated message
    pub message: ChoiceMessage,
    /// Why generation stopped
    pub finish_reason: FinishReason,
}

/// Message content within a response choice
///
/// `content` is empty exactly when `tool_calls` is not.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceMessage {
    /// Always assistant for completions
    pub role: Role,
    /// Text content
    pub content: String,
    /// Tool calls requested by the model
    pub tool_calls: Vec<ToolCall>,
}

impl ChoiceMessage {
    /// Create a simple text message from the assistant
    pub const fn text(content: String) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls: Vec::new(),
        }
    }

    /// Create a tool-calling message from the assistant
    pub const fn with_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            tool_calls,
        }
    }
}

/// Internal canonical completion response
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionResponse {
    /// Unique response identifier
    pub id: String,
    /// Unix timestamp of creation
    pub created: u64,
    /// Model reported to the client
    pub model: String,
    /// Generated choices, always exactly one
    pub choices: Vec<Choice>,
    /// Token usage statistics
    pub usage: Usage,
}

impl CompletionResponse {
    /// The first (and only) choice
    pub fn choice(&self) -> Option<&Choice> {
        self.choices.first()
    }

    /// Tool calls of the first choice
    pub fn tool_calls(&self) -> &[ToolCall] {
        self.choice().map(|c| c.message.tool_calls.as_slice()).unwrap_or_default()
    }

    /// Text content of the first choice
    pub fn content(&self) -> &str {
        self.choice().map_or("", |c| c.message.content.as_str())
    }

    pub fn finish_reason(&self) -> FinishReason {
        self.choice().map_or(FinishReason::Stop, |c| c.finish_reason)
    }
}

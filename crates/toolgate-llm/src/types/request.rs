use super::message::Message;
use super::tool::{ToolChoice, ToolDefinition};

/// Parameters controlling text generation
#[derive(Debug, Clone, Default)]
pub struct CompletionParams {
    /// Sampling temperature (0.0 to 2.0)
    pub temperature: Option<f64>,
    /// Nucleus sampling threshold
    pub top_p: Option<f64>,
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Stop sequences
    pub stop: Option<Vec<String>>,
}

/// Internal canonical completion request
///
/// Tool definitions in here have already been validated.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Model identifier as sent by the client
    pub model: String,
    /// Conversation messages
    pub messages: Vec<Message>,
    /// Generation parameters
    pub params: CompletionParams,
    /// Tool definitions available to the model
    pub tools: Vec<ToolDefinition>,
    /// How the model should select tools
    pub tool_choice: ToolChoice,
    /// Whether to stream the response
    pub stream: bool,
}

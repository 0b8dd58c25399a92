//! Legacy text completions wire format (`POST /completions`)

use serde::{Deserialize, Serialize};

/// Text completion request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextCompletionRequest {
    /// Model identifier
    pub model: String,
    /// Full prompt text
    pub prompt: String,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// Sampling temperature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Stop sequences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

/// Text completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextCompletionResponse {
    /// Response identifier
    #[serde(default)]
    pub id: String,
    /// Generated choices
    #[serde(default)]
    pub choices: Vec<TextChoice>,
    /// Token usage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TextUsage>,
}

/// Choice within a text completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextChoice {
    /// Generated text
    #[serde(default)]
    pub text: String,
    /// Choice index
    #[serde(default)]
    pub index: u32,
    /// Why generation stopped
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Token usage in a text completion response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextUsage {
    /// Prompt tokens
    #[serde(default)]
    pub prompt_tokens: u32,
    /// Completion tokens
    #[serde(default)]
    pub completion_tokens: u32,
}

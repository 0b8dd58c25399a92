//! Wire types for the tool endpoints (`/v1/tools`, `/v1/tools/execute`)

use serde::{Deserialize, Serialize};

use super::openai::{OpenAiTool, OpenAiToolCall};

/// Registered built-in tools
#[derive(Debug, Clone, Serialize)]
pub struct ToolList {
    /// Object type (always "list")
    pub object: String,
    /// Tools in `OpenAI` shape
    pub data: Vec<OpenAiTool>,
}

/// Direct execution request
#[derive(Debug, Clone, Deserialize)]
pub struct ExecuteToolsRequest {
    /// Calls to run, in `OpenAI` shape
    pub tool_calls: Vec<OpenAiToolCall>,
}

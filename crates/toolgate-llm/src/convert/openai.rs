//! Conversion between canonical types and the `OpenAI` wire format

use serde_json::Value;

use crate::emulation::validator::validate_tools;
use crate::error::LlmError;
use crate::protocol::openai::{
    OpenAiChoice, OpenAiChoiceMessage, OpenAiContent, OpenAiContentPart, OpenAiFunction, OpenAiFunctionCall,
    OpenAiMessage, OpenAiRequest, OpenAiResponse, OpenAiStreamChoice, OpenAiStreamChunk, OpenAiStreamDelta,
    OpenAiStreamFunctionCall, OpenAiStreamToolCall, OpenAiTool, OpenAiToolCall, OpenAiUsage,
};
use crate::types::{
    CompletionParams, CompletionRequest, CompletionResponse, Content, ContentPart, FunctionDefinition, Message, Role,
    StreamDelta, ToolCall, ToolChoice, ToolDialect, Usage,
};

// -- Inbound: OpenAI wire format -> canonical types --

impl TryFrom<OpenAiRequest> for CompletionRequest {
    type Error = LlmError;

    fn try_from(req: OpenAiRequest) -> Result<Self, Self::Error> {
        if req.messages.is_empty() {
            return Err(LlmError::InvalidRequest("messages must not be empty".to_owned()));
        }

        let tools = validate_tools(req.tools.as_deref().unwrap_or_default(), ToolDialect::OpenAi)?;
        let tool_choice = match &req.tool_choice {
            Some(value) => parse_tool_choice(value)?,
            None => ToolChoice::Auto,
        };
        super::check_pinned(&tool_choice, &tools)?;

        Ok(Self {
            model: req.model,
            messages: req.messages.into_iter().map(Into::into).collect(),
            params: CompletionParams {
                temperature: req.temperature,
                top_p: req.top_p,
                max_tokens: req.max_tokens,
                stop: req.stop,
            },
            tools,
            tool_choice,
            stream: req.stream.unwrap_or(false),
        })
    }
}

impl From<OpenAiMessage> for Message {
    fn from(msg: OpenAiMessage) -> Self {
        let role = match msg.role.as_str() {
            "system" | "developer" => Role::System,
            "assistant" => Role::Assistant,
            "tool" => Role::Tool,
            _ => Role::User,
        };

        let content = match msg.content {
            Some(OpenAiContent::Text(text)) => Content::Text(text),
            Some(OpenAiContent::Parts(parts)) => Content::Parts(parts.into_iter().map(Into::into).collect()),
            None => Content::Text(String::new()),
        };

        let tool_calls = msg
            .tool_calls
            .map(|calls| calls.into_iter().map(ToolCall::from).collect::<Vec<_>>())
            .filter(|calls| !calls.is_empty());

        Self {
            role,
            content,
            name: msg.name,
            tool_calls,
            tool_call_id: msg.tool_call_id,
        }
    }
}

impl From<OpenAiContentPart> for ContentPart {
    fn from(part: OpenAiContentPart) -> Self {
        match part {
            OpenAiContentPart::Text { text } => Self::Text { text },
            OpenAiContentPart::ImageUrl { image_url } => Self::Image { url: image_url.url },
        }
    }
}

/// Client-supplied calls keep their id; unusable arguments become `{}`
impl From<OpenAiToolCall> for ToolCall {
    fn from(call: OpenAiToolCall) -> Self {
        let OpenAiFunctionCall { name, arguments } = call.function;

        Self::canonical(Some(call.id.clone()), name.clone(), &arguments)
            .unwrap_or_else(|| Self::new(Some(call.id), name, &serde_json::Map::new()))
    }
}

/// Parse `tool_choice`: `"auto"`, `"none"`, `"required"` or
/// `{"type": "function", "function": {"name": ...}}`
pub fn parse_tool_choice(value: &Value) -> Result<ToolChoice, LlmError> {
    match value {
        Value::String(s) => match s.as_str() {
            "auto" => Ok(ToolChoice::Auto),
            "none" => Ok(ToolChoice::None),
            "required" => Ok(ToolChoice::Required),
            other => Err(LlmError::InvalidRequest(format!("unknown tool_choice `{other}`"))),
        },
        Value::Object(map) => map
            .get("function")
            .and_then(|f| f.get("name"))
            .or_else(|| map.get("name"))
            .and_then(Value::as_str)
            .map(|name| ToolChoice::Function(name.to_owned()))
            .ok_or_else(|| LlmError::InvalidRequest("tool_choice object must name a function".to_owned())),
        _ => Err(LlmError::InvalidRequest("tool_choice must be a string or an object".to_owned())),
    }
}

// -- Outbound: canonical types -> OpenAI wire format --

impl From<CompletionResponse> for OpenAiResponse {
    fn from(resp: CompletionResponse) -> Self {
        Self {
            id: resp.id,
            object: "chat.completion".to_owned(),
            created: resp.created,
            model: resp.model,
            choices: resp
                .choices
                .into_iter()
                .map(|choice| {
                    let tool_calls = (!choice.message.tool_calls.is_empty())
                        .then(|| choice.message.tool_calls.iter().map(Into::into).collect());

                    OpenAiChoice {
                        index: choice.index,
                        message: OpenAiChoiceMessage {
                            role: "assistant".to_owned(),
                            content: Some(choice.message.content),
                            tool_calls,
                        },
                        finish_reason: Some(choice.finish_reason.as_openai().to_owned()),
                    }
                })
                .collect(),
            usage: Some(resp.usage.into()),
        }
    }
}

impl From<&ToolCall> for OpenAiToolCall {
    fn from(call: &ToolCall) -> Self {
        Self {
            id: call.id.clone(),
            tool_type: "function".to_owned(),
            function: OpenAiFunctionCall {
                name: call.function.name.clone(),
                arguments: call.function.arguments.clone(),
            },
        }
    }
}

impl From<Usage> for OpenAiUsage {
    fn from(usage: Usage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

impl From<&FunctionDefinition> for OpenAiTool {
    fn from(function: &FunctionDefinition) -> Self {
        Self {
            tool_type: "function".to_owned(),
            function: OpenAiFunction {
                name: function.name.clone(),
                description: Some(function.description.clone()),
                parameters: Some(function.parameters.to_json()),
            },
        }
    }
}

// -- Stream conversion --

/// Identity shared by every chunk of one streamed response
#[derive(Debug, Clone)]
pub struct ChunkHeader {
    pub id: String,
    pub created: u64,
    pub model: String,
}

/// Convert a canonical stream delta to an `OpenAI` chunk
pub fn delta_to_chunk(delta: &StreamDelta, header: &ChunkHeader) -> OpenAiStreamChunk {
    let tool_calls = delta.tool_call.as_ref().map(|tc| {
        vec![OpenAiStreamToolCall {
            index: tc.index,
            id: tc.id.clone(),
            tool_type: tc.id.as_ref().map(|_| "function".to_owned()),
            function: Some(OpenAiStreamFunctionCall {
                name: tc.name.clone(),
                arguments: tc.arguments.clone(),
            }),
        }]
    });

    OpenAiStreamChunk {
        id: header.id.clone(),
        object: "chat.completion.chunk".to_owned(),
        created: header.created,
        model: header.model.clone(),
        choices: vec![OpenAiStreamChoice {
            index: delta.index,
            delta: OpenAiStreamDelta {
                role: delta.role.map(|_| "assistant".to_owned()),
                content: delta.content.clone(),
                tool_calls,
            },
            finish_reason: delta.finish_reason.map(|r| r.as_openai().to_owned()),
        }],
        usage: None,
    }
}

/// Final chunk carrying usage and no choices
pub fn usage_to_chunk(usage: Usage, header: &ChunkHeader) -> OpenAiStreamChunk {
    OpenAiStreamChunk {
        id: header.id.clone(),
        object: "chat.completion.chunk".to_owned(),
        created: header.created,
        model: header.model.clone(),
        choices: Vec::new(),
        usage: Some(usage.into()),
    }
}

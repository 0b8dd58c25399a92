//! Conversion between canonical types and the Anthropic wire format

use serde_json::Value;

use crate::emulation::validator::validate_tools;
use crate::error::LlmError;
use crate::protocol::anthropic::{
    AnthropicContent, AnthropicContentBlock, AnthropicMessage, AnthropicRequest, AnthropicResponse,
    AnthropicResponseBlock, AnthropicToolChoice, AnthropicUsage,
};
use crate::types::{
    CompletionParams, CompletionRequest, CompletionResponse, Content, ContentPart, Message, Role, ToolCall, ToolChoice,
    ToolDialect,
};

// -- Inbound: Anthropic wire format -> canonical types --

impl TryFrom<AnthropicRequest> for CompletionRequest {
    type Error = LlmError;

    fn try_from(req: AnthropicRequest) -> Result<Self, Self::Error> {
        if req.messages.is_empty() {
            return Err(LlmError::InvalidRequest("messages must not be empty".to_owned()));
        }

        let tools = validate_tools(req.tools.as_deref().unwrap_or_default(), ToolDialect::Anthropic)?;
        let tool_choice = req.tool_choice.as_ref().map_or(Ok(ToolChoice::Auto), parse_tool_choice)?;
        super::check_pinned(&tool_choice, &tools)?;

        let mut messages = Vec::with_capacity(req.messages.len() + 1);
        if let Some(system) = &req.system {
            let text = system.as_text();
            if !text.trim().is_empty() {
                messages.push(Message::text(Role::System, text));
            }
        }
        for message in req.messages {
            messages.extend(split_message(message));
        }

        Ok(Self {
            model: req.model,
            messages,
            params: CompletionParams {
                temperature: req.temperature,
                top_p: req.top_p,
                max_tokens: Some(req.max_tokens),
                stop: req.stop_sequences,
            },
            tools,
            tool_choice,
            stream: req.stream.unwrap_or(false),
        })
    }
}

/// One Anthropic message may carry text, tool uses and several tool results
///
/// Tool results become separate tool messages, emitted before any text in
/// the same message.
fn split_message(message: AnthropicMessage) -> Vec<Message> {
    let role = match message.role.as_str() {
        "assistant" => Role::Assistant,
        _ => Role::User,
    };

    let blocks = match message.content {
        AnthropicContent::Text(text) => return vec![Message::text(role, text)],
        AnthropicContent::Blocks(blocks) => blocks,
    };

    let mut parts = Vec::new();
    let mut tool_calls = Vec::new();
    let mut results = Vec::new();

    for block in blocks {
        match block {
            AnthropicContentBlock::Text { text } => parts.push(ContentPart::Text { text }),
            AnthropicContentBlock::Image { source } => {
                let url = match source.media_type {
                    Some(mime) if source.source_type == "base64" => format!("data:{mime};base64,{}", source.data),
                    _ => source.data,
                };
                parts.push(ContentPart::Image { url });
            }
            AnthropicContentBlock::ToolUse { id, name, input } => {
                let arguments = match input {
                    Value::Object(map) => map,
                    _ => serde_json::Map::new(),
                };
                tool_calls.push(ToolCall::new(Some(id), name, &arguments));
            }
            AnthropicContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                let mut text = content.as_ref().map(result_text).unwrap_or_default();
                if is_error == Some(true) {
                    text = format!("Error: {text}");
                }
                results.push(Message::tool_result(tool_use_id, text));
            }
        }
    }

    let has_body = !parts.is_empty() || !tool_calls.is_empty();
    let mut messages = results;

    if has_body || messages.is_empty() {
        let content = match parts.as_slice() {
            [] => Content::Text(String::new()),
            [ContentPart::Text { text }] => Content::Text(text.clone()),
            _ => Content::Parts(parts),
        };

        messages.push(Message {
            role,
            content,
            name: None,
            tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            tool_call_id: None,
        });
    }

    messages
}

/// Tool result content is a string or a list of text blocks
fn result_text(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(|b| b.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

/// `auto`, `any`, `none` or `{"type": "tool", "name": ...}`
pub fn parse_tool_choice(choice: &AnthropicToolChoice) -> Result<ToolChoice, LlmError> {
    match choice.choice_type.as_str() {
        "auto" => Ok(ToolChoice::Auto),
        "any" => Ok(ToolChoice::Required),
        "none" => Ok(ToolChoice::None),
        "tool" => choice
            .name
            .clone()
            .map(ToolChoice::Function)
            .ok_or_else(|| LlmError::InvalidRequest("tool_choice of type `tool` requires a name".to_owned())),
        other => Err(LlmError::InvalidRequest(format!("unknown tool_choice type `{other}`"))),
    }
}

// -- Outbound: canonical types -> Anthropic wire format --

impl From<CompletionResponse> for AnthropicResponse {
    fn from(resp: CompletionResponse) -> Self {
        let finish_reason = resp.finish_reason();
        let mut content = Vec::new();

        if let Some(choice) = resp.choices.into_iter().next() {
            if !choice.message.content.is_empty() || choice.message.tool_calls.is_empty() {
                content.push(AnthropicResponseBlock::Text {
                    text: choice.message.content,
                });
            }
            content.extend(choice.message.tool_calls.iter().map(tool_use_block));
        }

        Self {
            id: message_id(&resp.id),
            response_type: "message".to_owned(),
            role: "assistant".to_owned(),
            content,
            model: resp.model,
            stop_reason: Some(finish_reason.as_anthropic().to_owned()),
            stop_sequence: None,
            usage: AnthropicUsage {
                input_tokens: resp.usage.prompt_tokens,
                output_tokens: resp.usage.completion_tokens,
            },
        }
    }
}

/// `tool_use` block for a canonical call
pub fn tool_use_block(call: &ToolCall) -> AnthropicResponseBlock {
    AnthropicResponseBlock::ToolUse {
        id: call.id.clone(),
        name: call.function.name.clone(),
        input: Value::Object(call.arguments()),
    }
}

/// `msg_<ts>` for a canonical `chatcmpl-<ts>` id
pub fn message_id(id: &str) -> String {
    format!("msg_{}", id.strip_prefix("chatcmpl-").unwrap_or(id))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::{Choice, ChoiceMessage, FinishReason, Usage};

    fn request(body: Value) -> Result<CompletionRequest, LlmError> {
        let wire: AnthropicRequest = serde_json::from_value(body).unwrap();
        CompletionRequest::try_from(wire)
    }

    #[test]
    fn system_tools_and_choice() {
        let req = request(json!({
            "model": "local",
            "max_tokens": 256,
            "system": "Be brief.",
            "messages": [{"role": "user", "content": "Weather in Paris?"}],
            "tools": [{
                "name": "get_weather",
                "description": "Get the weather",
                "input_schema": {"type": "object", "properties": {"location": {"type": "string"}}, "required": ["location"]}
            }],
            "tool_choice": {"type": "any"}
        }))
        .unwrap();

        assert_eq!(req.messages[0].role, Role::System);
        assert_eq!(req.tools[0].dialect, ToolDialect::Anthropic);
        assert_eq!(req.tool_choice, ToolChoice::Required);
        assert_eq!(req.params.max_tokens, Some(256));
    }

    #[test]
    fn tool_results_become_tool_messages() {
        let req = request(json!({
            "model": "local",
            "max_tokens": 256,
            "messages": [
                {"role": "user", "content": "Weather in Paris and Rome?"},
                {"role": "assistant", "content": [
                    {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {"location": "Paris"}},
                    {"type": "tool_use", "id": "toolu_2", "name": "get_weather", "input": {"location": "Rome"}}
                ]},
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "toolu_1", "content": "18C"},
                    {"type": "tool_result", "tool_use_id": "toolu_2", "content": [{"type": "text", "text": "24C"}], "is_error": false}
                ]}
            ]
        }))
        .unwrap();

        let roles: Vec<_> = req.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::User, Role::Assistant, Role::Tool, Role::Tool]);
        assert_eq!(req.messages[1].tool_calls().len(), 2);
        assert_eq!(req.messages[1].tool_calls()[0].function.arguments, r#"{"location":"Paris"}"#);
        assert_eq!(req.messages[3].tool_call_id.as_deref(), Some("toolu_2"));
        assert_eq!(req.messages[3].content.as_text(), "24C");
    }

    #[test]
    fn tool_choice_requires_a_name() {
        let error = request(json!({
            "model": "local",
            "max_tokens": 16,
            "messages": [{"role": "user", "content": "hi"}],
            "tool_choice": {"type": "tool"}
        }))
        .unwrap_err();

        assert!(matches!(error, LlmError::InvalidRequest(_)));
    }

    #[test]
    fn response_renders_tool_use_blocks() {
        let call = ToolCall::new(Some("call_1".to_owned()), "get_weather", json!({"location": "Paris"}).as_object().unwrap());
        let response = CompletionResponse {
            id: "chatcmpl-1700000000000".to_owned(),
            created: 1_700_000_000,
            model: "local".to_owned(),
            choices: vec![Choice {
                index: 0,
                message: ChoiceMessage::with_tool_calls(vec![call]),
                finish_reason: FinishReason::ToolCalls,
            }],
            usage: Usage::new(12, 4),
        };

        let wire = serde_json::to_value(AnthropicResponse::from(response)).unwrap();

        assert_eq!(
            wire,
            json!({
                "id": "msg_1700000000000",
                "type": "message",
                "role": "assistant",
                "content": [{"type": "tool_use", "id": "call_1", "name": "get_weather", "input": {"location": "Paris"}}],
                "model": "local",
                "stop_reason": "tool_use",
                "stop_sequence": null,
                "usage": {"input_tokens": 12, "output_tokens": 4}
            })
        );
    }
}

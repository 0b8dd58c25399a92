//! Streaming synthesized from a finished response
//!
//! The backend is always called to completion first, so streams are a
//! replay of the normalized response in a fixed order: role, content,
//! each tool call (id and name, then argument fragments), finish reason,
//! usage and the terminator.

use crate::convert::anthropic::message_id;
use crate::protocol::anthropic::{
    AnthropicMessageDelta, AnthropicStreamContentBlock, AnthropicStreamDelta, AnthropicStreamEvent,
    AnthropicStreamMessage, AnthropicUsage,
};
use crate::types::{CompletionResponse, FinishReason, Role, StreamDelta, StreamEvent, StreamToolCall};

/// Characters of content per delta
const CONTENT_CHUNK: usize = 32;

/// Characters of argument JSON per delta
const ARGUMENTS_CHUNK: usize = 48;

/// Canonical events replaying `response`
pub fn response_events(response: &CompletionResponse) -> Vec<StreamEvent> {
    let mut events = vec![StreamEvent::Delta(StreamDelta {
        role: Some(Role::Assistant),
        ..StreamDelta::default()
    })];

    for piece in chunks(response.content(), CONTENT_CHUNK) {
        events.push(StreamEvent::Delta(StreamDelta {
            content: Some(piece.to_owned()),
            ..StreamDelta::default()
        }));
    }

    for (index, call) in (0u32..).zip(response.tool_calls()) {
        events.push(StreamEvent::Delta(StreamDelta {
            tool_call: Some(StreamToolCall {
                index,
                id: Some(call.id.clone()),
                name: Some(call.function.name.clone()),
                arguments: None,
            }),
            ..StreamDelta::default()
        }));

        for fragment in chunks(&call.function.arguments, ARGUMENTS_CHUNK) {
            events.push(StreamEvent::Delta(StreamDelta {
                tool_call: Some(StreamToolCall {
                    index,
                    id: None,
                    name: None,
                    arguments: Some(fragment.to_owned()),
                }),
                ..StreamDelta::default()
            }));
        }
    }

    events.push(StreamEvent::Delta(StreamDelta {
        finish_reason: Some(response.finish_reason()),
        ..StreamDelta::default()
    }));
    events.push(StreamEvent::Usage(response.usage));
    events.push(StreamEvent::Done);

    events
}

/// Anthropic named events replaying `response`
pub fn anthropic_events(response: &CompletionResponse) -> Vec<AnthropicStreamEvent> {
    let mut events = vec![AnthropicStreamEvent::MessageStart {
        message: AnthropicStreamMessage {
            id: message_id(&response.id),
            message_type: "message".to_owned(),
            role: "assistant".to_owned(),
            model: response.model.clone(),
            content: Vec::new(),
            stop_reason: None,
            usage: Some(AnthropicUsage {
                input_tokens: response.usage.prompt_tokens,
                output_tokens: 0,
            }),
        },
    }];

    let mut open: Option<u32> = None;
    let mut next_index = 0;
    let mut stop_reason = FinishReason::Stop;

    for event in response_events(response) {
        match event {
            StreamEvent::Delta(delta) => {
                if let Some(text) = delta.content {
                    let index = *open.get_or_insert_with(|| {
                        events.push(AnthropicStreamEvent::ContentBlockStart {
                            index: next_index,
                            content_block: AnthropicStreamContentBlock::Text { text: String::new() },
                        });
                        next_index += 1;
                        next_index - 1
                    });
                    events.push(AnthropicStreamEvent::ContentBlockDelta {
                        index,
                        delta: AnthropicStreamDelta::TextDelta { text },
                    });
                }

                if let Some(call) = delta.tool_call {
                    if let (Some(id), Some(name)) = (call.id, call.name) {
                        close_block(&mut events, &mut open);
                        events.push(AnthropicStreamEvent::ContentBlockStart {
                            index: next_index,
                            content_block: AnthropicStreamContentBlock::ToolUse {
                                id,
                                name,
                                input: serde_json::Value::Object(serde_json::Map::new()),
                            },
                        });
                        open = Some(next_index);
                        next_index += 1;
                    }
                    if let (Some(partial_json), Some(index)) = (call.arguments, open) {
                        events.push(AnthropicStreamEvent::ContentBlockDelta {
                            index,
                            delta: AnthropicStreamDelta::InputJsonDelta { partial_json },
                        });
                    }
                }

                if let Some(reason) = delta.finish_reason {
                    close_block(&mut events, &mut open);
                    stop_reason = reason;
                }
            }
            StreamEvent::Usage(usage) => events.push(AnthropicStreamEvent::MessageDelta {
                delta: AnthropicMessageDelta {
                    stop_reason: Some(stop_reason.as_anthropic().to_owned()),
                    stop_sequence: None,
                },
                usage: Some(AnthropicUsage {
                    input_tokens: usage.prompt_tokens,
                    output_tokens: usage.completion_tokens,
                }),
            }),
            StreamEvent::Done => events.push(AnthropicStreamEvent::MessageStop),
        }
    }

    events
}

/// SSE event name for an Anthropic stream event
pub const fn anthropic_event_name(event: &AnthropicStreamEvent) -> &'static str {
    match event {
        AnthropicStreamEvent::MessageStart { .. } => "message_start",
        AnthropicStreamEvent::ContentBlockStart { .. } => "content_block_start",
        AnthropicStreamEvent::ContentBlockDelta { .. } => "content_block_delta",
        AnthropicStreamEvent::ContentBlockStop { .. } => "content_block_stop",
        AnthropicStreamEvent::MessageDelta { .. } => "message_delta",
        AnthropicStreamEvent::MessageStop => "message_stop",
    }
}

fn close_block(events: &mut Vec<AnthropicStreamEvent>, open: &mut Option<u32>) {
    if let Some(index) = open.take() {
        events.push(AnthropicStreamEvent::ContentBlockStop { index });
    }
}

/// Split on char boundaries into pieces of at most `size` chars
fn chunks(text: &str, size: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;

    for (count, (offset, _)) in text.char_indices().enumerate() {
        if count > 0 && count % size == 0 {
            pieces.push(&text[start..offset]);
            start = offset;
        }
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }

    pieces
}

//! Backend-agnostic response normalization
//!
//! Every backend shape converges on one step that enforces the envelope
//! invariants: content is empty exactly when tool calls are present, every
//! call carries a canonical argument object, and the finish reason follows
//! from (tool calls, content filter, truncation) in that order.

use std::sync::LazyLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::Value;
use tiktoken_rs::{CoreBPE, o200k_base};

use super::cache::{NormalizationCache, cache_key};
use super::parser;
use super::validator::is_valid_name;
use crate::backend::{BackendKind, BackendPayload, TextPayload};
use crate::protocol::anthropic::{AnthropicResponse, AnthropicResponseBlock};
use crate::protocol::google::{GooglePart, GoogleResponse};
use crate::protocol::openai::OpenAiResponse;
use crate::types::{
    Choice, ChoiceMessage, CompletionResponse, FinishReason, ToolCall, ToolChoice, Usage, generate_call_id,
};

static TOKENIZER: LazyLock<Option<CoreBPE>> = LazyLock::new(|| o200k_base().ok());

/// Google finish reasons that mean the candidate was blocked
const GOOGLE_FILTER_REASONS: &[&str] = &["SAFETY", "RECITATION", "PROHIBITED_CONTENT", "BLOCKLIST", "SPII"];

/// Estimate token count using tiktoken
pub fn estimate_tokens(text: &str) -> u32 {
    let count = TOKENIZER
        .as_ref()
        .map_or_else(|| text.len() / 4, |bpe| bpe.encode_with_special_tokens(text).len());
    u32::try_from(count).unwrap_or(u32::MAX)
}

/// Inputs that shape normalization besides the payload itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizeOptions {
    /// Model reported to the client
    pub model: String,
    /// Functions the client declared; calls to anything else are dropped
    pub declared: Vec<String>,
    pub tool_choice: ToolChoice,
    /// Client token ceiling, used to detect truncation
    pub max_tokens: Option<u32>,
    /// Prompt size, used when the backend reports no usage
    pub prompt_tokens: u32,
}

/// Canonical envelope plus bookkeeping
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizationResult {
    pub response: CompletionResponse,
    /// Backend protocol the payload came from
    pub source: BackendKind,
    pub tool_call_count: usize,
    /// Time spent normalizing
    pub latency: Duration,
}

/// What an adapter pulls out of a backend payload
#[derive(Debug, Default)]
struct Extracted {
    text: String,
    native_calls: Vec<ToolCall>,
    content_filtered: bool,
    truncated: bool,
    usage: Option<Usage>,
}

impl NormalizationResult {
    /// Give a memoized result its own response id, timestamp and call ids
    fn refresh(&mut self) {
        let (id, created) = stamp();
        self.response.id = id;
        self.response.created = created;

        for choice in &mut self.response.choices {
            for call in &mut choice.message.tool_calls {
                call.id = generate_call_id();
            }
        }
    }
}

/// Maps any backend payload into the canonical envelope
pub struct ResponseNormalizer {
    cache: NormalizationCache,
}

impl ResponseNormalizer {
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            cache: NormalizationCache::new(cache_capacity),
        }
    }

    /// Normalize a payload, serving repeated inputs from the cache
    pub fn normalize(&self, payload: &BackendPayload, options: &NormalizeOptions) -> NormalizationResult {
        let start = Instant::now();
        let key = cache_key(payload, options);

        if let Some(key) = &key
            && let Some(mut cached) = self.cache.get(key)
        {
            tracing::trace!(source = %cached.source, "normalization cache hit");
            cached.refresh();
            cached.latency = start.elapsed();
            return cached;
        }

        let mut result = normalize_payload(payload, options);
        result.latency = start.elapsed();

        if let Some(key) = key {
            self.cache.insert(key, result.clone());
        }

        result
    }

    /// Number of memoized results
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

/// Normalize without touching the cache
pub fn normalize_payload(payload: &BackendPayload, options: &NormalizeOptions) -> NormalizationResult {
    let extracted = match payload {
        BackendPayload::Text(text) => from_text(text),
        BackendPayload::OpenAi(response) => from_openai(response),
        BackendPayload::Anthropic(response) => from_anthropic(response),
        BackendPayload::Google(response) => from_google(response),
    };

    let text = extracted.text.trim();
    let mut tool_calls = extracted.native_calls;

    let native = tool_calls.len();
    tool_calls.retain(|call| options.declared.contains(&call.function.name));
    if tool_calls.len() < native {
        tracing::debug!(dropped = native - tool_calls.len(), "dropped native calls to undeclared functions");
    }

    if options.tool_choice == ToolChoice::None {
        tool_calls.clear();
    } else if tool_calls.is_empty() && !options.declared.is_empty() {
        tool_calls = parser::parse(text, &options.declared).tool_calls;
    }

    if let Some(pinned) = options.tool_choice.pinned() {
        tool_calls.retain(|call| call.function.name == pinned);
    }

    let usage = extracted
        .usage
        .unwrap_or_else(|| Usage::new(options.prompt_tokens, estimate_tokens(text)));

    let hit_ceiling = options
        .max_tokens
        .is_some_and(|max| usage.completion_tokens > 0 && usage.completion_tokens >= max);

    let finish_reason = FinishReason::decide(
        !tool_calls.is_empty(),
        extracted.content_filtered,
        extracted.truncated || hit_ceiling,
    );

    let tool_call_count = tool_calls.len();
    let message = if tool_calls.is_empty() {
        ChoiceMessage::text(text.to_owned())
    } else {
        ChoiceMessage::with_tool_calls(tool_calls)
    };

    let (id, created) = stamp();

    NormalizationResult {
        response: CompletionResponse {
            id,
            created,
            model: options.model.clone(),
            choices: vec![Choice {
                index: 0,
                message,
                finish_reason,
            }],
            usage,
        },
        source: payload.kind(),
        tool_call_count,
        latency: Duration::ZERO,
    }
}

/// Fresh response id and creation time in seconds
fn stamp() -> (String, u64) {
    let created = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs());

    (format!("chatcmpl-{}", uuid::Uuid::new_v4().simple()), created)
}

// -- Adapters --

fn from_text(payload: &TextPayload) -> Extracted {
    let reason = payload.finish_reason.as_deref();

    Extracted {
        text: payload.text.clone(),
        native_calls: Vec::new(),
        content_filtered: reason == Some("content_filter"),
        truncated: reason == Some("length"),
        usage: payload.usage,
    }
}

fn from_openai(response: &OpenAiResponse) -> Extracted {
    let Some(choice) = response.choices.first() else {
        return Extracted::default();
    };

    let native_calls = choice
        .message
        .tool_calls
        .iter()
        .flatten()
        .filter(|call| is_valid_name(&call.function.name))
        .filter_map(|call| ToolCall::canonical(Some(call.id.clone()), &call.function.name, &call.function.arguments))
        .collect();

    let reason = choice.finish_reason.as_deref();

    Extracted {
        text: choice.message.content.clone().unwrap_or_default(),
        native_calls,
        content_filtered: reason == Some("content_filter"),
        truncated: reason == Some("length"),
        usage: response
            .usage
            .as_ref()
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens)),
    }
}

fn from_anthropic(response: &AnthropicResponse) -> Extracted {
    let mut text = String::new();
    let mut native_calls = Vec::new();

    for block in &response.content {
        match block {
            AnthropicResponseBlock::Text { text: part } => text.push_str(part),
            AnthropicResponseBlock::ToolUse { id, name, input } => {
                if let Some(call) = native_call(Some(id.clone()), name, input) {
                    native_calls.push(call);
                }
            }
            AnthropicResponseBlock::Other => {}
        }
    }

    let reason = response.stop_reason.as_deref();

    Extracted {
        text,
        native_calls,
        content_filtered: reason == Some("refusal"),
        truncated: reason == Some("max_tokens"),
        usage: Some(Usage::new(response.usage.input_tokens, response.usage.output_tokens)),
    }
}

fn from_google(response: &GoogleResponse) -> Extracted {
    let blocked = response
        .prompt_feedback
        .as_ref()
        .is_some_and(|feedback| feedback.block_reason.is_some());

    let usage = response
        .usage_metadata
        .as_ref()
        .map(|u| Usage::new(u.prompt_token_count, u.candidates_token_count));

    let Some(candidate) = response.candidates.first() else {
        return Extracted {
            content_filtered: blocked,
            usage,
            ..Extracted::default()
        };
    };

    let mut text = String::new();
    let mut native_calls = Vec::new();

    for part in candidate.content.iter().flat_map(|c| &c.parts) {
        match part {
            GooglePart::Text(part) => text.push_str(part),
            GooglePart::FunctionCall(call) => {
                if let Some(call) = native_call(None, &call.name, &call.args) {
                    native_calls.push(call);
                }
            }
        }
    }

    let reason = candidate.finish_reason.as_deref();

    Extracted {
        text,
        native_calls,
        content_filtered: blocked || reason.is_some_and(|r| GOOGLE_FILTER_REASONS.contains(&r)),
        truncated: reason == Some("MAX_TOKENS"),
        usage,
    }
}

/// Native call with an object (or absent) input; anything else is dropped
fn native_call(id: Option<String>, name: &str, input: &Value) -> Option<ToolCall> {
    if !is_valid_name(name) {
        return None;
    }

    match input {
        Value::Object(arguments) => Some(ToolCall::new(id, name, arguments)),
        Value::Null => Some(ToolCall::new(id, name, &serde_json::Map::new())),
        _ => None,
    }
}

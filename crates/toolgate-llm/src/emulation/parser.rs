//! Recovery of tool calls from free-form model output
//!
//! Parsing never fails: anything that cannot be turned into a compliant
//! [`ToolCall`] for one of the declared functions is dropped and the text is
//! handed back as plain content.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::template;
use super::validator::is_valid_name;
use crate::types::ToolCall;

static TOOL_CALLS_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<tool_calls>(.*?)(?:</tool_calls>|\z)").expect("must be valid regex"));

static FUNCTION_CALLS_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<function_calls>(.*?)(?:</function_calls>|\z)").expect("must be valid regex")
});

static MARKER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^[ \t]*TOOL_CALLS[ \t]*:[ \t]*").expect("must be valid regex"));

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^\s*```[A-Za-z0-9_-]*\s*(.*?)\s*(?:```\s*)?$").expect("must be valid regex"));

static EMPTY_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[A-Za-z0-9_-]*\s*```").expect("must be valid regex"));

static NAME_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""name"\s*:\s*"([^"\\]*)""#).expect("must be valid regex"));

static ARGUMENTS_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""(?:arguments|parameters|input|args)"\s*:\s*"#).expect("must be valid regex"));

/// Keys accepted for the argument object, in preference order
const ARGUMENT_KEYS: [&str; 4] = ["arguments", "parameters", "input", "args"];

/// Tool calls recovered from model output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedOutput {
    /// Compliant tool calls, in order
    pub tool_calls: Vec<ToolCall>,
    /// Text outside the call block, or the whole text when nothing parsed
    pub content: String,
}

/// Payload location within the model output
struct Located<'a> {
    payload: &'a str,
    residual: String,
}

/// Parse model output into calls to `declared` functions plus residual text
pub fn parse(text: &str, declared: &[String]) -> ParsedOutput {
    let found = match locate(text) {
        Some(located) => {
            let calls = decode(located.payload, declared);
            if calls.is_empty() {
                tracing::debug!("model output held a call block but no compliant calls");
            }
            (!calls.is_empty()).then_some((calls, located.residual))
        }
        None => bare_arrays(text).find_map(|located| {
            let calls = decode(located.payload, declared);
            (!calls.is_empty()).then_some((calls, located.residual))
        }),
    };

    let Some((tool_calls, residual)) = found else {
        return ParsedOutput {
            tool_calls: Vec::new(),
            content: text.trim().to_owned(),
        };
    };

    let residual = EMPTY_FENCE.replace_all(&residual, "");

    ParsedOutput {
        tool_calls,
        content: residual.trim().to_owned(),
    }
}

/// Find an explicit call block or marker line
fn locate(text: &str) -> Option<Located<'_>> {
    for block in [&*TOOL_CALLS_BLOCK, &*FUNCTION_CALLS_BLOCK] {
        if let Some(captures) = block.captures(text)
            && let (Some(whole), Some(inner)) = (captures.get(0), captures.get(1))
        {
            return Some(Located {
                payload: inner.as_str(),
                residual: format!("{}{}", &text[..whole.start()], &text[whole.end()..]),
            });
        }
    }

    if let Some(marker) = MARKER_LINE.find(text) {
        let rest = &text[marker.end()..];
        let offset = rest.find(['[', '{']).unwrap_or(rest.len());
        let end = offset + json_span(&rest[offset..]);

        return Some(Located {
            payload: &rest[..end],
            residual: format!("{}{}", &text[..marker.start()], &rest[end..]),
        });
    }

    None
}

/// Top-level JSON arrays of objects that mention `"name"`, in order
fn bare_arrays(text: &str) -> impl Iterator<Item = Located<'_>> {
    let mut search_from = 0;

    std::iter::from_fn(move || {
        while let Some(relative) = text[search_from..].find('[') {
            let start = search_from + relative;
            search_from = start + 1;

            if !text[start + 1..].trim_start().starts_with('{') {
                continue;
            }

            let end = start + json_span(&text[start..]);
            let candidate = &text[start..end];

            if candidate.contains("\"name\"") {
                search_from = end;
                return Some(Located {
                    payload: candidate,
                    residual: format!("{}{}", &text[..start], &text[end..]),
                });
            }
        }

        None
    })
}

/// Byte length of the JSON value starting at `text[0]`
///
/// Unbalanced input runs to the end of the text.
fn json_span(text: &str) -> usize {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '[' | '{' => depth += 1,
            ']' | '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i + 1;
                }
            }
            _ => {}
        }
    }

    text.len()
}

/// Turn a located payload into compliant calls
fn decode(payload: &str, declared: &[String]) -> Vec<ToolCall> {
    let unfenced = CODE_FENCE
        .captures(payload)
        .and_then(|c| c.get(1))
        .map_or(payload, |m| m.as_str());
    let payload = template::substitute_defaults(unfenced.trim());

    if payload.is_empty() {
        return Vec::new();
    }

    if let Some(candidates) = candidates(&payload) {
        return comply(candidates, declared);
    }

    let balanced = balance(&payload);
    if let Some(candidates) = candidates(&balanced) {
        tracing::debug!("recovered tool calls after balancing brackets");
        return comply(candidates, declared);
    }

    let fragments = extract_fragments(&payload, declared);
    if !fragments.is_empty() {
        tracing::debug!(count = fragments.len(), "recovered tool calls from fragments");
    }
    fragments
}

/// Parse a payload as an array of call objects or a single one
fn candidates(payload: &str) -> Option<Vec<Value>> {
    match serde_json::from_str::<Value>(payload).ok()? {
        Value::Array(values) => Some(values),
        object @ Value::Object(_) => Some(vec![object]),
        _ => None,
    }
}

fn comply(candidates: Vec<Value>, declared: &[String]) -> Vec<ToolCall> {
    let total = candidates.len();
    let calls: Vec<_> = candidates
        .iter()
        .filter_map(|candidate| to_tool_call(candidate, declared))
        .collect();

    if calls.len() < total {
        tracing::debug!(dropped = total - calls.len(), "dropped non-compliant tool call candidates");
    }

    calls
}

/// Compliance gate: a declared name and an object (or absent) argument set
///
/// Accepts both `{"name", "arguments"}` and the `OpenAI` shape
/// `{"id", "function": {"name", "arguments"}}`.
fn to_tool_call(candidate: &Value, declared: &[String]) -> Option<ToolCall> {
    let object = candidate.as_object()?;
    let source = object.get("function").and_then(Value::as_object).unwrap_or(object);

    let name = source.get("name")?.as_str()?.trim();
    if !is_declared(name, declared) {
        return None;
    }

    let raw_arguments = ARGUMENT_KEYS.iter().find_map(|key| source.get(*key));
    let arguments = arguments_object(raw_arguments)?;
    let id = object.get("id").and_then(Value::as_str).map(ToOwned::to_owned);

    Some(ToolCall::new(id, name, &arguments))
}

fn is_declared(name: &str, declared: &[String]) -> bool {
    if !is_valid_name(name) {
        return false;
    }

    let known = declared.iter().any(|d| d == name);
    if !known {
        tracing::debug!(function = %name, "dropped call to undeclared function");
    }
    known
}

/// Absent or null arguments are `{}`; strings are parsed; other types fail
fn arguments_object(raw: Option<&Value>) -> Option<Map<String, Value>> {
    match raw {
        None | Some(Value::Null) => Some(Map::new()),
        Some(Value::Object(map)) => Some(map.clone()),
        Some(Value::String(encoded)) if encoded.trim().is_empty() => Some(Map::new()),
        Some(Value::String(encoded)) => match serde_json::from_str::<Value>(encoded).ok()? {
            Value::Object(map) => Some(map),
            _ => None,
        },
        Some(_) => None,
    }
}

/// Repair bracket structure
///
/// Closers without a matching opener are dropped, missing closers are
/// appended and a lone object list is wrapped in an array. A call object cut
/// off inside a string literal is removed whole.
fn balance(payload: &str) -> String {
    let mut out = String::with_capacity(payload.len() + 8);
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    // Output and stack length where the current call object opened
    let mut call_start = None;

    for c in payload.chars() {
        if in_string {
            out.push(c);
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '[' | '{' => {
                if c == '{' && matches!(stack.as_slice(), [] | ['[']) {
                    call_start = Some((out.len(), stack.len()));
                }
                stack.push(c);
                out.push(c);
            }
            ']' | '}' => {
                let opener = if c == ']' { '[' } else { '{' };
                if stack.last() == Some(&opener) {
                    trim_dangling(&mut out);
                    stack.pop();
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }

    if in_string {
        let (length, depth) = call_start.unwrap_or((0, 0));
        tracing::debug!("dropped tool call cut off inside a string");
        out.truncate(length);
        stack.truncate(depth);
        trim_dangling(&mut out);
    }

    while let Some(opener) = stack.pop() {
        trim_dangling(&mut out);
        out.push(if opener == '[' { ']' } else { '}' });
    }

    let trimmed = out.trim();
    if trimmed.starts_with('{') {
        format!("[{trimmed}]")
    } else {
        trimmed.to_owned()
    }
}

/// Remove a trailing comma, or complete a dangling `"key":`
fn trim_dangling(out: &mut String) {
    let kept = out.trim_end().len();
    out.truncate(kept);

    if out.ends_with(',') {
        out.pop();
    } else if out.ends_with(':') {
        out.push_str("null");
    }
}

/// Pull individual `{"name": ..., "arguments": {...}}` fragments out of text
/// that does not parse as a whole
fn extract_fragments(payload: &str, declared: &[String]) -> Vec<ToolCall> {
    let names: Vec<_> = NAME_FIELD.captures_iter(payload).collect();
    let mut calls = Vec::new();
    let mut consumed = 0;

    for (i, captures) in names.iter().enumerate() {
        let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };

        // A "name" key inside a previous call's arguments
        if whole.start() < consumed {
            continue;
        }

        let window_end = names
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(payload.len(), |m| m.start());
        let window = &payload[whole.end()..window_end.max(whole.end())];

        let mut arguments = Some(Map::new());

        if let Some(key) = ARGUMENTS_FIELD.find(window) {
            let start = whole.end() + key.end();
            let rest = &payload[start..];
            let span = if rest.starts_with(['{', '[']) {
                json_span(rest)
            } else {
                0
            };

            arguments = fragment_arguments(rest, span);
            consumed = start + span;
        }

        let name = name.as_str().trim();
        if let Some(arguments) = arguments
            && is_declared(name, declared)
        {
            calls.push(ToolCall::new(None, name, &arguments));
        }
    }

    calls
}

/// Best-effort argument object for a fragment, `{}` when unusable
///
/// `None` when the arguments were cut off inside a string.
fn fragment_arguments(rest: &str, span: usize) -> Option<Map<String, Value>> {
    let first = serde_json::Deserializer::from_str(rest).into_iter::<Value>().next();

    match first {
        Some(Ok(Value::Object(map))) => return Some(map),
        Some(Ok(value @ Value::String(_))) => return Some(arguments_object(Some(&value)).unwrap_or_default()),
        _ => {}
    }

    if span == 0 {
        return Some(Map::new());
    }

    if ends_in_string(&rest[..span]) {
        return None;
    }

    match serde_json::from_str::<Value>(&balance(&rest[..span])) {
        Ok(Value::Array(mut values)) if values.len() == 1 => match values.pop() {
            Some(Value::Object(map)) => Some(map),
            _ => Some(Map::new()),
        },
        _ => Some(Map::new()),
    }
}

/// Whether `text` stops inside an unterminated string literal
fn ends_in_string(text: &str) -> bool {
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            _ => {}
        }
    }

    in_string
}

//! `$fromAI(...)` automatic-parameter markers
//!
//! Workflow tools mark values the model should fill in itself with
//! `{{ $fromAI('key', 'description', 'type', default) }}`. The prompt compiler
//! rewrites these into a neutral hint; the parser replaces any the model
//! echoes back with their typed default.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

/// Marker argument list: quoted strings may hold parentheses
const MARKER_ARGS: &str = r#"(?:[^()"'`]|"[^"]*"|'[^']*'|`[^`]*`)*"#;

/// Marker either wrapped in `{{ }}` or bare, with optional adjacent quotes
static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r#"(?P<open>")?(?:\{{\{{\s*\$fromAI\(\s*(?P<wrapped>{MARKER_ARGS})\)\s*\}}\}}|\$fromAI\(\s*(?P<bare>{MARKER_ARGS})\))(?P<close>")?"#
    ))
    .expect("must be valid regex")
});

/// A parsed `$fromAI(...)` marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoMarker {
    /// Parameter key
    pub key: String,
    /// Hint describing what to infer
    pub description: Option<String>,
    /// Declared value type (`string` when absent)
    pub value_type: String,
    /// Raw default value
    pub default: Option<String>,
}

impl AutoMarker {
    fn from_args(args: &str) -> Self {
        let mut parts = split_args(args).into_iter();

        Self {
            key: parts.next().unwrap_or_default(),
            description: parts.next().filter(|d| !d.is_empty()),
            value_type: parts
                .next()
                .filter(|t| !t.is_empty())
                .map_or_else(|| "string".to_owned(), |t| t.to_lowercase()),
            default: parts.next(),
        }
    }

    /// Default coerced to the declared type
    ///
    /// Unparsable numbers become `0` and unparsable booleans `false`; a
    /// missing default yields the type's empty value.
    pub fn typed_default(&self) -> Value {
        let raw = self.default.as_deref().map(str::trim);

        match self.value_type.as_str() {
            "number" => raw
                .and_then(|r| r.parse::<f64>().ok())
                .map_or_else(|| Value::from(0), number_value),
            "integer" => raw
                .and_then(|r| r.parse::<i64>().ok().or_else(|| r.parse::<f64>().ok().map(truncate)))
                .map_or_else(|| Value::from(0), Value::from),
            "boolean" => Value::Bool(raw.is_some_and(|r| r.eq_ignore_ascii_case("true"))),
            "array" => raw
                .and_then(|r| serde_json::from_str::<Value>(r).ok())
                .filter(Value::is_array)
                .unwrap_or_else(|| Value::Array(Vec::new())),
            "object" | "json" => raw
                .and_then(|r| serde_json::from_str::<Value>(r).ok())
                .filter(Value::is_object)
                .unwrap_or_else(|| Value::Object(serde_json::Map::new())),
            _ => Value::String(raw.unwrap_or_default().to_owned()),
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn truncate(value: f64) -> i64 {
    value as i64
}

/// Integral floats render without a fractional part
fn number_value(value: f64) -> Value {
    if value.fract().abs() < f64::EPSILON && value.abs() < 9e15 {
        Value::from(truncate(value))
    } else {
        serde_json::Number::from_f64(value).map_or_else(|| Value::from(0), Value::Number)
    }
}

/// Split marker arguments on commas outside quotes, stripping the quotes
fn split_args(args: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in args.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '\'' | '"' | '`') => quote = Some(c),
            (None, ',') => parts.push(std::mem::take(&mut current).trim().to_owned()),
            (None, c) => current.push(c),
        }
    }

    let last = current.trim();
    if !last.is_empty() || !parts.is_empty() {
        parts.push(last.to_owned());
    }

    parts
}

/// Whether `text` contains any marker
pub fn contains_marker(text: &str) -> bool {
    MARKER.is_match(text)
}

/// All markers found in `text`, in order
pub fn find_markers(text: &str) -> Vec<AutoMarker> {
    MARKER
        .captures_iter(text)
        .filter_map(|c| marker_args(&c).map(AutoMarker::from_args))
        .collect()
}

/// Replace markers in free text with `replacement`
pub fn replace_markers(text: &str, replacement: &str) -> String {
    MARKER.replace_all(text, regex::NoExpand(replacement)).into_owned()
}

/// Replace markers inside a JSON payload with their typed defaults
///
/// A marker that forms a whole JSON value (bare, or exactly filling a
/// string) becomes a literal of its type. A marker embedded in a longer
/// string is replaced with the default's text so the string stays valid.
pub fn substitute_defaults(payload: &str) -> String {
    if !contains_marker(payload) {
        return payload.to_owned();
    }

    MARKER
        .replace_all(payload, |caps: &Captures<'_>| {
            let Some(whole) = caps.get(0) else {
                return String::new();
            };
            let marker = AutoMarker::from_args(marker_args(caps).unwrap_or_default());
            let value = marker.typed_default();

            let quoted_open = caps.name("open").is_some();
            let quoted_close = caps.name("close").is_some();

            if quoted_open == quoted_close && !inside_json_string(payload, whole.start()) {
                return value.to_string();
            }

            // Embedded in a string: splice the default's text, keep any quotes
            let text = match &value {
                Value::String(s) => escape_json_text(s),
                other => escape_json_text(&other.to_string()),
            };
            let open = if quoted_open { "\"" } else { "" };
            let close = if quoted_close { "\"" } else { "" };
            format!("{open}{text}{close}")
        })
        .into_owned()
}

fn marker_args<'t>(caps: &Captures<'t>) -> Option<&'t str> {
    caps.name("wrapped").or_else(|| caps.name("bare")).map(|m| m.as_str())
}

/// Whether byte offset `pos` lies inside a JSON string literal
fn inside_json_string(text: &str, pos: usize) -> bool {
    let mut inside = false;
    let mut escaped = false;

    for c in text[..pos].chars() {
        match c {
            _ if escaped => escaped = false,
            '\\' if inside => escaped = true,
            '"' => inside = !inside,
            _ => {}
        }
    }

    inside
}

fn escape_json_text(text: &str) -> String {
    let encoded = Value::String(text.to_owned()).to_string();
    encoded[1..encoded.len() - 1].to_owned()
}

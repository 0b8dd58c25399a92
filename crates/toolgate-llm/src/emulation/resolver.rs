//! Inference of automatic parameters from conversation context
//!
//! Resolution never fails: when nothing in the conversation fits, the
//! parameter gets a type-appropriate default. Parameters without an
//! automatic marker are left alone so required-argument validation still
//! sees what the model actually sent.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::conversation::ConversationState;
use super::template;
use crate::types::{AUTO_MARKER, FunctionDefinition, PropertySchema, Role, SchemaType};

/// `key: value`, `key = "value"`, `key -> value`, `key is value`
static MENTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b([A-Za-z_][A-Za-z0-9_ ]{0,60}?)\s*(?::|=|->|\s+is\s+)\s*(?:"([^"]*)"|'([^']*)'|([^,;\n]+))"#)
        .expect("must be valid regex")
});

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("must be valid regex"));

static UUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\b")
        .expect("must be valid regex")
});

static HEX_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b[0-9a-fA-F]{16,}\b").expect("must be valid regex"));

static BASE64_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9+/_-]{20,}={0,2}").expect("must be valid regex"));

static SUBJECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\babout|\bregarding|\bre:|\bconcerning|\btitled)\s+(.+?)\s*(?:[.!?\n]|$)")
        .expect("must be valid regex")
});

static QUOTED_MESSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\bthat says|\bsaying|:)\s*(.+?)\s*$").expect("must be valid regex")
});

static PROPER_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?i:to|for|with|from|named|called)\s+([A-Z][a-z]+(?:\s+[A-Z][a-z]+)*)").expect("must be valid regex")
});

/// Arithmetic verbs mapped onto `operation` enum values
const OPERATION_SYNONYMS: &[(&str, &[&str])] = &[
    ("add", &["add", "plus", "sum", "addition"]),
    ("subtract", &["subtract", "minus", "difference", "subtraction"]),
    ("multiply", &["multiply", "times", "product", "multiplied"]),
    ("divide", &["divide", "over", "quotient", "divided"]),
    ("power", &["power", "raise", "raised", "exponent"]),
];

/// Text the resolver draws values from
#[derive(Debug, Clone, Default)]
pub struct ResolutionContext {
    /// Most recent user message
    pub latest_user_message: String,
    /// Earlier messages, most recent first
    pub history: Vec<String>,
}

impl ResolutionContext {
    pub fn from_conversation(conversation: &ConversationState) -> Self {
        let texts = conversation
            .messages()
            .iter()
            .rev()
            .filter(|m| m.role != Role::System)
            .map(|m| (m.role, m.content.as_text()));

        let mut latest_user_message = String::new();
        let mut history = Vec::new();

        for (role, text) in texts {
            if role == Role::User && latest_user_message.is_empty() {
                latest_user_message = text;
            } else if !text.trim().is_empty() {
                history.push(text);
            }
        }

        Self {
            latest_user_message,
            history,
        }
    }

    fn texts(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.latest_user_message.as_str())
            .chain(self.history.iter().map(String::as_str))
            .filter(|t| !t.trim().is_empty())
    }
}

/// Fill automatic parameters in place
///
/// Returns the names of parameters that were resolved.
pub fn resolve_arguments(
    function: &FunctionDefinition,
    arguments: &mut Map<String, Value>,
    context: &ResolutionContext,
) -> Vec<String> {
    let mut resolved = Vec::new();

    for (name, schema) in &function.parameters.properties {
        if !schema.is_automatic() || !arguments.get(name).is_none_or(is_unfilled) {
            continue;
        }

        let value = resolve_value(name, schema, context);
        tracing::debug!(function = %function.name, parameter = %name, "resolved parameter from context");
        arguments.insert(name.clone(), value);
        resolved.push(name.clone());
    }

    resolved
}

/// Null, empty, or still carrying a marker
fn is_unfilled(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty() || s.contains(AUTO_MARKER),
        _ => false,
    }
}

fn resolve_value(name: &str, schema: &PropertySchema, context: &ResolutionContext) -> Value {
    let typed = |raw: &str| typed_value(schema, raw);

    if let Some(value) = context.texts().find_map(|t| explicit_mention(name, t)).and_then(|raw| typed(&raw)) {
        return value;
    }

    if let Some(value) = context.texts().find_map(|t| semantic_match(name, t)).and_then(|raw| typed(&raw)) {
        return value;
    }

    if let Some(value) = context.texts().find_map(|t| enum_match(name, schema, t)) {
        return value;
    }

    fallback(schema)
}

/// Value stated explicitly next to the parameter name
fn explicit_mention(name: &str, text: &str) -> Option<String> {
    let wanted = name.to_lowercase();

    MENTION.captures_iter(text).find_map(|captures| {
        let key = captures.get(1)?.as_str().trim().to_lowercase().replace(' ', "_");
        let matches_key = key == wanted || key.ends_with(&format!("_{wanted}"));
        if !matches_key {
            return None;
        }

        let value = captures.get(2).or_else(|| captures.get(3)).or_else(|| captures.get(4))?;
        let value = value.as_str().trim().trim_end_matches(['.', '!', '?']).trim();
        (!value.is_empty()).then(|| value.to_owned())
    })
}

/// Semantic class of a parameter, by its name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SemanticClass {
    Subject,
    Message,
    Secret,
    Email,
    PersonName,
}

fn semantic_class(name: &str) -> Option<SemanticClass> {
    let lower = name.to_lowercase();
    let segments: Vec<_> = lower.split(['_', '-']).collect();
    let has = |needle: &str| segments.contains(&needle);

    if has("subject") {
        Some(SemanticClass::Subject)
    } else if has("message") || has("body") || has("content") || has("text") {
        Some(SemanticClass::Message)
    } else if has("key") || has("api") || has("token") {
        Some(SemanticClass::Secret)
    } else if has("email") {
        Some(SemanticClass::Email)
    } else if has("name") && !has("file") {
        Some(SemanticClass::PersonName)
    } else {
        None
    }
}

fn semantic_match(name: &str, text: &str) -> Option<String> {
    match semantic_class(name)? {
        SemanticClass::Email => EMAIL.find(text).map(|m| m.as_str().to_owned()),
        SemanticClass::Secret => [&*UUID, &*HEX_KEY, &*BASE64_KEY]
            .into_iter()
            .find_map(|regex| regex.find(text))
            .map(|m| m.as_str().to_owned()),
        SemanticClass::Subject => first_capture(&SUBJECT, text).map(|subject| {
            let lower = subject.to_lowercase();
            if lower.starts_with("the ") {
                subject[4..].to_owned()
            } else {
                subject
            }
        }),
        SemanticClass::Message => first_capture(&QUOTED_MESSAGE, text)
            .map(|m| m.trim_matches(['"', '\'']).to_owned())
            .or_else(|| Some(text.trim().to_owned())),
        SemanticClass::PersonName => first_capture(&PROPER_NAME, text),
    }
}

fn first_capture(regex: &Regex, text: &str) -> Option<String> {
    regex
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_owned())
        .filter(|s| !s.is_empty())
}

/// Enum value mentioned in the text, with arithmetic verbs for `operation`
fn enum_match(name: &str, schema: &PropertySchema, text: &str) -> Option<Value> {
    let values: Vec<&str> = schema.enum_values.as_ref()?.iter().filter_map(Value::as_str).collect();
    if values.is_empty() {
        return None;
    }

    let lower = text.to_lowercase();
    let words: Vec<_> = lower
        .split(|c: char| !c.is_alphanumeric() && c != '_' && c != '-')
        .filter(|w| !w.is_empty())
        .collect();

    if let Some(found) = values.iter().find(|v| {
        let v = v.to_lowercase();
        if v.contains(' ') {
            lower.contains(&v)
        } else {
            words.contains(&v.as_str())
        }
    }) {
        return Some(Value::String((*found).to_owned()));
    }

    let lower_name = name.to_lowercase();
    if lower_name == "op" || lower_name.contains("operation") {
        for (operation, synonyms) in OPERATION_SYNONYMS {
            if synonyms.iter().any(|s| words.contains(s))
                && let Some(value) = values.iter().find(|v| v.eq_ignore_ascii_case(operation))
            {
                return Some(Value::String((*value).to_owned()));
            }
        }

        if words.iter().any(|w| *w == "calculate" || *w == "compute") {
            return Some(Value::String(values[0].to_owned()));
        }
    }

    None
}

/// Marker default, schema default, first enum value, then the empty value
fn fallback(schema: &PropertySchema) -> Value {
    let marker = schema
        .description
        .as_deref()
        .into_iter()
        .chain(schema.default.as_ref().and_then(Value::as_str))
        .flat_map(template::find_markers)
        .find(|m| m.default.is_some());

    if let Some(marker) = marker {
        return marker.typed_default();
    }

    if let Some(default) = schema.default.as_ref().filter(|d| !is_unfilled(d)) {
        return default.clone();
    }

    if let Some(first) = schema.enum_values.as_ref().and_then(|values| values.first()) {
        return first.clone();
    }

    schema.schema_type.empty_value()
}

/// Interpret extracted text as the schema's type
fn typed_value(schema: &PropertySchema, raw: &str) -> Option<Value> {
    let raw = raw.trim();

    match schema.schema_type {
        SchemaType::String => Some(Value::String(raw.to_owned())),
        SchemaType::Number => raw.parse::<f64>().ok().and_then(serde_json::Number::from_f64).map(Value::Number),
        SchemaType::Integer => raw.parse::<i64>().ok().map(Value::from),
        SchemaType::Boolean => match raw.to_lowercase().as_str() {
            "true" | "yes" | "1" => Some(Value::Bool(true)),
            "false" | "no" | "0" => Some(Value::Bool(false)),
            _ => None,
        },
        SchemaType::Array => serde_json::from_str::<Value>(raw)
            .ok()
            .filter(Value::is_array)
            .or_else(|| {
                Some(Value::Array(
                    raw.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(|s| Value::String(s.to_owned()))
                        .collect(),
                ))
            }),
        SchemaType::Object => serde_json::from_str::<Value>(raw).ok().filter(Value::is_object),
    }
}

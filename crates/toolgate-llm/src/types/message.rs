use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Role of a message participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instruction
    System,
    /// User message
    User,
    /// Assistant response
    Assistant,
    /// Tool/function result
    Tool,
}

/// Message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message author
    pub role: Role,
    /// Message content
    pub content: Content,
    /// Optional participant name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Tool calls made by the assistant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// ID of the tool call this message is a response to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// Plain text message with the given role
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Content::Text(content.into()),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Assistant message carrying tool calls
    pub fn assistant_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: Content::Text(content.into()),
            name: None,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    /// Tool result message answering `tool_call_id`
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Content::Text(content.into()),
            name: None,
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    /// Tool calls attached to this message, empty when there are none
    pub fn tool_calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or_default()
    }
}

/// Message content, either plain text or structured parts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    /// Plain text content
    Text(String),
    /// Array of content parts (text, images, etc.)
    Parts(Vec<ContentPart>),
}

impl Content {
    /// Extract text content, joining parts if necessary
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

/// Individual part within a multipart message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text content block
    Text {
        /// The text string
        text: String,
    },
    /// Image reference, dropped when the conversation is rendered as text
    Image {
        /// URL or base64 data URI for the image
        url: String,
    },
}

/// A tool/function call requested by the assistant
///
/// `function.arguments` always holds a compact JSON object. Calls built
/// through [`ToolCall::new`] satisfy this by construction; calls coming from
/// clients or native backend output go through [`ToolCall::canonical`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique identifier for this tool call
    pub id: String,
    /// Name of the function to call
    pub function: FunctionCall,
}

/// Function name and arguments within a tool call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Function name
    pub name: String,
    /// JSON-encoded arguments
    pub arguments: String,
}

impl ToolCall {
    /// Build a call from a name and an argument object
    ///
    /// A missing id is replaced with a freshly generated one.
    pub fn new(id: Option<String>, name: impl Into<String>, arguments: &Map<String, Value>) -> Self {
        Self {
            id: id.filter(|id| !id.trim().is_empty()).unwrap_or_else(generate_call_id),
            function: FunctionCall {
                name: name.into(),
                arguments: Value::Object(arguments.clone()).to_string(),
            },
        }
    }

    /// Re-serialize a call whose arguments came from outside
    ///
    /// Returns `None` when the arguments are not a JSON object. An empty
    /// argument string is read as `{}`.
    pub fn canonical(id: Option<String>, name: impl Into<String>, raw_arguments: &str) -> Option<Self> {
        let arguments = if raw_arguments.trim().is_empty() {
            Map::new()
        } else {
            match serde_json::from_str::<Value>(raw_arguments).ok()? {
                Value::Object(map) => map,
                _ => return None,
            }
        };

        Some(Self::new(id, name, &arguments))
    }

    /// Parsed argument object
    pub fn arguments(&self) -> Map<String, Value> {
        match serde_json::from_str::<Value>(&self.function.arguments) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Replace the argument object, keeping the canonical encoding
    pub fn set_arguments(&mut self, arguments: &Map<String, Value>) {
        self.function.arguments = Value::Object(arguments.clone()).to_string();
    }
}

/// Generate a tool call id (`call_` followed by a random suffix)
pub fn generate_call_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn canonical_arguments_are_compact() {
        let call = ToolCall::canonical(None, "get_weather", "{ \"units\": \"c\",\n \"location\": \"Paris\" }").unwrap();

        assert!(call.id.starts_with("call_"));
        assert_eq!(call.function.arguments, r#"{"units":"c","location":"Paris"}"#);
    }

    #[test]
    fn canonical_rejects_non_objects() {
        assert!(ToolCall::canonical(None, "x", "[1, 2]").is_none());
        assert!(ToolCall::canonical(None, "x", "\"text\"").is_none());
        assert!(ToolCall::canonical(None, "x", "{not json").is_none());
    }

    #[test]
    fn empty_arguments_become_empty_object() {
        let call = ToolCall::canonical(Some("call_1".to_owned()), "x", "  ").unwrap();
        assert_eq!(call.id, "call_1");
        assert_eq!(call.function.arguments, "{}");
    }

    #[test]
    fn arguments_round_trip() {
        let value = json!({"nested": {"list": [1, 2.5, "three"]}, "flag": true});
        let Value::Object(map) = value else { unreachable!() };

        let call = ToolCall::new(None, "x", &map);
        let reparsed: Value = serde_json::from_str(&call.function.arguments).unwrap();

        assert_eq!(Value::Object(call.arguments()), reparsed);
        assert_eq!(reparsed.to_string(), call.function.arguments);
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(generate_call_id(), generate_call_id());
    }

    #[test]
    fn parts_join_text_only() {
        let content = Content::Parts(vec![
            ContentPart::Text { text: "a".to_owned() },
            ContentPart::Image {
                url: "data:image/png;base64,AAAA".to_owned(),
            },
            ContentPart::Text { text: "b".to_owned() },
        ]);
        assert_eq!(content.as_text(), "ab");
    }
}

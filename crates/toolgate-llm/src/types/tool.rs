use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Value, json};

/// Marker that flags a parameter as automatic
pub const AUTO_MARKER: &str = "$fromAI(";

/// Wire dialect a tool definition arrived in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolDialect {
    /// `{"type": "function", "function": {...}}`
    OpenAi,
    /// `{"name", "description", "input_schema"}`
    Anthropic,
}

/// Validated tool definition
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    /// Dialect the definition was declared in
    pub dialect: ToolDialect,
    /// Function specification
    pub function: FunctionDefinition,
}

/// Specification of a callable function
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDefinition {
    /// Function name
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Parameter schema
    pub parameters: ParameterSchema,
}

impl FunctionDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: ParameterSchema) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Whether any top-level parameter is automatic
    pub fn has_automatic_parameters(&self) -> bool {
        self.parameters.properties.values().any(PropertySchema::is_automatic)
    }
}

/// Top-level `type: object` parameter schema
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSchema {
    /// Properties in declaration order
    pub properties: IndexMap<String, PropertySchema>,
    /// Names of required properties
    pub required: Vec<String>,
}

impl ParameterSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a property
    #[must_use]
    pub fn property(mut self, name: impl Into<String>, schema: PropertySchema) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    /// Mark properties as required
    #[must_use]
    pub fn required(mut self, names: &[&str]) -> Self {
        self.required.extend(names.iter().map(|n| (*n).to_owned()));
        self
    }

    /// Render back to JSON Schema
    pub fn to_json(&self) -> Value {
        json!({
            "type": "object",
            "properties": self.properties,
            "required": self.required,
        })
    }
}

/// Primitive types accepted in parameter schemas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display, strum::EnumString, strum::AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SchemaType {
    Object,
    String,
    Number,
    Integer,
    Boolean,
    Array,
}

impl SchemaType {
    /// Empty value of this type
    pub fn empty_value(self) -> Value {
        match self {
            Self::Object => Value::Object(serde_json::Map::new()),
            Self::String => Value::String(String::new()),
            Self::Number | Self::Integer => Value::from(0),
            Self::Boolean => Value::Bool(false),
            Self::Array => Value::Array(Vec::new()),
        }
    }
}

/// Schema of a single property
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertySchema {
    /// Declared type
    #[serde(rename = "type")]
    pub schema_type: SchemaType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Allowed values
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Element schema, present for arrays
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PropertySchema>>,
    /// Nested properties, present for objects
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<IndexMap<String, PropertySchema>>,
    /// Required nested properties
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

impl PropertySchema {
    pub fn new(schema_type: SchemaType, description: impl Into<String>) -> Self {
        Self {
            schema_type,
            description: Some(description.into()),
            enum_values: None,
            default: None,
            items: None,
            properties: None,
            required: Vec::new(),
        }
    }

    pub fn string(description: impl Into<String>) -> Self {
        Self::new(SchemaType::String, description)
    }

    pub fn number(description: impl Into<String>) -> Self {
        Self::new(SchemaType::Number, description)
    }

    pub fn integer(description: impl Into<String>) -> Self {
        Self::new(SchemaType::Integer, description)
    }

    pub fn boolean(description: impl Into<String>) -> Self {
        Self::new(SchemaType::Boolean, description)
    }

    pub fn array(items: Self, description: impl Into<String>) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::new(SchemaType::Array, description)
        }
    }

    /// Restrict to a set of string values
    #[must_use]
    pub fn with_enum(mut self, values: &[&str]) -> Self {
        self.enum_values = Some(values.iter().map(|v| Value::String((*v).to_owned())).collect());
        self
    }

    #[must_use]
    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Whether the value should be inferred from context rather than asked for
    pub fn is_automatic(&self) -> bool {
        let in_description = self.description.as_deref().is_some_and(|d| d.contains(AUTO_MARKER));
        let in_default = self
            .default
            .as_ref()
            .and_then(Value::as_str)
            .is_some_and(|d| d.contains(AUTO_MARKER));

        in_description || in_default
    }
}

/// How the model should select tools
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "name", rename_all = "lowercase")]
pub enum ToolChoice {
    /// Model decides whether to call tools
    #[default]
    Auto,
    /// Model must not call tools
    None,
    /// Model must call at least one tool
    Required,
    /// Model must call this function
    Function(String),
}

impl ToolChoice {
    /// Pinned function name, if any
    pub fn pinned(&self) -> Option<&str> {
        match self {
            Self::Function(name) => Some(name),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[test]
    fn schema_type_parses_lowercase_names() {
        assert_eq!(SchemaType::from_str("integer").unwrap(), SchemaType::Integer);
        assert!(SchemaType::from_str("float").is_err());
        assert_eq!(SchemaType::Array.to_string(), "array");
    }

    #[test]
    fn automatic_detection() {
        let marked = PropertySchema::string("{{ $fromAI('subject', 'Email subject', 'string') }}");
        let plain = PropertySchema::string("Email subject");
        let via_default = PropertySchema::string("Subject").with_default(Value::from("={{ $fromAI('subject') }}"));

        assert!(marked.is_automatic());
        assert!(!plain.is_automatic());
        assert!(via_default.is_automatic());
    }

    #[test]
    fn schema_renders_back_to_json() {
        let schema = ParameterSchema::new()
            .property("units", PropertySchema::string("Units").with_enum(&["celsius", "fahrenheit"]))
            .property("tags", PropertySchema::array(PropertySchema::string("Tag"), "Tags"))
            .required(&["units"]);

        let rendered = schema.to_json();

        assert_eq!(rendered["type"], "object");
        assert_eq!(rendered["required"], json!(["units"]));
        assert_eq!(rendered["properties"]["units"]["enum"], json!(["celsius", "fahrenheit"]));
        assert_eq!(rendered["properties"]["tags"]["items"]["type"], "string");
        assert!(rendered["properties"]["tags"].get("required").is_none());
    }
}

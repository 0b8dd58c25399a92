//! Fail-closed validation of caller-supplied tool definitions
//!
//! Every violation in a batch is collected before anything is rejected, so a
//! client sees the whole list in one 400 response.

use std::collections::HashSet;
use std::str::FromStr;
use std::sync::LazyLock;

use indexmap::IndexMap;
use regex::Regex;
use serde_json::{Map, Value};

use crate::error::{LlmError, ToolSpecIssue};
use crate::types::{FunctionDefinition, ParameterSchema, PropertySchema, SchemaType, ToolDefinition, ToolDialect};

/// Longest accepted function name
pub const MAX_NAME_LEN: usize = 64;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("must be valid regex"));

/// Whether `name` is acceptable as a function name
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().count() <= MAX_NAME_LEN && IDENTIFIER.is_match(name)
}

/// Validate a batch of raw tool definitions
///
/// Returns every definition on success, or [`LlmError::ValidationFailed`]
/// listing all issues when any definition is invalid.
pub fn validate_tools(raw: &[Value], dialect: ToolDialect) -> Result<Vec<ToolDefinition>, LlmError> {
    let mut issues = Issues::default();
    let mut definitions = Vec::with_capacity(raw.len());

    for (index, tool) in raw.iter().enumerate() {
        let parsed = match dialect {
            ToolDialect::OpenAi => validate_openai_tool(index, tool, &mut issues),
            ToolDialect::Anthropic => validate_anthropic_tool(index, tool, &mut issues),
        };

        if let Some(function) = parsed {
            definitions.push(ToolDefinition { dialect, function });
        }
    }

    let mut seen = HashSet::new();
    for definition in &definitions {
        if !seen.insert(definition.function.name.as_str()) {
            issues.push(&definition.function.name, "name", "duplicate function name");
        }
    }

    if issues.0.is_empty() {
        Ok(definitions)
    } else {
        tracing::debug!(issues = issues.0.len(), "rejecting tool definitions");
        Err(LlmError::ValidationFailed(issues.0))
    }
}

#[derive(Default)]
struct Issues(Vec<ToolSpecIssue>);

impl Issues {
    fn push(&mut self, tool: &str, field: &str, message: impl Into<String>) {
        self.0.push(ToolSpecIssue {
            tool: tool.to_owned(),
            field: field.to_owned(),
            message: message.into(),
        });
    }
}

/// Label used to attribute issues: the name when usable, else the position
fn label(index: usize, name: Option<&Value>) -> String {
    name.and_then(Value::as_str)
        .filter(|n| !n.trim().is_empty())
        .map_or_else(|| format!("tools[{index}]"), ToOwned::to_owned)
}

fn validate_openai_tool(index: usize, tool: &Value, issues: &mut Issues) -> Option<FunctionDefinition> {
    let Some(tool) = tool.as_object() else {
        issues.push(&format!("tools[{index}]"), "", "must be an object");
        return None;
    };

    let function = tool.get("function").and_then(Value::as_object);
    let label = label(index, function.and_then(|f| f.get("name")));

    if tool.get("type").and_then(Value::as_str) != Some("function") {
        issues.push(&label, "type", "must be \"function\"");
    }

    let Some(function) = function else {
        issues.push(&label, "function", "is required and must be an object");
        return None;
    };

    let name = check_name(function.get("name"), &label, "function.name", issues);
    let description = check_description(function.get("description"), &label, "function.description", issues);
    let parameters = match function.get("parameters") {
        None | Some(Value::Null) => Some(ParameterSchema::default()),
        Some(schema) => check_parameters(schema, &label, "function.parameters", issues),
    };

    Some(FunctionDefinition::new(name?, description?, parameters?))
}

fn validate_anthropic_tool(index: usize, tool: &Value, issues: &mut Issues) -> Option<FunctionDefinition> {
    let Some(tool) = tool.as_object() else {
        issues.push(&format!("tools[{index}]"), "", "must be an object");
        return None;
    };

    let label = label(index, tool.get("name"));

    let name = check_name(tool.get("name"), &label, "name", issues);
    let description = check_description(tool.get("description"), &label, "description", issues);
    let parameters = match tool.get("input_schema") {
        None | Some(Value::Null) => {
            issues.push(&label, "input_schema", "is required");
            None
        }
        Some(schema) => check_parameters(schema, &label, "input_schema", issues),
    };

    Some(FunctionDefinition::new(name?, description?, parameters?))
}

fn check_name(value: Option<&Value>, label: &str, field: &str, issues: &mut Issues) -> Option<String> {
    let Some(value) = value else {
        issues.push(label, field, "is required");
        return None;
    };

    let Some(name) = value.as_str() else {
        issues.push(label, field, "must be a string");
        return None;
    };

    if name.is_empty() {
        issues.push(label, field, "must not be empty");
        return None;
    }

    if name.chars().count() > MAX_NAME_LEN {
        issues.push(label, field, format!("must be at most {MAX_NAME_LEN} characters"));
        return None;
    }

    if !IDENTIFIER.is_match(name) {
        issues.push(label, field, "must start with a letter or underscore and contain only letters, digits, '_' or '-'");
        return None;
    }

    Some(name.to_owned())
}

fn check_description(value: Option<&Value>, label: &str, field: &str, issues: &mut Issues) -> Option<String> {
    match value.and_then(Value::as_str) {
        Some(description) if !description.trim().is_empty() => Some(description.to_owned()),
        Some(_) => {
            issues.push(label, field, "must not be empty");
            None
        }
        None => {
            issues.push(label, field, "is required and must be a string");
            None
        }
    }
}

/// Validate the top-level `type: object` schema
fn check_parameters(schema: &Value, label: &str, path: &str, issues: &mut Issues) -> Option<ParameterSchema> {
    let Some(schema) = schema.as_object() else {
        issues.push(label, path, "must be an object");
        return None;
    };

    if schema.get("type").and_then(Value::as_str) != Some("object") {
        issues.push(label, &format!("{path}.type"), "must be \"object\"");
    }

    let properties = match schema.get("properties") {
        None | Some(Value::Null) => Some(IndexMap::new()),
        Some(properties) => check_properties(properties, label, &format!("{path}.properties"), issues),
    };

    let required = check_required(schema, properties.as_ref(), label, path, issues);

    Some(ParameterSchema {
        properties: properties?,
        required: required?,
    })
}

fn check_properties(
    value: &Value,
    label: &str,
    path: &str,
    issues: &mut Issues,
) -> Option<IndexMap<String, PropertySchema>> {
    let Some(properties) = value.as_object() else {
        issues.push(label, path, "must be an object");
        return None;
    };

    let mut checked = IndexMap::with_capacity(properties.len());
    let mut valid = true;

    for (name, property) in properties {
        match check_property(property, label, &format!("{path}.{name}"), issues) {
            Some(property) => {
                checked.insert(name.clone(), property);
            }
            None => valid = false,
        }
    }

    valid.then_some(checked)
}

fn check_property(value: &Value, label: &str, path: &str, issues: &mut Issues) -> Option<PropertySchema> {
    let Some(property) = value.as_object() else {
        issues.push(label, path, "must be an object");
        return None;
    };

    let mut valid = true;
    let schema_type = check_type(property.get("type"), label, path, issues);

    let description = match property.get("description") {
        None | Some(Value::Null) => None,
        Some(Value::String(d)) => Some(d.clone()),
        Some(_) => {
            issues.push(label, &format!("{path}.description"), "must be a string");
            valid = false;
            None
        }
    };

    let enum_values = match property.get("enum") {
        None | Some(Value::Null) => None,
        Some(Value::Array(values)) if !values.is_empty() => Some(values.clone()),
        Some(_) => {
            issues.push(label, &format!("{path}.enum"), "must be a non-empty array");
            valid = false;
            None
        }
    };

    let items = match (schema_type, property.get("items")) {
        (Some(SchemaType::Array), None | Some(Value::Null)) => {
            issues.push(label, &format!("{path}.items"), "is required for array properties");
            valid = false;
            None
        }
        (Some(SchemaType::Array), Some(items)) => {
            let checked = check_property(items, label, &format!("{path}.items"), issues);
            valid &= checked.is_some();
            checked.map(Box::new)
        }
        _ => None,
    };

    let (properties, required) = if schema_type == Some(SchemaType::Object) {
        let nested = match property.get("properties") {
            None | Some(Value::Null) => {
                issues.push(label, &format!("{path}.properties"), "is required for object properties");
                None
            }
            Some(nested) => check_properties(nested, label, &format!("{path}.properties"), issues),
        };
        let required = check_required(property, nested.as_ref(), label, path, issues);
        valid &= nested.is_some() && required.is_some();
        (nested, required.unwrap_or_default())
    } else {
        (None, Vec::new())
    };

    let schema_type = schema_type?;

    valid.then(|| PropertySchema {
        schema_type,
        description,
        enum_values,
        default: property.get("default").cloned(),
        items,
        properties,
        required,
    })
}

fn check_type(value: Option<&Value>, label: &str, path: &str, issues: &mut Issues) -> Option<SchemaType> {
    let field = format!("{path}.type");

    match value {
        None => {
            issues.push(label, &field, "is required");
            None
        }
        Some(Value::String(raw)) => {
            let parsed = SchemaType::from_str(raw).ok();
            if parsed.is_none() {
                issues.push(
                    label,
                    &field,
                    format!("unsupported type \"{raw}\" (expected object, string, number, integer, boolean or array)"),
                );
            }
            parsed
        }
        Some(_) => {
            issues.push(label, &field, "must be a string");
            None
        }
    }
}

/// Check that `required` lists only declared property names
fn check_required(
    schema: &Map<String, Value>,
    properties: Option<&IndexMap<String, PropertySchema>>,
    label: &str,
    path: &str,
    issues: &mut Issues,
) -> Option<Vec<String>> {
    let field = format!("{path}.required");

    let names = match schema.get("required") {
        None | Some(Value::Null) => return Some(Vec::new()),
        Some(Value::Array(names)) => names,
        Some(_) => {
            issues.push(label, &field, "must be an array of property names");
            return None;
        }
    };

    let mut required = Vec::with_capacity(names.len());
    let mut valid = true;

    for name in names {
        let Some(name) = name.as_str() else {
            issues.push(label, &field, "must contain only strings");
            valid = false;
            continue;
        };

        // An invalid property map has already been reported
        if let Some(properties) = properties
            && !properties.contains_key(name)
        {
            issues.push(label, &field, format!("\"{name}\" is not a declared property"));
            valid = false;
            continue;
        }

        required.push(name.to_owned());
    }

    valid.then_some(required)
}

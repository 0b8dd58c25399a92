//! Compile tool definitions and a conversation into one text prompt

use std::collections::HashSet;
use std::fmt::Write as _;

use indexmap::IndexMap;

use super::conversation::ConversationState;
use super::template;
use crate::types::{FunctionDefinition, Message, PropertySchema, Role, SchemaType, ToolCall, ToolChoice, ToolDefinition};

/// Placeholder shown to the model in place of a `$fromAI(...)` marker
pub const AUTO_PLACEHOLDER: &str = "[auto]";

const CALL_FORMAT: &str = r#"To call functions, reply with a <tool_calls> block containing a JSON array of calls:
<tool_calls>
[{"name": "function_name", "arguments": {"parameter": "value"}}]
</tool_calls>
"arguments" must be a JSON object matching the function's parameters. Text outside the block is shown to the user."#;

const AUTO_STRATEGY: &str = "Parameters marked [auto] are not given explicitly. Infer each one in this order: \
a direct mention in the conversation, contextual inference from earlier messages, the user's intent, \
the closest semantic match, and finally a type-appropriate default.";

/// Prompt ready for a text-completion backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledPrompt {
    /// Operator system instruction, sent separately when the backend supports it
    pub system: Option<String>,
    /// Tool section, conversation transcript and the open assistant turn
    pub prompt: String,
}

/// Compile a request into a prompt
pub fn compile(
    tools: &[ToolDefinition],
    choice: &ToolChoice,
    conversation: &ConversationState,
    system_prompt: Option<&str>,
) -> CompiledPrompt {
    let mut prompt = String::new();

    if let Some(section) = tool_section(tools, choice) {
        prompt.push_str(&section);
        prompt.push_str("\n\n");
    }

    render_conversation(&mut prompt, conversation);
    prompt.push_str("Assistant:");

    CompiledPrompt {
        system: system_prompt.map(str::trim).filter(|s| !s.is_empty()).map(ToOwned::to_owned),
        prompt,
    }
}

fn tool_section(tools: &[ToolDefinition], choice: &ToolChoice) -> Option<String> {
    if *choice == ToolChoice::None {
        return (!tools.is_empty()).then(|| "Do not call any functions. Respond with plain text only.".to_owned());
    }

    if tools.is_empty() {
        return None;
    }

    let mut out = String::from("You have access to the following functions:\n");

    for tool in tools {
        out.push('\n');
        render_function(&mut out, &tool.function);
    }

    out.push('\n');
    out.push_str(CALL_FORMAT);

    let directive = match choice {
        ToolChoice::Required => "You must call at least one of the functions above in this response.".to_owned(),
        ToolChoice::Function(name) => format!("You must call the function `{name}` in this response."),
        ToolChoice::Auto | ToolChoice::None => {
            "Only call functions when they are needed; otherwise reply with plain text.".to_owned()
        }
    };
    let _ = write!(out, "\n\n{directive}");

    if tools.iter().any(|t| t.function.has_automatic_parameters()) {
        let _ = write!(out, "\n\n{AUTO_STRATEGY}");
    }

    Some(out)
}

fn render_function(out: &mut String, function: &FunctionDefinition) {
    let _ = writeln!(out, "### {}", function.name);
    let _ = writeln!(out, "{}", function.description.trim());

    if function.parameters.properties.is_empty() {
        out.push_str("Parameters: none\n");
        return;
    }

    out.push_str("Parameters:\n");
    render_properties(out, &function.parameters.properties, &function.parameters.required, 0);
}

fn render_properties(out: &mut String, properties: &IndexMap<String, PropertySchema>, required: &[String], depth: usize) {
    let indent = "  ".repeat(depth);

    for (name, schema) in properties {
        let requirement = if required.iter().any(|r| r == name) {
            "required"
        } else {
            "optional"
        };

        let _ = write!(out, "{indent}- {name} ({}, {requirement})", type_label(schema));

        if let Some(description) = describe(schema) {
            let _ = write!(out, ": {description}");
        }

        if let Some(values) = &schema.enum_values {
            let listed: Vec<_> = values.iter().map(ToString::to_string).collect();
            let _ = write!(out, ". One of: {}", listed.join(", "));
        }

        if let Some(default) = schema.default.as_ref().filter(|_| !schema.is_automatic()) {
            let _ = write!(out, ". Default: {default}");
        }

        out.push('\n');

        if let Some(nested) = &schema.properties {
            render_properties(out, nested, &schema.required, depth + 1);
        } else if let Some(items) = &schema.items
            && let Some(nested) = &items.properties
        {
            render_properties(out, nested, &items.required, depth + 1);
        }
    }
}

fn type_label(schema: &PropertySchema) -> String {
    match (&schema.schema_type, &schema.items) {
        (SchemaType::Array, Some(items)) => format!("array of {}", items.schema_type),
        (schema_type, _) => schema_type.to_string(),
    }
}

/// Description with automatic markers rewritten into a neutral hint
fn describe(schema: &PropertySchema) -> Option<String> {
    let description = schema.description.as_deref().map(str::trim).filter(|d| !d.is_empty());

    if !schema.is_automatic() {
        return description.map(ToOwned::to_owned);
    }

    let marker_source = description
        .filter(|d| template::contains_marker(d))
        .or_else(|| schema.default.as_ref().and_then(|d| d.as_str()));
    let hint = marker_source
        .and_then(|source| template::find_markers(source).into_iter().next())
        .and_then(|marker| marker.description);

    let rewritten = description
        .map(|d| template::replace_markers(d, AUTO_PLACEHOLDER).trim().to_owned())
        .filter(|d| !d.is_empty() && d != AUTO_PLACEHOLDER);

    let mut text = match rewritten {
        Some(d) if d.contains(AUTO_PLACEHOLDER) => d,
        Some(d) => format!("{d} {AUTO_PLACEHOLDER}"),
        None => AUTO_PLACEHOLDER.to_owned(),
    };

    match hint {
        Some(hint) => {
            let _ = write!(text, " infer from context: {hint}");
        }
        None => text.push_str(" infer from context"),
    }

    Some(text)
}

/// Render the transcript, filling in tool results whose messages were evicted
fn render_conversation(out: &mut String, conversation: &ConversationState) {
    let present: HashSet<&str> = conversation
        .messages()
        .iter()
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect();
    let called: HashSet<&str> = conversation
        .messages()
        .iter()
        .flat_map(|m| m.tool_calls().iter().map(|c| c.id.as_str()))
        .collect();

    let orphaned: Vec<_> = conversation
        .tool_results()
        .filter(|(id, _)| !present.contains(id) && !called.contains(id))
        .collect();

    if !orphaned.is_empty() {
        for (id, result) in orphaned {
            let _ = writeln!(out, "Tool result ({id}): {result}");
        }
        out.push('\n');
    }

    for message in conversation.messages() {
        render_message(out, message);

        for call in message.tool_calls() {
            if !present.contains(call.id.as_str())
                && let Some(result) = conversation.tool_result(&call.id)
            {
                let _ = writeln!(out, "Tool result ({}): {result}\n", call.id);
            }
        }
    }
}

fn render_message(out: &mut String, message: &Message) {
    let text = message.content.as_text();
    let text = text.trim();

    match message.role {
        Role::System => {
            let _ = writeln!(out, "System: {text}\n");
        }
        Role::User => {
            let _ = writeln!(out, "User: {text}\n");
        }
        Role::Assistant => {
            out.push_str("Assistant:");
            if !text.is_empty() {
                let _ = write!(out, " {text}");
            }
            if !message.tool_calls().is_empty() {
                let _ = write!(out, "\n{}", render_tool_calls(message.tool_calls()));
            }
            out.push_str("\n\n");
        }
        Role::Tool => {
            let id = message.tool_call_id.as_deref().unwrap_or("unknown");
            let _ = writeln!(out, "Tool result ({id}): {text}\n");
        }
    }
}

/// Prior calls in the same `<tool_calls>` convention the model is asked to use
fn render_tool_calls(calls: &[ToolCall]) -> String {
    let rendered: Vec<_> = calls
        .iter()
        .map(|call| {
            serde_json::json!({
                "name": call.function.name,
                "arguments": serde_json::Value::Object(call.arguments()),
            })
        })
        .collect();

    format!(
        "<tool_calls>\n{}\n</tool_calls>",
        serde_json::Value::Array(rendered)
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::{ParameterSchema, ToolDialect};

    fn weather() -> ToolDefinition {
        ToolDefinition {
            dialect: ToolDialect::OpenAi,
            function: FunctionDefinition::new(
                "get_weather",
                "Get the current weather for a location",
                ParameterSchema::new()
                    .property("location", PropertySchema::string("City name"))
                    .property(
                        "units",
                        PropertySchema::string("Temperature units")
                            .with_enum(&["celsius", "fahrenheit"])
                            .with_default(json!("celsius")),
                    )
                    .required(&["location"]),
            ),
        }
    }

    fn email() -> ToolDefinition {
        ToolDefinition {
            dialect: ToolDialect::OpenAi,
            function: FunctionDefinition::new(
                "send_email",
                "Send an email",
                ParameterSchema::new()
                    .property("to", PropertySchema::string("Recipient address"))
                    .property(
                        "subject",
                        PropertySchema::string("{{ $fromAI('subject', 'Short email subject', 'string') }}"),
                    )
                    .required(&["to"]),
            ),
        }
    }

    fn conversation(messages: Vec<Message>) -> ConversationState {
        let mut state = ConversationState::new();
        state.replace_messages(messages);
        state
    }

    #[test]
    fn tools_and_conversation() {
        let state = conversation(vec![
            Message::text(Role::System, "Be brief."),
            Message::text(Role::User, "Weather in Paris?"),
        ]);

        let compiled = compile(&[weather()], &ToolChoice::Auto, &state, Some("Operator rules"));

        assert_eq!(compiled.system.as_deref(), Some("Operator rules"));
        insta::assert_snapshot!(compiled.prompt, @r#"
        You have access to the following functions:

        ### get_weather
        Get the current weather for a location
        Parameters:
        - location (string, required): City name
        - units (string, optional): Temperature units. One of: "celsius", "fahrenheit". Default: "celsius"

        To call functions, reply with a <tool_calls> block containing a JSON array of calls:
        <tool_calls>
        [{"name": "function_name", "arguments": {"parameter": "value"}}]
        </tool_calls>
        "arguments" must be a JSON object matching the function's parameters. Text outside the block is shown to the user.

        Only call functions when they are needed; otherwise reply with plain text.

        System: Be brief.

        User: Weather in Paris?

        Assistant:
        "#);
    }

    #[test]
    fn automatic_parameters_get_hint_and_strategy() {
        let state = conversation(vec![Message::text(Role::User, "Email bob@example.com about lunch")]);

        let compiled = compile(&[email()], &ToolChoice::Required, &state, None);

        assert!(compiled.prompt.contains("- subject (string, optional): [auto] infer from context: Short email subject\n"));
        assert!(!compiled.prompt.contains("$fromAI"));
        assert!(compiled.prompt.contains("You must call at least one of the functions above"));
        assert!(compiled.prompt.contains(AUTO_STRATEGY));
        assert_eq!(compiled.system, None);
    }

    #[test]
    fn pinned_function_directive() {
        let compiled = compile(
            &[weather(), email()],
            &ToolChoice::Function("send_email".to_owned()),
            &ConversationState::new(),
            None,
        );

        assert!(compiled.prompt.contains("You must call the function `send_email` in this response."));
    }

    #[test]
    fn choice_none_omits_tool_section() {
        let state = conversation(vec![Message::text(Role::User, "hi")]);
        let compiled = compile(&[weather()], &ToolChoice::None, &state, None);

        insta::assert_snapshot!(compiled.prompt, @r"
        Do not call any functions. Respond with plain text only.

        User: hi

        Assistant:
        ");
    }

    #[test]
    fn prior_calls_and_results() {
        let call = ToolCall::canonical(Some("call_1".to_owned()), "get_weather", r#"{"location":"Paris"}"#).unwrap();
        let state = conversation(vec![
            Message::text(Role::User, "Weather in Paris?"),
            Message::assistant_tool_calls("", vec![call]),
            Message::tool_result("call_1", "18C and sunny"),
        ]);

        let compiled = compile(&[], &ToolChoice::Auto, &state, None);

        insta::assert_snapshot!(compiled.prompt, @r#"
        User: Weather in Paris?

        Assistant:
        <tool_calls>
        [{"name":"get_weather","arguments":{"location":"Paris"}}]
        </tool_calls>

        Tool result (call_1): 18C and sunny

        Assistant:
        "#);
    }

    #[test]
    fn evicted_tool_results_still_rendered() {
        let call = ToolCall::canonical(Some("call_9".to_owned()), "lookup_record", "{}").unwrap();
        let mut state = ConversationState::new();
        state.record_result("call_old".to_owned(), "stale result".to_owned());
        state.push(Message::assistant_tool_calls("", vec![call]));
        state.record_result("call_9".to_owned(), "record found".to_owned());
        state.push(Message::text(Role::User, "thanks"));

        let compiled = compile(&[], &ToolChoice::Auto, &state, None);

        assert!(compiled.prompt.starts_with("Tool result (call_old): stale result\n"));
        assert!(compiled.prompt.contains("</tool_calls>\n\nTool result (call_9): record found\n\nUser: thanks"));
    }
}

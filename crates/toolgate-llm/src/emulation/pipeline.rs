//! End-to-end emulated completion
//!
//! Syncs the conversation, compiles a prompt, calls the backend, normalizes
//! the output and fills inferred parameters. With `execute_tools` enabled,
//! calls to built-ins are run here and the backend is prompted again.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use toolgate_config::EmulationConfig;
use toolgate_core::RequestContext;
use toolgate_telemetry::metrics::{self, record_duration};
use toolgate_telemetry::{Counter, Histogram, KeyValue};

use super::conversation::{ConversationState, ConversationStore, SharedConversation};
use super::normalizer::{NormalizeOptions, ResponseNormalizer, estimate_tokens};
use super::prompt;
use super::resolver::{ResolutionContext, resolve_arguments};
use crate::backend::{BackendPayload, CompletionBackend, TextRequest};
use crate::error::LlmError;
use crate::tools::{ToolExecutionEngine, ToolResponse};
use crate::types::{CompletionRequest, CompletionResponse, Message, Role, ToolCall, ToolChoice, ToolDefinition, Usage};

struct PipelineMetrics {
    backend_duration: Histogram<f64>,
    backend_count: Counter<u64>,
    tokens: Counter<u64>,
    normalization: Histogram<f64>,
    emulated_calls: Counter<u64>,
}

impl PipelineMetrics {
    fn new() -> Self {
        Self {
            backend_duration: metrics::duration_histogram(metrics::BACKEND_REQUEST_DURATION),
            backend_count: metrics::counter(metrics::BACKEND_REQUEST_COUNT),
            tokens: metrics::counter(metrics::TOKEN_USAGE),
            normalization: metrics::duration_histogram(metrics::NORMALIZATION_DURATION),
            emulated_calls: metrics::counter(metrics::EMULATED_TOOL_CALLS),
        }
    }
}

/// Final result of an emulated completion
#[derive(Debug, Clone)]
pub struct Completion {
    pub response: CompletionResponse,
    /// Results of calls executed server-side, oldest first
    pub executed: Vec<ToolResponse>,
}

/// Drives requests through the emulation stages
pub struct EmulationEngine {
    normalizer: ResponseNormalizer,
    conversations: ConversationStore,
    tools: Arc<ToolExecutionEngine>,
    system_prompt: Option<String>,
    default_max_tokens: u32,
    default_temperature: Option<f64>,
    execute_tools: bool,
    max_tool_rounds: u32,
    metrics: PipelineMetrics,
}

impl EmulationEngine {
    pub fn new(config: &EmulationConfig, tools: Arc<ToolExecutionEngine>) -> Self {
        Self {
            normalizer: ResponseNormalizer::new(config.cache_capacity),
            conversations: ConversationStore::new(&config.conversation),
            tools,
            system_prompt: config.system_prompt.clone(),
            default_max_tokens: config.default_max_tokens,
            default_temperature: config.default_temperature,
            execute_tools: config.execute_tools,
            max_tool_rounds: config.max_tool_rounds,
            metrics: PipelineMetrics::new(),
        }
    }

    pub fn conversations(&self) -> &ConversationStore {
        &self.conversations
    }

    pub fn tools(&self) -> &ToolExecutionEngine {
        &self.tools
    }

    pub fn normalizer(&self) -> &ResponseNormalizer {
        &self.normalizer
    }

    /// Run a request against a backend
    ///
    /// Requests carrying a conversation id share history with earlier
    /// requests using the same id.
    pub async fn complete(
        &self,
        backend: &dyn CompletionBackend,
        request: &CompletionRequest,
        context: &RequestContext,
    ) -> Result<Completion, LlmError> {
        let conversation = match &context.conversation_id {
            Some(id) => self.conversations.get_or_create(id),
            None => Arc::new(Mutex::new(ConversationState::new())),
        };
        sync_conversation(&mut lock(&conversation), &request.messages);

        let max_tokens = request.params.max_tokens.unwrap_or(self.default_max_tokens);
        let mut tool_choice = request.tool_choice.clone();
        let mut usage = Usage::default();
        let mut executed = Vec::new();
        let mut round = 0;

        loop {
            let (compiled, resolution) = {
                let state = lock(&conversation);
                let compiled = prompt::compile(&request.tools, &tool_choice, &state, self.system_prompt.as_deref());
                (compiled, ResolutionContext::from_conversation(&state))
            };

            let prompt_tokens = estimate_tokens(&compiled.prompt)
                .saturating_add(compiled.system.as_deref().map_or(0, estimate_tokens));

            let text_request = TextRequest {
                model: request.model.clone(),
                prompt: compiled.prompt,
                system: compiled.system,
                max_tokens,
                temperature: request.params.temperature.or(self.default_temperature),
                stop: request.params.stop.clone(),
            };

            let payload = self.call_backend(backend, &text_request, context).await?;

            let options = NormalizeOptions {
                model: request.model.clone(),
                declared: request.tools.iter().map(|t| t.function.name.clone()).collect(),
                tool_choice: tool_choice.clone(),
                max_tokens: Some(max_tokens),
                prompt_tokens,
            };

            let start = Instant::now();
            let normalized = self.normalizer.normalize(&payload, &options);
            record_duration(
                &self.metrics.normalization,
                start,
                &[KeyValue::new("source", normalized.source.to_string())],
            );

            let mut response = normalized.response;
            if let Some(choice) = response.choices.first_mut() {
                fill_parameters(&mut choice.message.tool_calls, &request.tools, &resolution);
            }

            usage = Usage::new(
                usage.prompt_tokens.saturating_add(response.usage.prompt_tokens),
                usage.completion_tokens.saturating_add(response.usage.completion_tokens),
            );
            self.record_usage(backend, &response);

            let calls = response.tool_calls().to_vec();
            {
                let mut state = lock(&conversation);
                if calls.is_empty() {
                    state.push(Message::text(Role::Assistant, response.content()));
                } else {
                    state.push(Message::assistant_tool_calls("", calls.clone()));
                }
            }

            if !self.should_execute(&calls, round) {
                response.usage = usage;
                return Ok(Completion { response, executed });
            }

            let results = self.tools.execute_batch(&calls).await;
            {
                let mut state = lock(&conversation);
                for result in &results {
                    state.push(Message::tool_result(result.tool_call_id.clone(), result.content()));
                }
            }

            tracing::debug!(round, executed = results.len(), "re-prompting backend with tool results");
            executed.extend(results);
            tool_choice = ToolChoice::Auto;
            round += 1;
        }
    }

    /// Server-side execution applies only when every call has a handler
    fn should_execute(&self, calls: &[ToolCall], round: u32) -> bool {
        self.execute_tools
            && round < self.max_tool_rounds
            && !calls.is_empty()
            && calls.iter().all(|c| self.tools.registry().contains(&c.function.name))
    }

    async fn call_backend(
        &self,
        backend: &dyn CompletionBackend,
        request: &TextRequest,
        context: &RequestContext,
    ) -> Result<BackendPayload, LlmError> {
        let start = Instant::now();
        let result = backend.complete(request, context).await;

        let status = if result.is_ok() { "success" } else { "error" };
        let attributes = [
            KeyValue::new("backend", backend.name().to_owned()),
            KeyValue::new("kind", backend.kind().to_string()),
            KeyValue::new("status", status),
        ];
        record_duration(&self.metrics.backend_duration, start, &attributes);
        self.metrics.backend_count.add(1, &attributes);

        result
    }

    fn record_usage(&self, backend: &dyn CompletionBackend, response: &CompletionResponse) {
        let backend_name = KeyValue::new("backend", backend.name().to_owned());

        self.metrics.tokens.add(
            u64::from(response.usage.prompt_tokens),
            &[backend_name.clone(), KeyValue::new("direction", "input")],
        );
        self.metrics.tokens.add(
            u64::from(response.usage.completion_tokens),
            &[backend_name.clone(), KeyValue::new("direction", "output")],
        );

        let calls = response.tool_calls().len();
        if calls > 0 {
            self.metrics
                .emulated_calls
                .add(u64::try_from(calls).unwrap_or(u64::MAX), &[backend_name]);
        }
    }
}

fn lock(conversation: &SharedConversation) -> MutexGuard<'_, ConversationState> {
    conversation.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Bring stored history in line with the request
///
/// A stored conversation receiving a single new turn is appended to. Any
/// other request carries the full history and replaces the stored messages.
fn sync_conversation(state: &mut ConversationState, messages: &[Message]) {
    let mut turns = messages.iter().filter(|m| m.role != Role::System);

    if !state.is_empty()
        && let (Some(turn), None) = (turns.next(), turns.next())
    {
        let known_system: Vec<String> = state
            .messages()
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_text())
            .collect();

        for message in messages {
            if message.role == Role::System && known_system.contains(&message.content.as_text()) {
                continue;
            }
            state.push(message.clone());
        }

        tracing::trace!(role = ?turn.role, "appended turn to stored conversation");
        return;
    }

    state.replace_messages(messages.to_vec());
}

/// Resolve inferred parameters for calls to declared functions
fn fill_parameters(calls: &mut [ToolCall], tools: &[ToolDefinition], context: &ResolutionContext) {
    for call in calls {
        let Some(tool) = tools.iter().find(|t| t.function.name == call.function.name) else {
            continue;
        };

        let mut arguments = call.arguments();
        let resolved = resolve_arguments(&tool.function, &mut arguments, context);
        if !resolved.is_empty() {
            call.set_arguments(&arguments);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use indoc::indoc;
    use toolgate_config::ToolsConfig;

    use super::*;
    use crate::backend::{BackendKind, TextPayload};
    use crate::tools::ToolRegistry;
    use crate::types::{CompletionParams, FunctionDefinition, ParameterSchema, PropertySchema, ToolDialect};

    /// Replays scripted completions and remembers every prompt
    struct ScriptedBackend {
        replies: Mutex<VecDeque<String>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedBackend {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(|r| (*r).to_owned()).collect()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CompletionBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        fn kind(&self) -> BackendKind {
            BackendKind::Text
        }

        fn default_model(&self) -> Option<&str> {
            None
        }

        async fn complete(&self, request: &TextRequest, _context: &RequestContext) -> Result<BackendPayload, LlmError> {
            self.prompts.lock().unwrap().push(request.prompt.clone());
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| LlmError::Upstream("script exhausted".to_owned()))?;
            Ok(BackendPayload::Text(TextPayload::new(reply)))
        }
    }

    fn engine(config: &EmulationConfig) -> EmulationEngine {
        let tools_config = ToolsConfig::default();
        let registry = Arc::new(ToolRegistry::with_builtins(&tools_config));
        EmulationEngine::new(config, Arc::new(ToolExecutionEngine::new(registry, &tools_config)))
    }

    fn tool(function: FunctionDefinition) -> ToolDefinition {
        ToolDefinition {
            dialect: ToolDialect::OpenAi,
            function,
        }
    }

    fn weather_tool() -> ToolDefinition {
        tool(FunctionDefinition::new(
            "get_weather",
            "Get the weather",
            ParameterSchema::new()
                .property("location", PropertySchema::string("City"))
                .required(&["location"]),
        ))
    }

    fn request(messages: Vec<Message>, tools: Vec<ToolDefinition>) -> CompletionRequest {
        CompletionRequest {
            model: "local".to_owned(),
            messages,
            params: CompletionParams::default(),
            tools,
            tool_choice: ToolChoice::Auto,
            stream: false,
        }
    }

    fn context(conversation: Option<&str>) -> RequestContext {
        RequestContext {
            conversation_id: conversation.map(ToOwned::to_owned),
            ..RequestContext::empty()
        }
    }

    #[tokio::test]
    async fn emulated_call_is_parsed_from_text() {
        let engine = engine(&EmulationConfig::default());
        let backend = ScriptedBackend::new(&[indoc! {r#"
            TOOL_CALLS:
            [{"name":"get_weather","arguments":{"location":"Paris"}}]
        "#}]);
        let request = request(
            vec![Message::text(Role::User, "What's the weather in Paris?")],
            vec![weather_tool()],
        );

        let completion = engine.complete(&backend, &request, &context(None)).await.unwrap();
        let calls = completion.response.tool_calls();

        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function.arguments, r#"{"location":"Paris"}"#);
        assert_eq!(completion.response.content(), "");
        assert!(backend.prompts()[0].contains("### get_weather"));
    }

    #[tokio::test]
    async fn automatic_parameters_are_inferred() {
        let send_email = tool(FunctionDefinition::new(
            "send_email",
            "Send an email",
            ParameterSchema::new()
                .property("to", PropertySchema::string("Recipient"))
                .property(
                    "subject",
                    PropertySchema::string("{{ $fromAI('subject', 'Email subject', 'string') }}"),
                )
                .required(&["to"]),
        ));
        let engine = engine(&EmulationConfig::default());
        let backend = ScriptedBackend::new(&[r#"<tool_calls>[{"name":"send_email","arguments":{"to":"john@example.com"}}]</tool_calls>"#]);
        let request = request(
            vec![Message::text(Role::User, "Send email to John about the budget meeting")],
            vec![send_email],
        );

        let completion = engine.complete(&backend, &request, &context(None)).await.unwrap();
        let arguments = completion.response.tool_calls()[0].arguments();

        assert!(arguments["subject"].as_str().unwrap().contains("budget meeting"));
    }

    #[tokio::test]
    async fn missing_required_arguments_stay_missing() {
        let engine = engine(&EmulationConfig::default());
        let backend = ScriptedBackend::new(&[r#"<tool_calls>[{"name":"get_weather","arguments":{}}]</tool_calls>"#]);
        let request = request(vec![Message::text(Role::User, "hello there")], vec![weather_tool()]);

        let completion = engine.complete(&backend, &request, &context(None)).await.unwrap();

        assert_eq!(completion.response.tool_calls()[0].function.arguments, "{}");
    }

    #[tokio::test]
    async fn builtins_are_executed_and_reprompted() {
        let config = EmulationConfig {
            execute_tools: true,
            ..EmulationConfig::default()
        };
        let engine = engine(&config);
        let backend = ScriptedBackend::new(&[
            r#"TOOL_CALLS: [{"name":"get_weather","arguments":{"location":"Paris"}}]"#,
            "It is mild in Paris today.",
        ]);
        let request = request(
            vec![Message::text(Role::User, "Weather in Paris?")],
            vec![weather_tool()],
        );

        let completion = engine.complete(&backend, &request, &context(None)).await.unwrap();

        assert_eq!(completion.response.content(), "It is mild in Paris today.");
        assert_eq!(completion.executed.len(), 1);
        assert!(completion.executed[0].is_success());

        let prompts = backend.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains(&format!("Tool result ({})", completion.executed[0].tool_call_id)));
        assert!(completion.response.usage.prompt_tokens > 0);
    }

    #[tokio::test]
    async fn passthrough_calls_return_to_the_client() {
        let config = EmulationConfig {
            execute_tools: true,
            ..EmulationConfig::default()
        };
        let engine = engine(&config);
        let crm = tool(FunctionDefinition::new(
            "custom_crm_lookup",
            "Look up a customer",
            ParameterSchema::new().property("customer", PropertySchema::string("Customer name")),
        ));
        let backend = ScriptedBackend::new(&[r#"[{"name":"custom_crm_lookup","arguments":{"customer":"ACME"}}]"#]);
        let request = request(vec![Message::text(Role::User, "Find ACME")], vec![crm]);

        let completion = engine.complete(&backend, &request, &context(None)).await.unwrap();

        assert_eq!(completion.response.tool_calls()[0].function.name, "custom_crm_lookup");
        assert!(completion.executed.is_empty());
        assert_eq!(backend.prompts().len(), 1);
    }

    #[tokio::test]
    async fn stored_conversations_accumulate_turns() {
        let engine = engine(&EmulationConfig::default());
        let backend = ScriptedBackend::new(&["Hello!", "Your name is Ada."]);
        let ctx = context(Some("thread-1"));

        let first = request(
            vec![
                Message::text(Role::System, "Be brief."),
                Message::text(Role::User, "Hi, I'm Ada."),
            ],
            Vec::new(),
        );
        engine.complete(&backend, &first, &ctx).await.unwrap();

        let second = request(
            vec![
                Message::text(Role::System, "Be brief."),
                Message::text(Role::User, "What's my name?"),
            ],
            Vec::new(),
        );
        let completion = engine.complete(&backend, &second, &ctx).await.unwrap();
        assert_eq!(completion.response.content(), "Your name is Ada.");

        let stored = engine.conversations().get("thread-1").unwrap();
        let summary = lock(&stored).summary();
        assert_eq!(summary.messages, 5);
        assert_eq!(summary.system_messages, 1);
        assert!(backend.prompts()[1].contains("User: Hi, I'm Ada."));
    }

    #[tokio::test]
    async fn backend_failures_surface_as_upstream_errors() {
        let engine = engine(&EmulationConfig::default());
        let backend = ScriptedBackend::new(&[]);
        let request = request(vec![Message::text(Role::User, "hi")], Vec::new());

        let error = engine.complete(&backend, &request, &context(None)).await.unwrap_err();
        assert!(matches!(error, LlmError::Upstream(_)));
    }
}

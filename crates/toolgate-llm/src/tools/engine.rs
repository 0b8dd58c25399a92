use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use serde_json::{Map, Value};
use toolgate_config::ToolsConfig;
use toolgate_telemetry::metrics::{self, record_duration};
use toolgate_telemetry::{Counter, Histogram, KeyValue};

use super::coerce::coerce_arguments;
use super::error::ToolError;
use super::handler::{ToolHandler, ToolOutcome, ToolResponse};
use super::registry::ToolRegistry;
use super::security::SecurityPolicy;
use crate::types::ToolCall;

struct EngineMetrics {
    duration: Histogram<f64>,
    count: Counter<u64>,
    dropped: Counter<u64>,
}

impl EngineMetrics {
    fn new() -> Self {
        Self {
            duration: metrics::duration_histogram(metrics::TOOL_CALL_DURATION),
            count: metrics::counter(metrics::TOOL_CALL_COUNT),
            dropped: metrics::counter(metrics::TOOL_CALLS_DROPPED),
        }
    }
}

/// Runs batches of tool calls against the registry
pub struct ToolExecutionEngine {
    registry: Arc<ToolRegistry>,
    policy: SecurityPolicy,
    max_concurrent_calls: usize,
    call_timeout: Duration,
    metrics: EngineMetrics,
}

impl ToolExecutionEngine {
    pub fn new(registry: Arc<ToolRegistry>, config: &ToolsConfig) -> Self {
        Self {
            registry,
            policy: SecurityPolicy::new(config),
            max_concurrent_calls: config.max_concurrent_calls.max(1),
            call_timeout: config.call_timeout(),
            metrics: EngineMetrics::new(),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Execute up to `max_concurrent_calls` calls concurrently
    ///
    /// Calls beyond the limit are dropped. Responses come back in call order.
    pub async fn execute_batch(&self, calls: &[ToolCall]) -> Vec<ToolResponse> {
        let limit = self.max_concurrent_calls;
        let (batch, dropped) = calls.split_at(calls.len().min(limit));

        if !dropped.is_empty() {
            tracing::warn!(dropped = dropped.len(), limit, "tool batch truncated");
            self.metrics
                .dropped
                .add(u64::try_from(dropped.len()).unwrap_or(u64::MAX), &[]);
        }

        join_all(batch.iter().map(|call| self.execute(call))).await
    }

    /// Execute a single call
    ///
    /// Never fails: unknown functions pass through and every other problem
    /// becomes an error outcome.
    pub async fn execute(&self, call: &ToolCall) -> ToolResponse {
        let start = Instant::now();
        let function = call.function.name.as_str();

        let (outcome, arguments) = match self.registry.get(function) {
            None => {
                tracing::debug!(function, "no handler registered, passing call through");
                (ToolOutcome::Passthrough, Some(call.arguments()))
            }
            Some(handler) => match self.run(handler.as_ref(), call.arguments()).await {
                Ok(value) => (ToolOutcome::Success(value), None),
                Err(e) => {
                    tracing::warn!(function, call_id = %call.id, error = %e, "tool call failed");
                    (ToolOutcome::Error(e.to_string()), None)
                }
            },
        };

        let status = match &outcome {
            ToolOutcome::Success(_) => "success",
            ToolOutcome::Passthrough => "passthrough",
            ToolOutcome::Error(_) => "error",
        };
        let attributes = [
            KeyValue::new("function", function.to_owned()),
            KeyValue::new("status", status),
        ];
        record_duration(&self.metrics.duration, start, &attributes);
        self.metrics.count.add(1, &attributes);

        ToolResponse {
            tool_call_id: call.id.clone(),
            function_name: function.to_owned(),
            outcome,
            arguments,
            duration: start.elapsed(),
        }
    }

    async fn run(&self, handler: &dyn ToolHandler, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let definition = handler.definition();

        self.policy.check_dangerous(handler)?;
        self.policy.check_call(&definition.name, &arguments)?;

        let arguments = apply_aliases(handler.aliases(), arguments);
        let arguments = coerce_arguments(&definition.parameters, arguments)?;

        tokio::time::timeout(self.call_timeout, handler.call(arguments))
            .await
            .map_err(|_| ToolError::Timeout(self.call_timeout))?
    }
}

/// Rename synonym keys unless the canonical key is already present
fn apply_aliases(aliases: &[(&str, &str)], mut arguments: Map<String, Value>) -> Map<String, Value> {
    for (alias, canonical) in aliases {
        if arguments.contains_key(*canonical) {
            continue;
        }
        if let Some(value) = arguments.remove(*alias) {
            arguments.insert((*canonical).to_owned(), value);
        }
    }
    arguments
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::types::{FunctionDefinition, ParameterSchema};

    fn engine(config: &ToolsConfig) -> ToolExecutionEngine {
        ToolExecutionEngine::new(Arc::new(ToolRegistry::with_builtins(config)), config)
    }

    fn call(name: &str, arguments: Value) -> ToolCall {
        ToolCall::new(None, name, arguments.as_object().unwrap())
    }

    #[tokio::test]
    async fn aliases_and_coercion_before_execution() {
        let engine = engine(&ToolsConfig::default());
        let response = engine
            .execute(&call("calculate", json!({"op": "multiply", "x": "6", "y": 7})))
            .await;

        match response.outcome {
            ToolOutcome::Success(value) => assert_eq!(value["result"], json!(42.0)),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unregistered_function_passes_through() {
        let engine = engine(&ToolsConfig::default());
        let response = engine
            .execute(&call("custom_crm_lookup", json!({"customer": "ACME"})))
            .await;

        assert!(response.is_passthrough());
        assert!(response.is_success());
        let body = serde_json::to_value(&response).unwrap();
        assert_eq!(body["passthrough"], json!(true));
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["arguments"], json!({"customer": "ACME"}));
    }

    #[tokio::test]
    async fn oversized_batches_are_truncated() {
        let config = ToolsConfig {
            max_concurrent_calls: 3,
            ..ToolsConfig::default()
        };
        let engine = engine(&config);
        let calls: Vec<_> = (0..5)
            .map(|i| call("calculate", json!({"operation": "add", "a": i, "b": 1})))
            .collect();

        let responses = engine.execute_batch(&calls).await;

        assert_eq!(responses.len(), 3);
        let ids: Vec<_> = responses.iter().map(|r| r.tool_call_id.as_str()).collect();
        let expected: Vec<_> = calls[..3].iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn invalid_arguments_fail_the_call() {
        let engine = engine(&ToolsConfig::default());
        let response = engine
            .execute(&call("calculate", json!({"operation": "add", "a": "many", "b": 1})))
            .await;

        assert_eq!(
            response.outcome,
            ToolOutcome::Error("invalid arguments: argument `a` must be a number, got \"many\"".to_owned())
        );
    }

    #[tokio::test]
    async fn denied_calls_name_the_function() {
        let engine = engine(&ToolsConfig::default());
        let response = engine
            .execute(&call("web_search", json!({"query": "cat /etc/passwd"})))
            .await;

        let ToolOutcome::Error(message) = response.outcome else {
            panic!("expected a denial");
        };
        assert!(message.contains("`web_search`"), "{message}");
    }

    #[tokio::test]
    async fn file_builtins_require_opt_in() {
        let engine = engine(&ToolsConfig::default());
        let response = engine
            .execute(&call("read_file", json!({"file_name": "notes.txt"})))
            .await;

        assert_eq!(response.outcome, ToolOutcome::Error("function `read_file` is disabled".to_owned()));
    }

    struct Stall {
        definition: FunctionDefinition,
    }

    #[async_trait]
    impl ToolHandler for Stall {
        fn definition(&self) -> &FunctionDefinition {
            &self.definition
        }

        async fn call(&self, _arguments: Map<String, Value>) -> Result<Value, ToolError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Value::Null)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn each_call_has_its_own_timeout() {
        let config = ToolsConfig {
            call_timeout: "100ms".to_owned(),
            ..ToolsConfig::default()
        };
        let registry = Arc::new(ToolRegistry::with_builtins(&config));
        registry.register(Arc::new(Stall {
            definition: FunctionDefinition::new("stall", "Never returns in time", ParameterSchema::new()),
        }));
        let engine = ToolExecutionEngine::new(registry, &config);

        let responses = engine
            .execute_batch(&[
                call("stall", json!({})),
                call("calculate", json!({"operation": "add", "a": 1, "b": 2})),
            ])
            .await;

        assert_eq!(responses[0].outcome, ToolOutcome::Error("timed out after 100ms".to_owned()));
        assert!(responses[1].is_success());
    }
}

//! Anthropic Messages backend

use async_trait::async_trait;
use toolgate_config::BackendConfig;
use toolgate_core::RequestContext;

use super::{BackendKind, BackendPayload, CompletionBackend, TextRequest, Upstream};
use crate::error::LlmError;
use crate::protocol::anthropic::{AnthropicContent, AnthropicMessage, AnthropicRequest, AnthropicResponse, AnthropicSystem};

/// Default Anthropic API base URL
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Messages API backend
pub struct AnthropicBackend {
    upstream: Upstream,
}

impl AnthropicBackend {
    pub fn new(name: String, config: &BackendConfig) -> Result<Self, LlmError> {
        Ok(Self {
            upstream: Upstream::new(name, config, DEFAULT_BASE_URL)?,
        })
    }
}

impl From<&TextRequest> for AnthropicRequest {
    fn from(request: &TextRequest) -> Self {
        Self {
            model: request.model.clone(),
            max_tokens: request.max_tokens,
            system: request.system.clone().map(AnthropicSystem::Text),
            messages: vec![AnthropicMessage {
                role: "user".to_owned(),
                content: AnthropicContent::Text(request.prompt.clone()),
            }],
            temperature: request.temperature,
            top_p: None,
            stop_sequences: request.stop.clone(),
            stream: None,
            tools: None,
            tool_choice: None,
        }
    }
}

#[async_trait]
impl CompletionBackend for AnthropicBackend {
    fn name(&self) -> &str {
        &self.upstream.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Anthropic
    }

    fn default_model(&self) -> Option<&str> {
        self.upstream.model.as_deref()
    }

    async fn complete(&self, request: &TextRequest, context: &RequestContext) -> Result<BackendPayload, LlmError> {
        let mut wire_request = AnthropicRequest::from(request);
        wire_request.model = self.upstream.model(request).to_owned();

        let mut builder = self
            .upstream
            .client
            .post(self.upstream.endpoint("messages"))
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&wire_request);

        if let Some(key) = self.upstream.api_key(context) {
            builder = builder.header("x-api-key", key);
        }

        let response: AnthropicResponse = self.upstream.send(builder).await?;
        Ok(BackendPayload::Anthropic(response))
    }
}

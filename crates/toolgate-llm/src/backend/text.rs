//! Legacy text completions backend (`POST /completions`)

use async_trait::async_trait;
use toolgate_config::BackendConfig;
use toolgate_core::RequestContext;

use super::{BackendKind, BackendPayload, CompletionBackend, TextPayload, TextRequest, Upstream};
use crate::error::LlmError;
use crate::protocol::text::{TextCompletionRequest, TextCompletionResponse};
use crate::types::Usage;

/// Default base URL, a local inference server
const DEFAULT_BASE_URL: &str = "http://localhost:8000/v1";

/// Raw text completions backend
///
/// The endpoint has no system field, so the system instruction is placed
/// ahead of the prompt.
pub struct TextBackend {
    upstream: Upstream,
}

impl TextBackend {
    pub fn new(name: String, config: &BackendConfig) -> Result<Self, LlmError> {
        Ok(Self {
            upstream: Upstream::new(name, config, DEFAULT_BASE_URL)?,
        })
    }
}

impl From<&TextRequest> for TextCompletionRequest {
    fn from(request: &TextRequest) -> Self {
        let prompt = match &request.system {
            Some(system) => format!("{system}\n\n{}", request.prompt),
            None => request.prompt.clone(),
        };

        Self {
            model: request.model.clone(),
            prompt,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stop: request.stop.clone(),
        }
    }
}

impl From<TextCompletionResponse> for TextPayload {
    fn from(response: TextCompletionResponse) -> Self {
        let choice = response.choices.into_iter().next();

        Self {
            text: choice.as_ref().map(|c| c.text.clone()).unwrap_or_default(),
            finish_reason: choice.and_then(|c| c.finish_reason),
            usage: response
                .usage
                .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens)),
        }
    }
}

#[async_trait]
impl CompletionBackend for TextBackend {
    fn name(&self) -> &str {
        &self.upstream.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Text
    }

    fn default_model(&self) -> Option<&str> {
        self.upstream.model.as_deref()
    }

    async fn complete(&self, request: &TextRequest, context: &RequestContext) -> Result<BackendPayload, LlmError> {
        let mut wire_request = TextCompletionRequest::from(request);
        wire_request.model = self.upstream.model(request).to_owned();

        let mut builder = self
            .upstream
            .client
            .post(self.upstream.endpoint("completions"))
            .json(&wire_request);

        if let Some(key) = self.upstream.api_key(context) {
            builder = builder.bearer_auth(key);
        }

        let response: TextCompletionResponse = self.upstream.send(builder).await?;
        Ok(BackendPayload::Text(response.into()))
    }
}

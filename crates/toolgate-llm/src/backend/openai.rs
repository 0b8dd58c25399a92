//! OpenAI-compatible chat completions backend

use async_trait::async_trait;
use toolgate_config::BackendConfig;
use toolgate_core::RequestContext;

use super::{BackendKind, BackendPayload, CompletionBackend, TextRequest, Upstream};
use crate::error::LlmError;
use crate::protocol::openai::{OpenAiContent, OpenAiMessage, OpenAiRequest, OpenAiResponse};

/// Default `OpenAI` API base URL
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Chat completions backend, sent the prompt as a single user turn
pub struct OpenAiBackend {
    upstream: Upstream,
}

impl OpenAiBackend {
    pub fn new(name: String, config: &BackendConfig) -> Result<Self, LlmError> {
        Ok(Self {
            upstream: Upstream::new(name, config, DEFAULT_BASE_URL)?,
        })
    }
}

fn message(role: &str, text: &str) -> OpenAiMessage {
    OpenAiMessage {
        role: role.to_owned(),
        content: Some(OpenAiContent::Text(text.to_owned())),
        name: None,
        tool_calls: None,
        tool_call_id: None,
    }
}

impl From<&TextRequest> for OpenAiRequest {
    fn from(request: &TextRequest) -> Self {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(message("system", system));
        }
        messages.push(message("user", &request.prompt));

        Self {
            model: request.model.clone(),
            messages,
            temperature: request.temperature,
            top_p: None,
            max_tokens: Some(request.max_tokens),
            stop: request.stop.clone(),
            stream: None,
            tools: None,
            tool_choice: None,
        }
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    fn name(&self) -> &str {
        &self.upstream.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::OpenAi
    }

    fn default_model(&self) -> Option<&str> {
        self.upstream.model.as_deref()
    }

    async fn complete(&self, request: &TextRequest, context: &RequestContext) -> Result<BackendPayload, LlmError> {
        let mut wire_request = OpenAiRequest::from(request);
        wire_request.model = self.upstream.model(request).to_owned();

        let mut builder = self
            .upstream
            .client
            .post(self.upstream.endpoint("chat/completions"))
            .json(&wire_request);

        if let Some(key) = self.upstream.api_key(context) {
            builder = builder.bearer_auth(key);
        }

        let response: OpenAiResponse = self.upstream.send(builder).await?;
        Ok(BackendPayload::OpenAi(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_becomes_system_and_user_turns() {
        let request = TextRequest {
            model: "gpt-4o-mini".to_owned(),
            prompt: "User: hi\n\nAssistant:".to_owned(),
            system: Some("Be brief.".to_owned()),
            max_tokens: 256,
            temperature: Some(0.2),
            stop: None,
        };

        let wire = serde_json::to_value(OpenAiRequest::from(&request)).unwrap();

        assert_eq!(wire["messages"][0]["role"], "system");
        assert_eq!(wire["messages"][1]["content"], "User: hi\n\nAssistant:");
        assert_eq!(wire["max_tokens"], 256);
        assert!(wire.get("tools").is_none());
    }
}

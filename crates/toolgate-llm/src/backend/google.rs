//! Google `generateContent` backend (Gemini and Vertex style)

use async_trait::async_trait;
use toolgate_config::BackendConfig;
use toolgate_core::RequestContext;

use super::{BackendKind, BackendPayload, CompletionBackend, TextRequest, Upstream};
use crate::error::LlmError;
use crate::protocol::google::{GoogleContent, GoogleGenerationConfig, GooglePart, GoogleRequest, GoogleResponse};

/// Default Google Generative Language API base URL
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// `generateContent` backend
pub struct GoogleBackend {
    upstream: Upstream,
}

impl GoogleBackend {
    pub fn new(name: String, config: &BackendConfig) -> Result<Self, LlmError> {
        Ok(Self {
            upstream: Upstream::new(name, config, DEFAULT_BASE_URL)?,
        })
    }
}

impl From<&TextRequest> for GoogleRequest {
    fn from(request: &TextRequest) -> Self {
        Self {
            contents: vec![GoogleContent {
                role: Some("user".to_owned()),
                parts: vec![GooglePart::Text(request.prompt.clone())],
            }],
            system_instruction: request.system.as_ref().map(|system| GoogleContent {
                role: None,
                parts: vec![GooglePart::Text(system.clone())],
            }),
            generation_config: Some(GoogleGenerationConfig {
                temperature: request.temperature,
                top_p: None,
                max_output_tokens: Some(request.max_tokens),
                stop_sequences: request.stop.clone(),
            }),
        }
    }
}

#[async_trait]
impl CompletionBackend for GoogleBackend {
    fn name(&self) -> &str {
        &self.upstream.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Google
    }

    fn default_model(&self) -> Option<&str> {
        self.upstream.model.as_deref()
    }

    async fn complete(&self, request: &TextRequest, context: &RequestContext) -> Result<BackendPayload, LlmError> {
        let wire_request = GoogleRequest::from(request);
        let model = self.upstream.model(request);
        let url = self.upstream.endpoint(&format!("models/{model}:generateContent"));

        let mut builder = self.upstream.client.post(url).json(&wire_request);

        if let Some(key) = self.upstream.api_key(context) {
            builder = builder.query(&[("key", key)]);
        }

        let response: GoogleResponse = self.upstream.send(builder).await?;
        Ok(BackendPayload::Google(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_shape() {
        let request = TextRequest {
            model: "gemini-2.0-flash".to_owned(),
            prompt: "User: hi\n\nAssistant:".to_owned(),
            system: Some("rules".to_owned()),
            max_tokens: 64,
            temperature: None,
            stop: None,
        };

        let wire = serde_json::to_value(GoogleRequest::from(&request)).unwrap();

        assert_eq!(wire["contents"][0]["parts"][0]["text"], "User: hi\n\nAssistant:");
        assert_eq!(wire["systemInstruction"]["parts"][0]["text"], "rules");
        assert_eq!(wire["generationConfig"]["maxOutputTokens"], 64);
    }
}

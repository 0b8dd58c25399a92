//! Text-completion backends
//!
//! Backends never see tool definitions. Each one takes a compiled prompt,
//! calls its upstream API and hands back the raw payload for the
//! normalizer.

pub mod anthropic;
pub mod google;
pub mod openai;
pub mod text;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use toolgate_config::{BackendConfig, BackendType};
use toolgate_core::RequestContext;
use url::Url;

use crate::error::LlmError;
use crate::protocol::anthropic::AnthropicResponse;
use crate::protocol::google::GoogleResponse;
use crate::protocol::openai::OpenAiResponse;
use crate::types::Usage;

/// Upstream protocol a payload came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BackendKind {
    /// Legacy text completions
    Text,
    /// OpenAI-compatible chat completions
    #[serde(rename = "openai")]
    #[strum(serialize = "openai")]
    OpenAi,
    /// Anthropic Messages
    Anthropic,
    /// Google `generateContent`
    Google,
}

impl From<BackendType> for BackendKind {
    fn from(backend_type: BackendType) -> Self {
        match backend_type {
            BackendType::Openai => Self::OpenAi,
            BackendType::Anthropic => Self::Anthropic,
            BackendType::Google => Self::Google,
            BackendType::Text => Self::Text,
        }
    }
}

/// Prompt sent to a backend
#[derive(Debug, Clone, PartialEq)]
pub struct TextRequest {
    /// Model name sent upstream
    pub model: String,
    /// Compiled prompt
    pub prompt: String,
    /// System instruction, when there is one
    pub system: Option<String>,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
    pub stop: Option<Vec<String>>,
}

/// Plain text output of a text-completion backend
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TextPayload {
    pub text: String,
    /// Finish reason as reported upstream
    pub finish_reason: Option<String>,
    pub usage: Option<Usage>,
}

impl TextPayload {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// Raw backend output awaiting normalization
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum BackendPayload {
    Text(TextPayload),
    OpenAi(OpenAiResponse),
    Anthropic(AnthropicResponse),
    Google(GoogleResponse),
}

impl BackendPayload {
    pub const fn kind(&self) -> BackendKind {
        match self {
            Self::Text(_) => BackendKind::Text,
            Self::OpenAi(_) => BackendKind::OpenAi,
            Self::Anthropic(_) => BackendKind::Anthropic,
            Self::Google(_) => BackendKind::Google,
        }
    }
}

/// A backend that turns a prompt into free-form text
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Configured backend name
    fn name(&self) -> &str;

    /// Upstream protocol
    fn kind(&self) -> BackendKind;

    /// Model sent upstream when the client's model is not forwarded
    fn default_model(&self) -> Option<&str>;

    /// Run one completion
    async fn complete(&self, request: &TextRequest, context: &RequestContext) -> Result<BackendPayload, LlmError>;
}

/// Build a backend from its configuration
pub fn from_config(name: &str, config: &BackendConfig) -> Result<Arc<dyn CompletionBackend>, LlmError> {
    let backend: Arc<dyn CompletionBackend> = match config.backend_type {
        BackendType::Openai => Arc::new(openai::OpenAiBackend::new(name.to_owned(), config)?),
        BackendType::Anthropic => Arc::new(anthropic::AnthropicBackend::new(name.to_owned(), config)?),
        BackendType::Google => Arc::new(google::GoogleBackend::new(name.to_owned(), config)?),
        BackendType::Text => Arc::new(text::TextBackend::new(name.to_owned(), config)?),
    };

    Ok(backend)
}

/// Connection settings shared by every backend
struct Upstream {
    name: String,
    client: Client,
    base_url: Url,
    api_key: Option<SecretString>,
    model: Option<String>,
    forward_authorization: bool,
}

impl Upstream {
    fn new(name: String, config: &BackendConfig, default_base_url: &str) -> Result<Self, LlmError> {
        let base_url = match &config.base_url {
            Some(url) => url.clone(),
            None => Url::parse(default_base_url).map_err(|e| LlmError::Internal(e.into()))?,
        };

        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| LlmError::Internal(e.into()))?;

        Ok(Self {
            name,
            client,
            base_url,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            forward_authorization: config.forward_authorization,
        })
    }

    /// Resolve the API key from the request context or configuration
    fn api_key(&self, context: &RequestContext) -> Option<String> {
        if self.forward_authorization
            && let Some(key) = &context.api_key
        {
            return Some(key.expose_secret().to_owned());
        }

        self.api_key.as_ref().map(|k| k.expose_secret().to_owned())
    }

    fn endpoint(&self, path: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/{path}")
    }

    /// Model sent upstream: configured override, else the request's
    fn model<'a>(&'a self, request: &'a TextRequest) -> &'a str {
        self.model.as_deref().unwrap_or(&request.model)
    }

    /// Send a prepared request and decode the JSON body
    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, LlmError> {
        let response = builder.send().await.map_err(|e| {
            tracing::error!(backend = %self.name, error = %e, "upstream request failed");
            LlmError::Upstream(e.to_string())
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(backend = %self.name, status = %status, "upstream returned error");
            return Err(LlmError::Upstream(format!("backend returned {status}: {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::Upstream(format!("failed to parse response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_labels() {
        assert_eq!(BackendKind::OpenAi.to_string(), "openai");
        assert_eq!(BackendKind::from(BackendType::Text), BackendKind::Text);
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let config: BackendConfig = toml::from_str(
            r#"
            type = "text"
            base_url = "http://localhost:8000/v1/"
            "#,
        )
        .unwrap();

        let upstream = Upstream::new("local".to_owned(), &config, "http://unused").unwrap();
        assert_eq!(upstream.endpoint("completions"), "http://localhost:8000/v1/completions");
    }
}

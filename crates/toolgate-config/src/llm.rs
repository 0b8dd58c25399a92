use std::time::Duration;

use indexmap::IndexMap;
use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Fallback request timeout for backends that do not set one
const DEFAULT_BACKEND_TIMEOUT: Duration = Duration::from_secs(60);

/// Top-level backend configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LlmConfig {
    /// Backend used when the requested model does not name one
    ///
    /// Defaults to the first configured backend.
    #[serde(default)]
    pub default_backend: Option<String>,
    /// Backend configurations keyed by name
    #[serde(default)]
    pub backends: IndexMap<String, BackendConfig>,
}

impl LlmConfig {
    /// Name of the backend requests fall back to
    pub fn default_backend_name(&self) -> Option<&str> {
        self.default_backend
            .as_deref()
            .or_else(|| self.backends.keys().next().map(String::as_str))
    }
}

/// Configuration for a single text-completion backend
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Backend protocol
    #[serde(rename = "type")]
    pub backend_type: BackendType,
    /// API key for authentication
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Model sent upstream, overriding the one the client asked for
    #[serde(default)]
    pub model: Option<String>,
    /// Forward the client's bearer token to the backend
    #[serde(default)]
    pub forward_authorization: bool,
    /// Per-request timeout (e.g. "30s", "2m")
    #[serde(default)]
    pub timeout: Option<String>,
}

impl BackendConfig {
    /// Effective request timeout
    ///
    /// Values are checked at load time, so an unparsable string here
    /// falls back to the default.
    pub fn timeout(&self) -> Duration {
        self.timeout
            .as_deref()
            .and_then(|s| duration_str::parse(s).ok())
            .unwrap_or(DEFAULT_BACKEND_TIMEOUT)
    }
}

/// Supported backend protocols
///
/// None of these are sent tool definitions; every backend is treated as a
/// plain text generator and tool calling is emulated on top of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendType {
    /// OpenAI-compatible chat completions API
    Openai,
    /// Anthropic Messages API
    Anthropic,
    /// Google `generateContent` API (Gemini / Vertex style)
    Google,
    /// Legacy text completions API (`POST /completions`)
    Text,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_backend_is_default() {
        let config: LlmConfig = toml::from_str(
            r#"
            [backends.primary]
            type = "openai"

            [backends.secondary]
            type = "anthropic"
            "#,
        )
        .unwrap();

        assert_eq!(config.default_backend_name(), Some("primary"));
    }

    #[test]
    fn explicit_default_backend() {
        let config: LlmConfig = toml::from_str(
            r#"
            default_backend = "secondary"

            [backends.primary]
            type = "openai"

            [backends.secondary]
            type = "text"
            base_url = "http://localhost:8000/v1"
            timeout = "15s"
            "#,
        )
        .unwrap();

        assert_eq!(config.default_backend_name(), Some("secondary"));
        let secondary = &config.backends["secondary"];
        assert_eq!(secondary.backend_type, BackendType::Text);
        assert_eq!(secondary.timeout(), Duration::from_secs(15));
    }

    #[test]
    fn timeout_defaults() {
        let config: BackendConfig = toml::from_str(r#"type = "google""#).unwrap();
        assert_eq!(config.timeout(), DEFAULT_BACKEND_TIMEOUT);
    }

    #[test]
    fn unknown_backend_type_rejected() {
        let result = toml::from_str::<BackendConfig>(r#"type = "bedrock""#);
        assert!(result.is_err());
    }
}

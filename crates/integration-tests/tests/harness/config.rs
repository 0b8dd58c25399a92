//! Programmatic configuration builder for integration tests

use std::net::SocketAddr;

use secrecy::SecretString;
use toolgate_config::{BackendConfig, BackendType, Config};

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with minimal defaults
    pub fn new() -> Self {
        let mut config = Config::default();
        config.server.listen_address = Some(SocketAddr::from(([127, 0, 0, 1], 0)));

        Self { config }
    }

    /// Add a backend of the given protocol pointed at a mock server
    pub fn with_backend(mut self, name: &str, backend_type: BackendType, base_url: &str) -> Self {
        self.config.llm.backends.insert(
            name.to_owned(),
            BackendConfig {
                backend_type,
                api_key: Some(SecretString::from("test-key")),
                base_url: Some(base_url.parse().expect("valid URL")),
                model: None,
                forward_authorization: false,
                timeout: Some("5s".to_owned()),
            },
        );
        self
    }

    /// Add a legacy text completions backend
    pub fn with_text_backend(self, name: &str, base_url: &str) -> Self {
        self.with_backend(name, BackendType::Text, base_url)
    }

    /// Execute calls to built-in tools server-side
    pub fn with_tool_execution(mut self, max_rounds: u32) -> Self {
        self.config.emulation.execute_tools = true;
        self.config.emulation.max_tool_rounds = max_rounds;
        self
    }

    pub fn with_max_concurrent_calls(mut self, limit: usize) -> Self {
        self.config.tools.max_concurrent_calls = limit;
        self
    }

    /// Disable health endpoint
    pub fn without_health(mut self) -> Self {
        self.config.server.health.enabled = false;
        self
    }

    /// Build the final config
    pub fn build(self) -> Config {
        self.config
    }
}

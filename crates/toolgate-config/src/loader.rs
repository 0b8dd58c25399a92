use std::path::Path;

use crate::{BackendType, Config};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        Self::from_toml(&raw)
    }

    /// Parse and validate configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing or validation fails
    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if no backend is configured, a referenced backend
    /// is missing, a duration cannot be parsed, or tool limits are invalid
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_backends()?;
        self.validate_emulation()?;
        self.validate_tools()?;
        Ok(())
    }

    fn validate_backends(&self) -> anyhow::Result<()> {
        if self.llm.backends.is_empty() {
            anyhow::bail!("at least one backend must be configured under [llm.backends]");
        }

        if let Some(ref name) = self.llm.default_backend
            && !self.llm.backends.contains_key(name)
        {
            anyhow::bail!("default_backend '{name}' is not a configured backend");
        }

        for (name, backend) in &self.llm.backends {
            if backend.backend_type == BackendType::Text && backend.base_url.is_none() {
                anyhow::bail!("backend '{name}' of type 'text' requires base_url");
            }

            if let Some(ref timeout) = backend.timeout {
                duration_str::parse(timeout)
                    .map_err(|e| anyhow::anyhow!("invalid timeout for backend '{name}': {e}"))?;
            }
        }

        Ok(())
    }

    fn validate_emulation(&self) -> anyhow::Result<()> {
        let emulation = &self.emulation;

        if emulation.default_max_tokens == 0 {
            anyhow::bail!("emulation.default_max_tokens must be greater than 0");
        }

        if emulation.execute_tools && emulation.max_tool_rounds == 0 {
            anyhow::bail!("emulation.max_tool_rounds must be greater than 0 when execute_tools is enabled");
        }

        duration_str::parse(&emulation.conversation.idle_timeout)
            .map_err(|e| anyhow::anyhow!("invalid emulation.conversation.idle_timeout: {e}"))?;

        Ok(())
    }

    fn validate_tools(&self) -> anyhow::Result<()> {
        let tools = &self.tools;

        if tools.max_concurrent_calls == 0 {
            anyhow::bail!("tools.max_concurrent_calls must be at least 1");
        }

        duration_str::parse(&tools.call_timeout)
            .map_err(|e| anyhow::anyhow!("invalid tools.call_timeout: {e}"))?;

        if tools.allow_dangerous_functions && tools.sandbox_dir.is_none() {
            anyhow::bail!("tools.sandbox_dir is required when allow_dangerous_functions is enabled");
        }

        Ok(())
    }
}

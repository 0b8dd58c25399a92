use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Limits and safety switches for tool execution
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfig {
    /// Largest batch executed per request; extra calls are dropped
    #[serde(default = "default_max_concurrent_calls")]
    pub max_concurrent_calls: usize,
    /// Per-call timeout (e.g. "30s")
    #[serde(default = "default_call_timeout")]
    pub call_timeout: String,
    /// Enable the file built-ins
    #[serde(default)]
    pub allow_dangerous_functions: bool,
    /// Directory file built-ins are confined to
    #[serde(default)]
    pub sandbox_dir: Option<PathBuf>,
    /// Additional denylisted substrings, on top of the built-in list
    #[serde(default)]
    pub denylist_extra: Vec<String>,
    /// Built-in functions that should not be registered
    #[serde(default)]
    pub disabled: Vec<String>,
}

impl ToolsConfig {
    /// Parsed per-call timeout
    pub fn call_timeout(&self) -> Duration {
        duration_str::parse(&self.call_timeout).unwrap_or(Duration::from_secs(30))
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            max_concurrent_calls: default_max_concurrent_calls(),
            call_timeout: default_call_timeout(),
            allow_dangerous_functions: false,
            sandbox_dir: None,
            denylist_extra: Vec::new(),
            disabled: Vec::new(),
        }
    }
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_concurrent_calls() -> usize {
    5
}

fn default_call_timeout() -> String {
    "30s".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ToolsConfig::default();
        assert_eq!(config.max_concurrent_calls, 5);
        assert_eq!(config.call_timeout(), Duration::from_secs(30));
        assert!(!config.allow_dangerous_functions);
    }

    #[test]
    fn deserialize_overrides() {
        let config: ToolsConfig = toml::from_str(
            r#"
            max_concurrent_calls = 3
            call_timeout = "500ms"
            allow_dangerous_functions = true
            sandbox_dir = "/var/lib/toolgate"
            denylist_extra = ["drop table"]
            disabled = ["web_search"]
            "#,
        )
        .unwrap();

        assert_eq!(config.max_concurrent_calls, 3);
        assert_eq!(config.call_timeout(), Duration::from_millis(500));
        assert_eq!(config.sandbox_dir, Some(PathBuf::from("/var/lib/toolgate")));
        assert_eq!(config.denylist_extra, vec!["drop table".to_owned()]);
        assert_eq!(config.disabled, vec!["web_search".to_owned()]);
    }
}

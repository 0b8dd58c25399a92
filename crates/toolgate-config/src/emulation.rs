use std::time::Duration;

use serde::Deserialize;

/// Tool-calling emulation settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmulationConfig {
    /// Extra system instruction prepended to every compiled prompt
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Token ceiling used when the client does not send `max_tokens`
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,
    /// Temperature used when the client does not send one
    #[serde(default)]
    pub default_temperature: Option<f64>,
    /// Maximum number of memoized normalization results
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
    /// Run built-in tools server-side and re-prompt the backend
    #[serde(default)]
    pub execute_tools: bool,
    /// Upper bound on server-side execution rounds per request
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: u32,
    /// Conversation store limits
    #[serde(default)]
    pub conversation: ConversationStoreConfig,
}

impl Default for EmulationConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            default_max_tokens: default_max_tokens(),
            default_temperature: None,
            cache_capacity: default_cache_capacity(),
            execute_tools: false,
            max_tool_rounds: default_max_tool_rounds(),
            conversation: ConversationStoreConfig::default(),
        }
    }
}

/// Limits for conversations tracked through `x-conversation-id`
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConversationStoreConfig {
    /// Maximum number of conversations kept in memory
    #[serde(default = "default_max_conversations")]
    pub max_conversations: u64,
    /// Idle time after which a conversation is dropped (e.g. "1h")
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: String,
}

impl ConversationStoreConfig {
    /// Parsed idle timeout
    pub fn idle_timeout(&self) -> Duration {
        duration_str::parse(&self.idle_timeout).unwrap_or(Duration::from_secs(3600))
    }
}

impl Default for ConversationStoreConfig {
    fn default() -> Self {
        Self {
            max_conversations: default_max_conversations(),
            idle_timeout: default_idle_timeout(),
        }
    }
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_tokens() -> u32 {
    1024
}

#[allow(clippy::missing_const_for_fn)]
fn default_cache_capacity() -> usize {
    256
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_tool_rounds() -> u32 {
    3
}

#[allow(clippy::missing_const_for_fn)]
fn default_max_conversations() -> u64 {
    10_000
}

fn default_idle_timeout() -> String {
    "1h".to_string()
}

//! Configuration for the Toolgate gateway
//!
//! Loaded from a TOML file with `{{ env.VAR }}` expansion applied to the raw
//! text before deserialization.

#![allow(clippy::must_use_candidate)]

pub mod emulation;
mod env;
pub mod health;
pub mod llm;
mod loader;
pub mod server;
pub mod telemetry;
pub mod tools;

use serde::Deserialize;

pub use emulation::*;
pub use env::EnvExpansionError;
pub use health::*;
pub use llm::*;
pub use server::*;
pub use telemetry::TelemetryConfig;
pub use tools::*;

/// Top-level Toolgate configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Text-completion backends
    #[serde(default)]
    pub llm: LlmConfig,
    /// Tool-calling emulation settings
    #[serde(default)]
    pub emulation: EmulationConfig,
    /// Tool execution limits
    #[serde(default)]
    pub tools: ToolsConfig,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}

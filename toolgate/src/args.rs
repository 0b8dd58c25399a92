use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

/// Toolgate tool-calling gateway
#[derive(Debug, Parser)]
#[command(
    name = "toolgate",
    about = "OpenAI and Anthropic compatible gateway that emulates tool calling for text-only models"
)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "toolgate.toml", env = "TOOLGATE_CONFIG")]
    pub config: PathBuf,

    /// Override the listen address
    #[arg(long, env = "TOOLGATE_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Log filter directive, overridden by `RUST_LOG`
    #[arg(long, default_value = "info", env = "TOOLGATE_LOG")]
    pub log: String,
}

//! Functions the gateway can run itself

mod calculate;
mod files;
mod simulated;
mod time;

use std::sync::Arc;

use serde_json::{Map, Value};
use toolgate_config::ToolsConfig;

pub use self::calculate::Calculate;
pub use self::files::{ReadFile, WriteFile};
pub use self::simulated::{GetWeather, LookupRecord, SendEmail, WebSearch};
pub use self::time::GetCurrentTime;
use super::error::ToolError;
use super::handler::ToolHandler;

/// Every built-in, in registration order
pub fn builtin_handlers(config: &ToolsConfig) -> Vec<Arc<dyn ToolHandler>> {
    vec![
        Arc::new(Calculate::new()),
        Arc::new(GetCurrentTime::new()),
        Arc::new(GetWeather::new()),
        Arc::new(WebSearch::new()),
        Arc::new(LookupRecord::new()),
        Arc::new(SendEmail::new()),
        Arc::new(ReadFile::new(config.sandbox_dir.clone())),
        Arc::new(WriteFile::new(config.sandbox_dir.clone())),
    ]
}

// -- Argument accessors, valid after coercion --

fn str_arg<'a>(arguments: &'a Map<String, Value>, name: &str) -> Result<&'a str, ToolError> {
    arguments
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::invalid(name, "must be a string"))
}

fn f64_arg(arguments: &Map<String, Value>, name: &str) -> Result<f64, ToolError> {
    arguments
        .get(name)
        .and_then(Value::as_f64)
        .ok_or_else(|| ToolError::invalid(name, "must be a number"))
}

//! Sandboxed file access, off unless `allow_dangerous_functions` is set

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::io::AsyncWriteExt;

use super::str_arg;
use crate::tools::error::ToolError;
use crate::tools::handler::ToolHandler;
use crate::tools::security::{ensure_confined, sandboxed_path};
use crate::types::{FunctionDefinition, ParameterSchema, PropertySchema};

/// Largest file `read_file` will return
const MAX_READ_BYTES: u64 = 1024 * 1024;

const FILE_ALIASES: &[(&str, &str)] = &[("filename", "file_name"), ("path", "file_name"), ("name", "file_name")];

pub struct ReadFile {
    definition: FunctionDefinition,
    sandbox: Option<PathBuf>,
}

impl ReadFile {
    pub fn new(sandbox: Option<PathBuf>) -> Self {
        let parameters = ParameterSchema::new()
            .property("file_name", PropertySchema::string("Name of a file in the sandbox directory"))
            .required(&["file_name"]);

        Self {
            definition: FunctionDefinition::new("read_file", "Read a text file from the sandbox directory", parameters),
            sandbox,
        }
    }
}

#[async_trait]
impl ToolHandler for ReadFile {
    fn definition(&self) -> &FunctionDefinition {
        &self.definition
    }

    fn aliases(&self) -> &[(&'static str, &'static str)] {
        FILE_ALIASES
    }

    fn is_dangerous(&self) -> bool {
        true
    }

    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let file_name = str_arg(&arguments, "file_name")?;
        let path = sandboxed_path(self.sandbox.as_deref(), file_name)?;
        ensure_confined(&self.definition.name, &path).await?;

        let metadata = tokio::fs::metadata(&path).await?;
        if metadata.len() > MAX_READ_BYTES {
            return Err(ToolError::execution(format!("file exceeds {MAX_READ_BYTES} bytes")));
        }

        let content = tokio::fs::read_to_string(&path).await?;

        Ok(json!({
            "file_name": file_name,
            "content": content,
        }))
    }
}

pub struct WriteFile {
    definition: FunctionDefinition,
    sandbox: Option<PathBuf>,
}

impl WriteFile {
    pub fn new(sandbox: Option<PathBuf>) -> Self {
        let parameters = ParameterSchema::new()
            .property("file_name", PropertySchema::string("Name of a file in the sandbox directory"))
            .property("content", PropertySchema::string("Text to write"))
            .property(
                "append",
                PropertySchema::boolean("Append instead of overwriting").with_default(Value::Bool(false)),
            )
            .required(&["file_name", "content"]);

        Self {
            definition: FunctionDefinition::new("write_file", "Write a text file in the sandbox directory", parameters),
            sandbox,
        }
    }
}

#[async_trait]
impl ToolHandler for WriteFile {
    fn definition(&self) -> &FunctionDefinition {
        &self.definition
    }

    fn aliases(&self) -> &[(&'static str, &'static str)] {
        FILE_ALIASES
    }

    fn is_dangerous(&self) -> bool {
        true
    }

    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        let file_name = str_arg(&arguments, "file_name")?;
        let content = str_arg(&arguments, "content")?;
        let append = arguments.get("append").and_then(Value::as_bool).unwrap_or(false);
        let path = sandboxed_path(self.sandbox.as_deref(), file_name)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        ensure_confined(&self.definition.name, &path).await?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&path)
            .await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;

        Ok(json!({
            "file_name": file_name,
            "bytes_written": content.len(),
            "appended": append,
        }))
    }
}

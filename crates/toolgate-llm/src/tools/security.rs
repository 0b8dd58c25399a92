//! Denylist screening and sandbox confinement for tool calls

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use toolgate_config::ToolsConfig;

use super::error::ToolError;
use super::handler::ToolHandler;

/// Terms that block a call when found in a function name or argument
const DENYLIST: &[&str] = &[
    "exec",
    "eval",
    "system(",
    "subprocess",
    "os.",
    "rm -rf",
    "../",
    "..\\",
    "/etc/passwd",
    "/etc/shadow",
    "__import__",
    "sudo",
    "chmod",
    "chown",
    "password",
    "secret",
    "credential",
    "private_key",
];

static BUILTIN_TERMS: LazyLock<Vec<DenyTerm>> =
    LazyLock::new(|| DENYLIST.iter().filter_map(|term| DenyTerm::new(term)).collect());

/// Extensions the file built-ins may touch
const ALLOWED_EXTENSIONS: &[&str] = &["txt", "md", "json", "csv", "log"];

/// A lowercased denylist term and its matcher
///
/// Word characters at either end of the term must sit on a word boundary,
/// so `exec` does not match `executive` and `os.` does not match `photos.txt`.
#[derive(Debug, Clone)]
struct DenyTerm {
    term: String,
    pattern: Regex,
}

impl DenyTerm {
    fn new(term: &str) -> Option<Self> {
        let term = term.trim().to_lowercase();
        if term.is_empty() {
            return None;
        }

        let is_word = |c: Option<char>| c.is_some_and(|c| c.is_alphanumeric() || c == '_');
        let start = if is_word(term.chars().next()) { r"\b" } else { "" };
        let end = if is_word(term.chars().last()) { r"\b" } else { "" };

        match Regex::new(&format!("(?i){start}{}{end}", regex::escape(&term))) {
            Ok(pattern) => Some(Self { term, pattern }),
            Err(e) => {
                tracing::warn!(term = %term, error = %e, "ignoring unusable denylist term");
                None
            }
        }
    }
}

/// Checks applied to every call before its handler runs
#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    denylist: Vec<DenyTerm>,
    allow_dangerous: bool,
}

impl SecurityPolicy {
    pub fn new(config: &ToolsConfig) -> Self {
        let denylist = BUILTIN_TERMS
            .iter()
            .cloned()
            .chain(config.denylist_extra.iter().filter_map(|term| DenyTerm::new(term)))
            .collect();

        Self {
            denylist,
            allow_dangerous: config.allow_dangerous_functions,
        }
    }

    /// Screen a function name and every string in its arguments
    ///
    /// Names are matched per `_`/`-` segment, so `exec_shell` is denied and
    /// `execute_query` is not. Argument strings are searched for each term
    /// on word boundaries, case-insensitively.
    pub fn check_call(&self, function: &str, arguments: &Map<String, Value>) -> Result<(), ToolError> {
        let lowered = function.to_lowercase();
        if let Some(term) = lowered
            .split(['_', '-'])
            .find_map(|segment| self.denylist.iter().find(|deny| deny.term == segment))
        {
            return Err(denied(function, format!("function name matches `{}`", term.term)));
        }

        for value in arguments.values() {
            if let Some(term) = self.find_in_value(value) {
                return Err(denied(function, format!("argument contains `{term}`")));
            }
        }

        Ok(())
    }

    /// Refuse handlers flagged dangerous unless explicitly enabled
    pub fn check_dangerous(&self, handler: &dyn ToolHandler) -> Result<(), ToolError> {
        if handler.is_dangerous() && !self.allow_dangerous {
            return Err(ToolError::Disabled(handler.definition().name.clone()));
        }
        Ok(())
    }

    fn find_in_value(&self, value: &Value) -> Option<&str> {
        match value {
            Value::String(s) => self
                .denylist
                .iter()
                .find(|deny| deny.pattern.is_match(s))
                .map(|deny| deny.term.as_str()),
            Value::Array(items) => items.iter().find_map(|v| self.find_in_value(v)),
            Value::Object(map) => map.values().find_map(|v| self.find_in_value(v)),
            _ => None,
        }
    }
}

fn denied(function: &str, reason: String) -> ToolError {
    tracing::warn!(function, reason = %reason, "tool call denied");
    ToolError::Denied {
        function: function.to_owned(),
        reason,
    }
}

/// Resolve a flat file name inside the sandbox directory
pub fn sandboxed_path(sandbox: Option<&Path>, file_name: &str) -> Result<PathBuf, ToolError> {
    let Some(sandbox) = sandbox else {
        return Err(ToolError::execution("no sandbox directory configured"));
    };

    if file_name.is_empty() || file_name.starts_with('.') || file_name.contains(['/', '\\']) || file_name.contains("..") {
        return Err(ToolError::invalid("file_name", "must be a plain file name"));
    }

    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension {
        Some(ext) if ALLOWED_EXTENSIONS.contains(&ext.as_str()) => Ok(sandbox.join(file_name)),
        _ => Err(ToolError::invalid(
            "file_name",
            format!("must end in one of: {}", ALLOWED_EXTENSIONS.join(", ")),
        )),
    }
}

/// Confirm a sandboxed path still lands in the sandbox once links are followed
///
/// A dangling link is refused too, since creating the file would follow it.
pub async fn ensure_confined(function: &str, path: &Path) -> Result<(), ToolError> {
    let Some(sandbox) = path.parent() else {
        return Err(denied(function, "path has no sandbox directory".to_owned()));
    };
    let root = tokio::fs::canonicalize(sandbox).await?;

    match tokio::fs::canonicalize(path).await {
        Ok(resolved) if resolved.starts_with(&root) => Ok(()),
        Ok(_) => Err(denied(function, "path resolves outside the sandbox".to_owned())),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            if tokio::fs::symlink_metadata(path).await.is_ok() {
                Err(denied(function, "dangling link in the sandbox".to_owned()))
            } else {
                Ok(())
            }
        }
        Err(e) => Err(e.into()),
    }
}

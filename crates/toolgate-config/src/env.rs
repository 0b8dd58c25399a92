use std::sync::LazyLock;

use regex::Regex;

/// Matches `{{ env.VAR }}` and `{{ env.VAR | default("fallback") }}`
///
/// Group 1 is the scoped key, group 2 the optional default.
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{\{\s*([a-zA-Z0-9_.]+)\s*(?:\|\s*default\("([^"]*)"\))?\s*\}\}"#).expect("must be valid regex")
});

/// Failure while expanding configuration placeholders
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EnvExpansionError {
    /// Referenced variable is unset and has no default
    #[error("environment variable not found: `{0}`")]
    Missing(String),
    /// Placeholder used a scope other than `env.`
    #[error("only variables scoped with 'env.' are supported: `{0}`")]
    UnsupportedScope(String),
}

/// Expand `{{ env.VAR }}` placeholders in a raw TOML string
///
/// `{{ env.VAR | default("fallback") }}` substitutes the fallback when the
/// variable is unset. Lines starting with `#` are passed through unchanged
/// so commented-out secrets never have to resolve.
pub fn expand_env(input: &str) -> Result<String, EnvExpansionError> {
    let mut output = String::with_capacity(input.len());

    for (i, line) in input.lines().enumerate() {
        if i > 0 {
            output.push('\n');
        }

        if line.trim_start().starts_with('#') {
            output.push_str(line);
            continue;
        }

        let mut last_end = 0;

        for captures in PLACEHOLDER.captures_iter(line) {
            let (Some(overall), Some(key)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            let key = key.as_str();
            let default_value = captures.get(2).map(|m| m.as_str());

            output.push_str(&line[last_end..overall.start()]);

            let mut parts = key.split('.');
            match (parts.next(), parts.next(), parts.next()) {
                (Some("env"), Some(var_name), None) => match (std::env::var(var_name), default_value) {
                    (Ok(value), _) => output.push_str(&value),
                    (Err(_), Some(default)) => output.push_str(default),
                    (Err(_), None) => return Err(EnvExpansionError::Missing(var_name.to_owned())),
                },
                _ => return Err(EnvExpansionError::UnsupportedScope(key.to_owned())),
            }

            last_end = overall.end();
        }

        output.push_str(&line[last_end..]);
    }

    if input.ends_with('\n') {
        output.push('\n');
    }

    Ok(output)
}

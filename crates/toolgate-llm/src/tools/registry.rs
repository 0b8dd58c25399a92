use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;
use toolgate_config::ToolsConfig;

use super::builtins;
use super::handler::ToolHandler;
use crate::types::FunctionDefinition;

/// Functions the gateway executes itself, keyed by name
///
/// Populated at startup; reads vastly outnumber writes.
#[derive(Default)]
pub struct ToolRegistry {
    handlers: RwLock<IndexMap<String, Arc<dyn ToolHandler>>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in not listed in `tools.disabled`
    pub fn with_builtins(config: &ToolsConfig) -> Self {
        let registry = Self::new();

        for handler in builtins::builtin_handlers(config) {
            let name = handler.definition().name.clone();
            if config.disabled.contains(&name) {
                tracing::debug!(function = %name, "built-in disabled by configuration");
                continue;
            }
            registry.register(handler);
        }

        tracing::debug!(count = registry.len(), "registered built-in functions");
        registry
    }

    /// Add or replace a handler under its definition's name
    pub fn register(&self, handler: Arc<dyn ToolHandler>) {
        let name = handler.definition().name.clone();
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Definitions of every registered function, in registration order
    pub fn definitions(&self) -> Vec<FunctionDefinition> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|h| h.definition().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! Shared state for the route handlers

use std::sync::Arc;

use indexmap::IndexMap;
use toolgate_config::Config;
use toolgate_core::RequestContext;

use crate::backend::{self, CompletionBackend};
use crate::emulation::{Completion, EmulationEngine};
use crate::error::LlmError;
use crate::tools::{ToolExecutionEngine, ToolRegistry};
use crate::types::CompletionRequest;

/// Shared state for LLM route handlers
#[derive(Clone)]
pub struct LlmState {
    pub(crate) inner: Arc<LlmStateInner>,
}

pub(crate) struct LlmStateInner {
    pub(crate) backends: IndexMap<String, Arc<dyn CompletionBackend>>,
    pub(crate) default_backend: Option<String>,
    pub(crate) emulation: EmulationEngine,
    pub(crate) tools: Arc<ToolExecutionEngine>,
}

impl LlmState {
    /// Build state from configuration, constructing every backend and the
    /// built-in tool registry
    pub fn from_config(config: &Config) -> Result<Self, LlmError> {
        let mut backends = IndexMap::with_capacity(config.llm.backends.len());
        for (name, backend_config) in &config.llm.backends {
            backends.insert(name.clone(), backend::from_config(name, backend_config)?);
        }

        let registry = Arc::new(ToolRegistry::with_builtins(&config.tools));
        Ok(Self::new(
            backends,
            config.llm.default_backend_name().map(str::to_owned),
            registry,
            config,
        ))
    }

    /// Assemble state from already-built backends and registry
    pub fn new(
        backends: IndexMap<String, Arc<dyn CompletionBackend>>,
        default_backend: Option<String>,
        registry: Arc<ToolRegistry>,
        config: &Config,
    ) -> Self {
        let tools = Arc::new(ToolExecutionEngine::new(registry, &config.tools));
        let emulation = EmulationEngine::new(&config.emulation, Arc::clone(&tools));

        tracing::info!(
            backends = backends.len(),
            default_backend = default_backend.as_deref().unwrap_or("none"),
            tools = tools.registry().len(),
            "llm state initialized"
        );

        Self {
            inner: Arc::new(LlmStateInner {
                backends,
                default_backend,
                emulation,
                tools,
            }),
        }
    }

    /// Run a completion through the emulation engine
    pub async fn complete(&self, mut request: CompletionRequest, context: &RequestContext) -> Result<Completion, LlmError> {
        let (backend, model) = self.resolve_backend(&request.model)?;
        tracing::debug!(backend = backend.name(), model = %model, "resolved backend");

        request.model = model;
        self.inner.emulation.complete(backend.as_ref(), &request, context).await
    }

    /// Pick the backend for a requested model
    ///
    /// `name` or `name/model` selects backend `name`; anything else goes to
    /// the default backend with the model unchanged.
    pub fn resolve_backend(&self, model: &str) -> Result<(Arc<dyn CompletionBackend>, String), LlmError> {
        if let Some(backend) = self.inner.backends.get(model) {
            return Ok((Arc::clone(backend), model.to_owned()));
        }

        if let Some((name, rest)) = model.split_once('/')
            && let Some(backend) = self.inner.backends.get(name)
        {
            return Ok((Arc::clone(backend), rest.to_owned()));
        }

        let name = self.inner.default_backend.as_deref().unwrap_or_default();
        self.inner
            .backends
            .get(name)
            .map(|backend| (Arc::clone(backend), model.to_owned()))
            .ok_or_else(|| LlmError::BackendNotFound {
                backend: if name.is_empty() { model.to_owned() } else { name.to_owned() },
            })
    }

    pub fn backends(&self) -> impl Iterator<Item = &Arc<dyn CompletionBackend>> {
        self.inner.backends.values()
    }

    pub fn emulation(&self) -> &EmulationEngine {
        &self.inner.emulation
    }

    pub fn tools(&self) -> &ToolExecutionEngine {
        &self.inner.tools
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::backend::{BackendKind, BackendPayload, TextPayload, TextRequest};

    struct Named(&'static str);

    #[async_trait]
    impl CompletionBackend for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn kind(&self) -> BackendKind {
            BackendKind::Text
        }

        fn default_model(&self) -> Option<&str> {
            None
        }

        async fn complete(&self, _: &TextRequest, _: &RequestContext) -> Result<BackendPayload, LlmError> {
            Ok(BackendPayload::Text(TextPayload::new("ok")))
        }
    }

    fn state(default_backend: Option<&str>) -> LlmState {
        let mut backends: IndexMap<String, Arc<dyn CompletionBackend>> = IndexMap::new();
        backends.insert("local".to_owned(), Arc::new(Named("local")));
        backends.insert("remote".to_owned(), Arc::new(Named("remote")));

        LlmState::new(
            backends,
            default_backend.map(str::to_owned),
            Arc::new(ToolRegistry::new()),
            &Config::default(),
        )
    }

    #[test]
    fn backend_prefix_selects_backend() {
        let state = state(Some("local"));

        let (backend, model) = state.resolve_backend("remote/llama-3-8b").unwrap();
        assert_eq!(backend.name(), "remote");
        assert_eq!(model, "llama-3-8b");

        let (backend, model) = state.resolve_backend("remote").unwrap();
        assert_eq!(backend.name(), "remote");
        assert_eq!(model, "remote");
    }

    #[test]
    fn unknown_model_uses_default() {
        let state = state(Some("local"));

        let (backend, model) = state.resolve_backend("gpt-4o").unwrap();
        assert_eq!(backend.name(), "local");
        assert_eq!(model, "gpt-4o");
    }

    #[test]
    fn missing_default_is_not_found() {
        let state = state(None);
        assert!(matches!(
            state.resolve_backend("gpt-4o"),
            Err(LlmError::BackendNotFound { backend }) if backend == "gpt-4o"
        ));
    }
}

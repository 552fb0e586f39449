//! Ordered adapter chain with first-match resolution.

use super::{
    DynAdapter, HttpAdapterConfig, HuggingFaceAdapter, LocalRegistryAdapter, ModelScopeAdapter,
    PyTorchHubAdapter, SearchResult, TensorFlowHubAdapter,
};
use crate::config::AxonConfig;
use crate::{AxonError, Result};
use std::sync::Arc;
use tracing::{debug, warn};

/// Ordered collection of adapters.
///
/// Registration order is significant: `resolve` returns the first adapter
/// whose predicate accepts, so a catch-all adapter must be registered last.
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: Vec<DynAdapter>,
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("adapters", &self.names())
            .finish()
    }
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in adapters in their fixed order: local registry (when a URL is
    /// configured), PyTorch Hub, TensorFlow Hub, ModelScope, Hugging Face
    /// (when enabled).
    pub fn with_defaults(config: &AxonConfig) -> Result<Self> {
        let mut registry = Self::new();
        let timeout = config.request_timeout();

        if !config.registry.url.trim().is_empty() {
            let http = HttpAdapterConfig::new(config.registry.url.clone()).with_timeout(timeout);
            let local = LocalRegistryAdapter::new(http, config.registry.mirrors.clone())?
                .with_verify_checksums(config.download.verify_checksums);
            registry.register(Arc::new(local));
        }
        registry.register(Arc::new(PyTorchHubAdapter::new()?));
        registry.register(Arc::new(TensorFlowHubAdapter::new()?));
        registry.register(Arc::new(ModelScopeAdapter::new()?));
        if config.registry.enable_huggingface {
            let http = HttpAdapterConfig::new(crate::config::AdapterDefaults::HUGGINGFACE_BASE)
                .with_token(config.registry.huggingface_token.clone())
                .with_timeout(timeout);
            registry.register(Arc::new(HuggingFaceAdapter::with_config(http)?));
        }

        debug!("Registered default adapters: {:?}", registry.names());
        Ok(registry)
    }

    /// Append an adapter. Duplicates are kept.
    pub fn register(&mut self, adapter: DynAdapter) {
        self.adapters.push(adapter);
    }

    /// First adapter, in registration order, that accepts `namespace/name`.
    pub fn resolve(&self, namespace: &str, name: &str) -> Result<DynAdapter> {
        self.adapters
            .iter()
            .find(|a| a.can_handle(namespace, name))
            .cloned()
            .ok_or_else(|| AxonError::AdapterNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    pub fn get_by_name(&self, name: &str) -> Option<DynAdapter> {
        self.adapters.iter().find(|a| a.name() == name).cloned()
    }

    pub fn adapters(&self) -> &[DynAdapter] {
        &self.adapters
    }

    pub fn names(&self) -> Vec<String> {
        self.adapters.iter().map(|a| a.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Search every adapter in order. A failing adapter is logged and skipped.
    pub async fn search_all(&self, query: &str) -> Vec<SearchResult> {
        let mut results = Vec::new();
        for adapter in &self.adapters {
            match adapter.search(query).await {
                Ok(hits) => {
                    debug!("{} returned {} results for '{}'", adapter.name(), hits.len(), query);
                    results.extend(hits);
                }
                Err(e) => warn!("Search on {} failed: {}", adapter.name(), e),
            }
        }
        results
    }
}

impl FromIterator<DynAdapter> for AdapterRegistry {
    fn from_iter<I: IntoIterator<Item = DynAdapter>>(iter: I) -> Self {
        Self {
            adapters: iter.into_iter().collect(),
        }
    }
}

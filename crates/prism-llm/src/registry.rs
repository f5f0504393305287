//! Provider registry and model routing

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use indexmap::IndexMap;

use crate::error::GatewayError;
use crate::provider::Provider;

/// Shared registry mapping model names to provider instances
///
/// Reads (lookup, list) run concurrently; writes (register, unregister,
/// route changes, table swap) are exclusive. Routing precedence for a
/// model: an explicit route to a still-registered provider, then the
/// first registered provider whose predicate matches, then an error.
#[derive(Default)]
pub struct ProviderRegistry {
    inner: RwLock<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    /// Providers in registration order; order decides predicate fallback
    providers: IndexMap<String, Arc<dyn Provider>>,
    /// Explicit model name -> provider name routes
    routes: HashMap<String, String>,
}

impl ProviderRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its name, replacing any previous instance
    pub fn register(&self, provider: Arc<dyn Provider>) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.providers.insert(provider.name().to_owned(), provider);
    }

    /// Remove a provider and every route pointing at it
    ///
    /// Returns whether the provider was registered.
    pub fn unregister(&self, name: &str) -> bool {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        let removed = inner.providers.shift_remove(name).is_some();
        if removed {
            inner.routes.retain(|_, target| target != name);
        }
        removed
    }

    /// Route a model name to a named provider
    ///
    /// # Errors
    ///
    /// `GatewayError::ProviderNotFound` when the provider is not registered
    pub fn map_model(&self, model: impl Into<String>, provider: &str) -> Result<(), GatewayError> {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        if !inner.providers.contains_key(provider) {
            return Err(GatewayError::ProviderNotFound {
                provider: provider.to_owned(),
            });
        }
        inner.routes.insert(model.into(), provider.to_owned());
        Ok(())
    }

    /// Remove an explicit route
    pub fn unmap_model(&self, model: &str) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.routes.remove(model);
    }

    /// Look up a provider by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.providers.get(name).cloned()
    }

    /// Registered provider names, in registration order
    pub fn provider_names(&self) -> Vec<String> {
        let inner = self.inner.read().expect("registry lock poisoned");
        inner.providers.keys().cloned().collect()
    }

    /// Resolve the provider serving a model
    ///
    /// # Errors
    ///
    /// `GatewayError::NoProvider` when no route or predicate matches
    pub fn provider_for_model(&self, model: &str) -> Result<Arc<dyn Provider>, GatewayError> {
        let inner = self.inner.read().expect("registry lock poisoned");

        if let Some(target) = inner.routes.get(model)
            && let Some(provider) = inner.providers.get(target)
        {
            return Ok(Arc::clone(provider));
        }

        inner
            .providers
            .values()
            .find(|provider| provider.supports_model(model))
            .cloned()
            .ok_or_else(|| GatewayError::NoProvider {
                model: model.to_owned(),
            })
    }

    /// Replace the whole provider table and route set in one swap
    ///
    /// Used by configuration reloads so readers never observe a
    /// half-applied state.
    pub fn replace_all(&self, providers: Vec<Arc<dyn Provider>>, routes: HashMap<String, String>) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner.providers = providers
            .into_iter()
            .map(|provider| (provider.name().to_owned(), provider))
            .collect();
        inner.routes = routes;
    }
}

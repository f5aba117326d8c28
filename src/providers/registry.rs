//! Provider registry
//!
//! A lookup table from provider name to backend. The three well-known backends
//! are registered at construction; hosts may register more under other names.
//! Selecting the active backend is delegated to the execution context, and a
//! selection naming an unregistered provider falls back to the remote node.

use super::{Provider, ProviderKind};
use crate::context::ExecutionContext;
use dashmap::DashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

pub struct ProviderRegistry {
    providers: DashMap<String, Arc<dyn Provider>>,
    /// Remote-node backend, used whenever the selection misses
    fallback: RwLock<Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new(
        simulated: Arc<dyn Provider>,
        injected: Arc<dyn Provider>,
        remote_node: Arc<dyn Provider>,
    ) -> Self {
        let providers = DashMap::new();
        providers.insert(ProviderKind::Simulated.name().to_string(), simulated);
        providers.insert(ProviderKind::Injected.name().to_string(), injected);
        providers.insert(
            ProviderKind::RemoteNode.name().to_string(),
            remote_node.clone(),
        );
        Self {
            providers,
            fallback: RwLock::new(remote_node),
        }
    }

    /// Register (or replace) a provider under `name`
    pub fn register(&self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        let name = name.into();
        if name == ProviderKind::RemoteNode.name() {
            *self.fallback.write().unwrap_or_else(PoisonError::into_inner) = provider.clone();
        }
        debug!(provider = %name, kind = %provider.kind(), "Registered provider");
        self.providers.insert(name, provider);
    }

    /// Remove a host-registered provider; the well-known names stay registered
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Provider>> {
        if ProviderKind::from_name(name).is_some() {
            warn!(provider = name, "Refusing to unregister a well-known provider");
            return None;
        }
        self.providers.remove(name).map(|(_, provider)| provider)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).map(|entry| entry.value().clone())
    }

    /// The provider currently selected by `context`
    ///
    /// Never fails: an unregistered selection resolves to the remote node.
    pub fn active(&self, context: &dyn ExecutionContext) -> Arc<dyn Provider> {
        let name = context.active_provider_name();
        match self.get(&name) {
            Some(provider) => provider,
            None => {
                warn!(
                    provider = %name,
                    "Selected provider is not registered, falling back to remote-node"
                );
                self.fallback
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone()
            }
        }
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .providers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }
}

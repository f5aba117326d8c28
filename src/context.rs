//! Session defaults and execution-context selection
//!
//! [`TransactionContext`] supplies per-session defaults the resolvers fall back
//! on. [`ExecutionContext`] decides which backend is active and announces
//! selection changes.

use crate::providers::{NetworkInfo, Provider, ProviderRegistry};
use crate::Result;
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::info;

/// Per-session transaction defaults
///
/// Each accessor returning `None` means the session exposes no such default.
/// The pipeline only ever reads a context.
pub trait TransactionContext: Send + Sync {
    fn gas_limit(&self) -> Option<u64> {
        None
    }

    fn value(&self) -> Option<U256> {
        None
    }

    fn default_from(&self) -> Option<Address> {
        None
    }
}

/// A session with no defaults at all
impl TransactionContext for () {}

/// Configurable session defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDefaults {
    #[serde(default)]
    pub gas_limit: Option<u64>,
    #[serde(default)]
    pub value: Option<U256>,
    #[serde(default)]
    pub from: Option<Address>,
}

impl TransactionContext for SessionDefaults {
    fn gas_limit(&self) -> Option<u64> {
        self.gas_limit
    }

    fn value(&self) -> Option<U256> {
        self.value
    }

    fn default_from(&self) -> Option<Address> {
        self.from
    }
}

/// Notifications published by an execution context
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ContextEvent {
    ContextChanged { provider: String },
    ProviderAdded { name: String },
    ProviderRemoved { name: String },
}

/// Selects the active backend and detects the network it is connected to
#[async_trait]
pub trait ExecutionContext: Send + Sync {
    async fn detect_network(&self) -> Result<NetworkInfo>;

    fn active_provider_name(&self) -> String;

    fn is_simulated(&self) -> bool;

    fn subscribe(&self) -> broadcast::Receiver<ContextEvent>;
}

/// In-process execution context
///
/// The selection is single-writer: only [`select`](Self::select) changes it,
/// and every change is announced as [`ContextEvent::ContextChanged`].
pub struct LocalExecutionContext {
    registry: Arc<ProviderRegistry>,
    selected: watch::Sender<String>,
    events: broadcast::Sender<ContextEvent>,
}

impl LocalExecutionContext {
    pub fn new(registry: Arc<ProviderRegistry>, initial: impl Into<String>) -> Self {
        let (selected, _) = watch::channel(initial.into());
        let (events, _) = broadcast::channel(64);
        Self {
            registry,
            selected,
            events,
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Switch the active provider
    pub fn select(&self, name: impl Into<String>) {
        let name = name.into();
        let previous = self.selected.send_replace(name.clone());
        if previous != name {
            info!(from = %previous, to = %name, "Execution context changed");
            let _ = self
                .events
                .send(ContextEvent::ContextChanged { provider: name });
        }
    }

    pub fn add_provider(&self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        let name = name.into();
        self.registry.register(name.clone(), provider);
        let _ = self.events.send(ContextEvent::ProviderAdded { name });
    }

    pub fn remove_provider(&self, name: &str) -> bool {
        let removed = self.registry.unregister(name).is_some();
        if removed {
            let _ = self.events.send(ContextEvent::ProviderRemoved {
                name: name.to_string(),
            });
        }
        removed
    }
}

#[async_trait]
impl ExecutionContext for LocalExecutionContext {
    async fn detect_network(&self) -> Result<NetworkInfo> {
        self.registry.active(self).network().await
    }

    fn active_provider_name(&self) -> String {
        self.selected.borrow().clone()
    }

    fn is_simulated(&self) -> bool {
        self.registry.active(self).kind().is_simulated()
    }

    fn subscribe(&self) -> broadcast::Receiver<ContextEvent> {
        self.events.subscribe()
    }
}

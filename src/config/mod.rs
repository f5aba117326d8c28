//! Configuration for transaction orchestration

pub mod rpc;

use crate::context::SessionDefaults;
use crate::deploy::DEFAULT_MAX_LINK_DEPTH;
use crate::pipeline::{SenderFallback, DEFAULT_EVENT_CAPACITY};
use crate::providers::ProviderKind;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

// Re-export RPC config
pub use rpc::RpcConfig;

/// Pre-funded accounts of the simulated backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedConfig {
    pub accounts: usize,
    /// Initial balance per account, in ether
    pub initial_ether: u64,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            accounts: 10,
            initial_ether: 100,
        }
    }
}

fn default_provider() -> String {
    ProviderKind::RemoteNode.name().to_string()
}

fn default_max_link_depth() -> usize {
    DEFAULT_MAX_LINK_DEPTH
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Provider selected at startup
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub rpc: RpcConfig,
    /// Session defaults applied to every submission
    #[serde(default)]
    pub defaults: SessionDefaults,
    #[serde(default)]
    pub simulated: SimulatedConfig,
    /// Behavior when account lookup fails unexpectedly
    #[serde(default)]
    pub sender_fallback: SenderFallback,
    /// Recursion limit for library linking
    #[serde(default = "default_max_link_depth")]
    pub max_link_depth: usize,
    /// Buffer of the pipeline notification channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Path to audit log file
    #[serde(default)]
    pub audit_log_path: Option<String>,
}

impl Config {
    /// Load a JSON config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            rpc: RpcConfig::default(),
            defaults: SessionDefaults::default(),
            simulated: SimulatedConfig::default(),
            sender_fallback: SenderFallback::default(),
            max_link_depth: DEFAULT_MAX_LINK_DEPTH,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            audit_log_path: None,
        }
    }
}

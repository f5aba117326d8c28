//! RPC endpoint configuration
//!
//! Endpoints are resolved from the environment, falling back to a local node:
//!
//! ```bash
//! export REMOTE_NODE_RPC_URL="https://sepolia.infura.io/v3/YOUR_KEY"
//! export INJECTED_RPC_URL="http://127.0.0.1:8545"
//! # Private key of the injected signing agent (optional)
//! export INJECTED_SIGNER_KEY="0x..."
//! ```

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// Environment variable names
pub mod env_vars {
    pub const REMOTE_NODE_RPC_URL: &str = "REMOTE_NODE_RPC_URL";
    pub const INJECTED_RPC_URL: &str = "INJECTED_RPC_URL";
    pub const INJECTED_SIGNER_KEY: &str = "INJECTED_SIGNER_KEY";
}

/// Local development node
pub const LOCAL_NODE_URL: &str = "http://127.0.0.1:8545";

/// RPC endpoints of the node-backed providers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_url")]
    pub remote_node_url: String,
    #[serde(default = "default_url")]
    pub injected_url: String,
    /// Variable holding the injected agent's private key; the key itself is
    /// never stored in configuration
    #[serde(default = "default_signer_key_env")]
    pub signer_key_env: String,
}

fn default_url() -> String {
    LOCAL_NODE_URL.to_string()
}

fn default_signer_key_env() -> String {
    env_vars::INJECTED_SIGNER_KEY.to_string()
}

impl RpcConfig {
    /// Create RPC config from environment variables
    pub fn from_env() -> Self {
        let remote_node_url = std::env::var(env_vars::REMOTE_NODE_RPC_URL).unwrap_or_else(|_| {
            tracing::warn!("REMOTE_NODE_RPC_URL not set, using local node");
            default_url()
        });
        let injected_url = std::env::var(env_vars::INJECTED_RPC_URL).unwrap_or_else(|_| {
            tracing::debug!("INJECTED_RPC_URL not set, using local node");
            default_url()
        });

        Self {
            remote_node_url,
            injected_url,
            signer_key_env: default_signer_key_env(),
        }
    }

    /// Create with explicit RPC URLs
    pub fn with_urls(remote_node_url: impl Into<String>, injected_url: impl Into<String>) -> Self {
        Self {
            remote_node_url: remote_node_url.into(),
            injected_url: injected_url.into(),
            signer_key_env: default_signer_key_env(),
        }
    }

    /// The injected agent's private key, if one is set
    pub fn signer_key(&self) -> Option<SecretString> {
        std::env::var(&self.signer_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .map(SecretString::from)
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

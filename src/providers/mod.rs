//! Execution backends
//!
//! Every backend implements the [`Provider`] capability set. The pipeline never
//! inspects a backend's concrete type; it asks the [`ProviderRegistry`] for the
//! active provider and branches on [`ProviderKind`] where result shapes differ.

mod registry;
mod rpc;
mod simulated;

pub use registry::ProviderRegistry;
pub use rpc::{InjectedProvider, RemoteNodeProvider};
pub use simulated::{PlainTransferExecutor, SimulatedProvider, VmExecutor, VmOutcome};

use crate::transaction::NormalizedTransaction;
use crate::units::format_ether;
use crate::Result;
use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The three well-known backend kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    Simulated,
    Injected,
    RemoteNode,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::Simulated,
        ProviderKind::Injected,
        ProviderKind::RemoteNode,
    ];

    /// Registry name of the kind
    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::Simulated => "simulated",
            ProviderKind::Injected => "injected",
            ProviderKind::RemoteNode => "remote-node",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self, ProviderKind::Simulated)
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Network identity as reported by network detection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub id: String,
    pub name: String,
}

impl NetworkInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Name a network by its chain ID
    pub fn from_chain_id(chain_id: u64) -> Self {
        let name = match chain_id {
            1 => "Main",
            3 => "Ropsten",
            4 => "Rinkeby",
            5 => "Goerli",
            42 => "Kovan",
            11155111 => "Sepolia",
            _ => "Custom",
        };
        Self::new(chain_id.to_string(), name)
    }

    /// The production network, where raw sends are refused
    pub fn is_mainnet(&self) -> bool {
        self.id == "1" && self.name == "Main"
    }
}

/// Receipt fields the pipeline cares about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub transaction_hash: B256,
    /// `false` when the transaction reverted on-chain
    pub status: bool,
    pub contract_address: Option<Address>,
    pub gas_used: u64,
    pub block_number: Option<u64>,
}

/// Raw result of one dispatch, as produced by a backend
///
/// The simulated-only fields (`created_address`, `exec_error`, `return_value`)
/// may be populated alongside a receipt; only the classifier decides which of
/// them is meaningful for a given backend kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawExecutionResult {
    pub transaction_hash: Option<B256>,
    pub receipt: Option<TxReceipt>,
    pub created_address: Option<Address>,
    /// Execution-level failure reported by the simulated VM
    pub exec_error: Option<String>,
    pub return_value: Option<Bytes>,
    /// Output of a read-only query against a node
    pub call_output: Option<Bytes>,
}

/// A message signature and the EIP-191 hash that was signed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMessage {
    pub message_hash: B256,
    pub signature: Bytes,
}

/// Capability set implemented once per backend kind
///
/// Every operation is asynchronous and reports failure through its `Result`.
#[async_trait]
pub trait Provider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn accounts(&self) -> Result<Vec<Address>>;

    /// Whether `address` belongs to this backend's own account set
    async fn has_account(&self, _address: Address) -> Result<bool> {
        Ok(true)
    }

    /// Current gas price in wei
    async fn gas_price(&self) -> Result<u128>;

    async fn network(&self) -> Result<NetworkInfo>;

    async fn estimate_gas(&self, tx: &NormalizedTransaction) -> Result<u64>;

    /// Submission primitive: execute or broadcast `tx`, or query it when `use_call`
    async fn send(&self, tx: &NormalizedTransaction) -> Result<RawExecutionResult>;

    async fn sign_message(&self, account: Address, message: &[u8]) -> Result<SignedMessage>;

    async fn reset_environment(&self) -> Result<()>;

    async fn new_account(&self) -> Result<Address>;

    /// Balance in wei
    async fn balance(&self, address: Address) -> Result<U256>;

    async fn balance_in_ether(&self, address: Address) -> Result<String> {
        Ok(format_ether(self.balance(address).await?))
    }
}

//! JSON-RPC backed providers
//!
//! `RemoteNodeProvider` talks to a node that holds its own accounts.
//! `InjectedProvider` is a user-controlled signing agent: transactions are
//! signed locally by a [`SecureWallet`] and broadcast through the node.

use super::{NetworkInfo, Provider, ProviderKind, RawExecutionResult, SignedMessage, TxReceipt};
use crate::transaction::NormalizedTransaction;
use crate::wallet::SecureWallet;
use crate::{Error, Result};
use alloy::hex;
use alloy::primitives::{eip191_hash_message, Address, Bytes, U256};
use alloy::providers::{DynProvider, Provider as RpcProvider, ProviderBuilder};
use alloy::rpc::types::TransactionReceipt;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

fn parse_url(endpoint: &str) -> Result<url::Url> {
    endpoint
        .parse()
        .map_err(|e| Error::Config(format!("Invalid RPC URL {}: {}", endpoint, e)))
}

/// Shared JSON-RPC plumbing for node-backed providers
struct RpcBackend {
    provider: DynProvider,
    endpoint: String,
}

impl RpcBackend {
    fn connect(endpoint: &str) -> Result<Self> {
        let provider = ProviderBuilder::new()
            .connect_http(parse_url(endpoint)?)
            .erased();
        Ok(Self {
            provider,
            endpoint: endpoint.to_string(),
        })
    }

    fn connect_with_wallet(endpoint: &str, wallet: &SecureWallet) -> Result<Self> {
        let provider = ProviderBuilder::new()
            .wallet(wallet.wallet().clone())
            .connect_http(parse_url(endpoint)?)
            .erased();
        Ok(Self {
            provider,
            endpoint: endpoint.to_string(),
        })
    }

    async fn gas_price(&self) -> Result<u128> {
        self.provider.get_gas_price().await.map_err(Error::provider)
    }

    async fn network(&self) -> Result<NetworkInfo> {
        let chain_id = self.provider.get_chain_id().await.map_err(Error::provider)?;
        Ok(NetworkInfo::from_chain_id(chain_id))
    }

    async fn estimate_gas(&self, tx: &NormalizedTransaction) -> Result<u64> {
        self.provider
            .estimate_gas(tx.to_request())
            .await
            .map_err(|e| Error::Provider(parse_revert_reason(&e.to_string())))
    }

    async fn send(&self, tx: &NormalizedTransaction) -> Result<RawExecutionResult> {
        if tx.use_call {
            let output = self
                .provider
                .call(tx.to_request())
                .await
                .map_err(|e| Error::Provider(parse_revert_reason(&e.to_string())))?;
            return Ok(RawExecutionResult {
                call_output: Some(output),
                ..Default::default()
            });
        }

        let pending = self
            .provider
            .send_transaction(tx.to_request())
            .await
            .map_err(Error::provider)?;
        let transaction_hash = *pending.tx_hash();
        debug!(endpoint = %self.endpoint, tx_hash = %transaction_hash, "Transaction submitted, awaiting receipt");

        let receipt = pending.get_receipt().await.map_err(Error::provider)?;
        Ok(RawExecutionResult {
            transaction_hash: Some(transaction_hash),
            receipt: Some(receipt_fields(&receipt)),
            ..Default::default()
        })
    }

    async fn balance(&self, address: Address) -> Result<U256> {
        self.provider
            .get_balance(address)
            .await
            .map_err(Error::provider)
    }
}

fn receipt_fields(receipt: &TransactionReceipt) -> TxReceipt {
    TxReceipt {
        transaction_hash: receipt.transaction_hash,
        status: receipt.status(),
        contract_address: receipt.contract_address,
        gas_used: receipt.gas_used,
        block_number: receipt.block_number,
    }
}

/// Extract a revert reason from a node's error message
fn parse_revert_reason(error: &str) -> String {
    if error.contains("execution reverted") {
        if let Some(start) = error.find("revert: ") {
            let reason = &error[start + 8..];
            if let Some(end) = reason.find('"') {
                return reason[..end].to_string();
            }
            return reason.to_string();
        }
        if let Some(start) = error.find("0x") {
            let hex_data = &error[start..];
            let end = hex_data
                .find(|c: char| !c.is_ascii_hexdigit() && c != 'x')
                .unwrap_or(hex_data.len());
            let data = &hex_data[..end];
            // Error(string) selector
            if data.starts_with("0x08c379a0") && data.len() > 138 {
                if let Ok(decoded) = hex::decode(&data[138..]) {
                    let filtered: Vec<u8> = decoded.into_iter().filter(|&b| b != 0).collect();
                    if let Ok(s) = String::from_utf8(filtered) {
                        return s;
                    }
                }
            }
            return format!("Reverted with data: {}", data);
        }
        return "execution reverted".to_string();
    }

    error.to_string()
}

/// Provider backed by a remote node's own accounts
pub struct RemoteNodeProvider {
    rpc: RpcBackend,
}

impl RemoteNodeProvider {
    pub fn connect(endpoint: &str) -> Result<Self> {
        info!(endpoint, "Configured remote node provider");
        Ok(Self {
            rpc: RpcBackend::connect(endpoint)?,
        })
    }
}

#[async_trait]
impl Provider for RemoteNodeProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::RemoteNode
    }

    async fn accounts(&self) -> Result<Vec<Address>> {
        self.rpc
            .provider
            .get_accounts()
            .await
            .map_err(Error::provider)
    }

    async fn gas_price(&self) -> Result<u128> {
        self.rpc.gas_price().await
    }

    async fn network(&self) -> Result<NetworkInfo> {
        self.rpc.network().await
    }

    async fn estimate_gas(&self, tx: &NormalizedTransaction) -> Result<u64> {
        self.rpc.estimate_gas(tx).await
    }

    async fn send(&self, tx: &NormalizedTransaction) -> Result<RawExecutionResult> {
        self.rpc.send(tx).await
    }

    async fn sign_message(&self, account: Address, message: &[u8]) -> Result<SignedMessage> {
        let signature: Bytes = self
            .rpc
            .provider
            .raw_request(
                "eth_sign".into(),
                (account, Bytes::copy_from_slice(message)),
            )
            .await
            .map_err(Error::provider)?;
        Ok(SignedMessage {
            message_hash: eip191_hash_message(message),
            signature,
        })
    }

    async fn reset_environment(&self) -> Result<()> {
        Ok(())
    }

    /// Ask the node to create an account with an empty passphrase
    async fn new_account(&self) -> Result<Address> {
        let address: Address = self
            .rpc
            .provider
            .raw_request("personal_newAccount".into(), ("",))
            .await
            .map_err(Error::provider)?;
        info!(%address, endpoint = %self.rpc.endpoint, "Created node account");
        Ok(address)
    }

    async fn balance(&self, address: Address) -> Result<U256> {
        self.rpc.balance(address).await
    }
}

/// Provider for a user-controlled signing agent
pub struct InjectedProvider {
    rpc: RpcBackend,
    wallet: Option<Arc<SecureWallet>>,
}

impl InjectedProvider {
    /// Connect a signing agent; without a wallet it exposes no accounts
    pub fn connect(endpoint: &str, wallet: Option<Arc<SecureWallet>>) -> Result<Self> {
        let rpc = match wallet.as_deref() {
            Some(wallet) => RpcBackend::connect_with_wallet(endpoint, wallet)?,
            None => RpcBackend::connect(endpoint)?,
        };
        info!(
            endpoint,
            signer = ?wallet.as_ref().map(|w| w.address()),
            "Configured injected provider"
        );
        Ok(Self { rpc, wallet })
    }

    fn signer(&self) -> Result<&SecureWallet> {
        self.wallet
            .as_deref()
            .ok_or_else(|| Error::Wallet("No signing agent connected".to_string()))
    }
}

#[async_trait]
impl Provider for InjectedProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Injected
    }

    async fn accounts(&self) -> Result<Vec<Address>> {
        Ok(self.wallet.iter().map(|w| w.address()).collect())
    }

    async fn gas_price(&self) -> Result<u128> {
        self.rpc.gas_price().await
    }

    async fn network(&self) -> Result<NetworkInfo> {
        self.rpc.network().await
    }

    async fn estimate_gas(&self, tx: &NormalizedTransaction) -> Result<u64> {
        self.rpc.estimate_gas(tx).await
    }

    async fn send(&self, tx: &NormalizedTransaction) -> Result<RawExecutionResult> {
        if !tx.use_call {
            self.signer()?;
        }
        self.rpc.send(tx).await
    }

    async fn sign_message(&self, account: Address, message: &[u8]) -> Result<SignedMessage> {
        let signer = self.signer()?;
        if signer.address() != account {
            return Err(Error::InvalidAccountSelected(account.to_string()));
        }
        signer.sign_message(message)
    }

    async fn reset_environment(&self) -> Result<()> {
        Ok(())
    }

    async fn new_account(&self) -> Result<Address> {
        Err(Error::Unsupported {
            provider: ProviderKind::Injected.name(),
            operation: "new_account",
        })
    }

    async fn balance(&self, address: Address) -> Result<U256> {
        self.rpc.balance(address).await
    }
}

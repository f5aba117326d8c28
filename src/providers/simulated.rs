//! In-process simulated ledger backend
//!
//! The provider owns a book of locally generated, pre-funded accounts. Executing
//! a transaction is delegated to a [`VmExecutor`]; the provider only tracks
//! accounts, balances and transaction hashes around it.

use super::{NetworkInfo, Provider, ProviderKind, RawExecutionResult, SignedMessage, TxReceipt};
use crate::transaction::NormalizedTransaction;
use crate::units::ether;
use crate::wallet::SecureWallet;
use crate::{Error, Result};
use alloy::primitives::{keccak256, Address, Bytes, U256};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Gas price reported by the simulated ledger (1 gwei)
pub const SIMULATED_GAS_PRICE: u128 = 1_000_000_000;

/// Intrinsic gas of a plain value transfer
const TRANSFER_GAS: u64 = 21_000;

/// What the VM reports after executing one transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VmOutcome {
    /// Execution-level exception (revert, invalid opcode, out of gas)
    pub exception: Option<String>,
    /// Receipt status; `false` for a zero-status receipt
    pub status: bool,
    pub created_address: Option<Address>,
    pub return_value: Bytes,
    pub gas_used: u64,
}

impl VmOutcome {
    pub fn success(return_value: Bytes, gas_used: u64) -> Self {
        Self {
            status: true,
            return_value,
            gas_used,
            ..Default::default()
        }
    }

    pub fn created(address: Address, gas_used: u64) -> Self {
        Self {
            status: true,
            created_address: Some(address),
            gas_used,
            ..Default::default()
        }
    }

    pub fn exception(message: impl Into<String>, gas_used: u64) -> Self {
        Self {
            exception: Some(message.into()),
            gas_used,
            ..Default::default()
        }
    }
}

/// Execution semantics of the simulated ledger
#[async_trait]
pub trait VmExecutor: Send + Sync {
    async fn execute(&self, tx: &NormalizedTransaction) -> Result<VmOutcome>;

    async fn estimate_gas(&self, tx: &NormalizedTransaction) -> Result<u64> {
        let outcome = self.execute(&as_query(tx)).await?;
        match outcome.exception {
            Some(message) => Err(Error::ExecutionReverted(message)),
            None => Ok(outcome.gas_used),
        }
    }

    async fn reset(&self) -> Result<()> {
        Ok(())
    }
}

fn as_query(tx: &NormalizedTransaction) -> NormalizedTransaction {
    NormalizedTransaction {
        use_call: true,
        ..tx.clone()
    }
}

/// Executor that only understands plain value transfers
///
/// Anything carrying calldata or creation bytecode is reported as an execution
/// exception. Hosts that need contract execution plug in a real VM.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTransferExecutor;

#[async_trait]
impl VmExecutor for PlainTransferExecutor {
    async fn execute(&self, tx: &NormalizedTransaction) -> Result<VmOutcome> {
        if tx.to.is_none() || !tx.data.is_empty() {
            return Ok(VmOutcome::exception(
                "contract execution is not available on this ledger",
                TRANSFER_GAS,
            ));
        }
        Ok(VmOutcome::success(Bytes::new(), TRANSFER_GAS))
    }
}

struct SimulatedAccount {
    wallet: SecureWallet,
    balance: U256,
}

#[derive(Default)]
struct AccountBook {
    order: Vec<Address>,
    accounts: HashMap<Address, SimulatedAccount>,
}

impl AccountBook {
    fn funded(count: usize, balance: U256) -> Self {
        let mut book = Self::default();
        for _ in 0..count {
            book.insert(SecureWallet::random(), balance);
        }
        book
    }

    fn insert(&mut self, wallet: SecureWallet, balance: U256) -> Address {
        let address = wallet.address();
        self.order.push(address);
        self.accounts
            .insert(address, SimulatedAccount { wallet, balance });
        address
    }

    /// Apply a value transfer; debits the sender only when it is ours
    fn transfer(&mut self, from: Option<Address>, to: Address, value: U256) -> Result<()> {
        if value.is_zero() {
            return Ok(());
        }
        if let Some(sender) = from.and_then(|from| self.accounts.get_mut(&from)) {
            if sender.balance < value {
                return Err(Error::ExecutionReverted(
                    "insufficient balance for transfer".to_string(),
                ));
            }
            sender.balance -= value;
        }
        if let Some(recipient) = self.accounts.get_mut(&to) {
            recipient.balance += value;
        }
        Ok(())
    }
}

/// Simulated ledger provider
pub struct SimulatedProvider {
    executor: Arc<dyn VmExecutor>,
    book: RwLock<AccountBook>,
    account_count: usize,
    initial_balance: U256,
    nonce: AtomicU64,
}

impl SimulatedProvider {
    /// Create a ledger with `account_count` accounts holding `initial_ether` each
    pub fn new(executor: Arc<dyn VmExecutor>, account_count: usize, initial_ether: u64) -> Self {
        let initial_balance = ether(initial_ether);
        Self {
            executor,
            book: RwLock::new(AccountBook::funded(account_count, initial_balance)),
            account_count,
            initial_balance,
            nonce: AtomicU64::new(0),
        }
    }

    fn next_hash(&self, tx: &NormalizedTransaction) -> alloy::primitives::B256 {
        let nonce = self.nonce.fetch_add(1, Ordering::Relaxed);
        let mut preimage = Vec::with_capacity(20 + 8 + tx.data.len());
        preimage.extend_from_slice(tx.from.address().unwrap_or_default().as_slice());
        preimage.extend_from_slice(&nonce.to_be_bytes());
        preimage.extend_from_slice(&tx.data);
        keccak256(preimage)
    }
}

#[async_trait]
impl Provider for SimulatedProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Simulated
    }

    async fn accounts(&self) -> Result<Vec<Address>> {
        Ok(self.book.read().await.order.clone())
    }

    async fn has_account(&self, address: Address) -> Result<bool> {
        Ok(self.book.read().await.accounts.contains_key(&address))
    }

    async fn gas_price(&self) -> Result<u128> {
        Ok(SIMULATED_GAS_PRICE)
    }

    async fn network(&self) -> Result<NetworkInfo> {
        Ok(NetworkInfo::new("vm", "VM"))
    }

    async fn estimate_gas(&self, tx: &NormalizedTransaction) -> Result<u64> {
        self.executor.estimate_gas(tx).await
    }

    async fn send(&self, tx: &NormalizedTransaction) -> Result<RawExecutionResult> {
        let outcome = self.executor.execute(tx).await?;
        debug!(
            gas_used = outcome.gas_used,
            status = outcome.status,
            exception = ?outcome.exception,
            "Simulated execution finished"
        );

        if tx.use_call {
            return Ok(RawExecutionResult {
                exec_error: outcome.exception,
                return_value: Some(outcome.return_value),
                ..Default::default()
            });
        }

        if outcome.exception.is_none() && outcome.status {
            if let Some(to) = tx.to.or(outcome.created_address) {
                self.book
                    .write()
                    .await
                    .transfer(tx.from.address(), to, tx.value)?;
            }
        }

        let transaction_hash = self.next_hash(tx);
        let status = outcome.status && outcome.exception.is_none();
        Ok(RawExecutionResult {
            transaction_hash: Some(transaction_hash),
            receipt: Some(TxReceipt {
                transaction_hash,
                status,
                contract_address: outcome.created_address,
                gas_used: outcome.gas_used,
                block_number: None,
            }),
            created_address: outcome.created_address,
            exec_error: outcome.exception,
            return_value: Some(outcome.return_value),
            call_output: None,
        })
    }

    async fn sign_message(&self, account: Address, message: &[u8]) -> Result<SignedMessage> {
        let book = self.book.read().await;
        let entry = book
            .accounts
            .get(&account)
            .ok_or_else(|| Error::InvalidAccountSelected(account.to_string()))?;
        entry.wallet.sign_message(message)
    }

    async fn reset_environment(&self) -> Result<()> {
        self.executor.reset().await?;
        *self.book.write().await = AccountBook::funded(self.account_count, self.initial_balance);
        self.nonce.store(0, Ordering::Relaxed);
        info!(accounts = self.account_count, "Simulated environment reset");
        Ok(())
    }

    async fn new_account(&self) -> Result<Address> {
        let address = self
            .book
            .write()
            .await
            .insert(SecureWallet::random(), self.initial_balance);
        info!(%address, "Created simulated account");
        Ok(address)
    }

    async fn balance(&self, address: Address) -> Result<U256> {
        Ok(self
            .book
            .read()
            .await
            .accounts
            .get(&address)
            .map(|account| account.balance)
            .unwrap_or_default())
    }
}

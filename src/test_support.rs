//! Scripted backends and hooks shared by unit tests

use crate::context::LocalExecutionContext;
use crate::pipeline::{ConfirmationHooks, Decision, TransactionPipeline};
use crate::providers::{
    NetworkInfo, Provider, ProviderKind, ProviderRegistry, RawExecutionResult, SignedMessage,
    TxReceipt, VmExecutor, VmOutcome,
};
use crate::transaction::{NormalizedTransaction, Sender};
use crate::{Error, Result};
use alloy::primitives::{address, keccak256, Address, Bytes, U256};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub(crate) const DEFAULT_ACCOUNT: Address = address!("f39fd6e51aad88f6f4ce6ab8827279cfffb92266");

type Scripted<T> = std::result::Result<T, String>;

/// Provider whose every answer is fixed up front
///
/// Unless a result is queued or fixed, the n-th dispatch succeeds and, for a
/// creation, reports `Address::with_last_byte(n)` as the created contract.
pub(crate) struct ScriptedProvider {
    kind: ProviderKind,
    accounts: Scripted<Vec<Address>>,
    known_accounts: bool,
    gas_price: Scripted<u128>,
    estimate: Scripted<u64>,
    network: NetworkInfo,
    send_result: Option<Scripted<RawExecutionResult>>,
    queued: Mutex<VecDeque<Scripted<RawExecutionResult>>>,
    gate: Option<Arc<Notify>>,
    sent: Mutex<Vec<NormalizedTransaction>>,
    account_queries: AtomicUsize,
    dispatches: AtomicUsize,
}

impl ScriptedProvider {
    pub(crate) fn new(kind: ProviderKind) -> Self {
        let network = if kind.is_simulated() {
            NetworkInfo::new("vm", "VM")
        } else {
            NetworkInfo::from_chain_id(11155111)
        };
        Self {
            kind,
            accounts: Ok(vec![DEFAULT_ACCOUNT]),
            known_accounts: true,
            gas_price: Ok(1_000_000_000),
            estimate: Ok(21_000),
            network,
            send_result: None,
            queued: Mutex::new(VecDeque::new()),
            gate: None,
            sent: Mutex::new(Vec::new()),
            account_queries: AtomicUsize::new(0),
            dispatches: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_accounts(mut self, accounts: Vec<Address>) -> Self {
        self.accounts = Ok(accounts);
        self
    }

    /// Report listed accounts as foreign to the backend
    pub(crate) fn with_unknown_accounts(mut self) -> Self {
        self.known_accounts = false;
        self
    }

    pub(crate) fn with_failing_accounts(mut self) -> Self {
        self.accounts = Err("eth_accounts unavailable".to_string());
        self
    }

    pub(crate) fn with_failing_gas_price(mut self) -> Self {
        self.gas_price = Err("eth_gasPrice timed out".to_string());
        self
    }

    pub(crate) fn with_estimate(mut self, estimate: Scripted<u64>) -> Self {
        self.estimate = estimate;
        self
    }

    pub(crate) fn with_network(mut self, network: NetworkInfo) -> Self {
        self.network = network;
        self
    }

    /// Answer every dispatch with `result`
    pub(crate) fn with_send_result(mut self, result: Scripted<RawExecutionResult>) -> Self {
        self.send_result = Some(result);
        self
    }

    /// Answer the next unscripted dispatch with `result`
    pub(crate) fn queue_send(self, result: Scripted<RawExecutionResult>) -> Self {
        self.queued.lock().unwrap().push_back(result);
        self
    }

    /// Hold every dispatch until `gate` is notified
    pub(crate) fn with_gate(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub(crate) fn account_queries(&self) -> usize {
        self.account_queries.load(Ordering::SeqCst)
    }

    pub(crate) fn dispatches(&self) -> usize {
        self.dispatches.load(Ordering::SeqCst)
    }

    pub(crate) fn sent(&self) -> Vec<NormalizedTransaction> {
        self.sent.lock().unwrap().clone()
    }

    fn default_result(&self, tx: &NormalizedTransaction, n: usize) -> RawExecutionResult {
        if tx.use_call {
            return RawExecutionResult {
                return_value: Some(Bytes::new()),
                call_output: Some(Bytes::new()),
                ..Default::default()
            };
        }
        let tx_hash = keccak256(n.to_be_bytes());
        let created = tx.is_creation().then(|| Address::with_last_byte(n as u8));
        RawExecutionResult {
            transaction_hash: Some(tx_hash),
            receipt: Some(TxReceipt {
                transaction_hash: tx_hash,
                status: true,
                contract_address: created,
                gas_used: 21_000,
                block_number: Some(n as u64),
            }),
            created_address: created,
            return_value: Some(Bytes::new()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    async fn accounts(&self) -> Result<Vec<Address>> {
        self.account_queries.fetch_add(1, Ordering::SeqCst);
        self.accounts.clone().map_err(Error::Provider)
    }

    async fn has_account(&self, _address: Address) -> Result<bool> {
        Ok(self.known_accounts)
    }

    async fn gas_price(&self) -> Result<u128> {
        self.gas_price.clone().map_err(Error::Provider)
    }

    async fn network(&self) -> Result<NetworkInfo> {
        Ok(self.network.clone())
    }

    async fn estimate_gas(&self, _tx: &NormalizedTransaction) -> Result<u64> {
        self.estimate.clone().map_err(Error::Provider)
    }

    async fn send(&self, tx: &NormalizedTransaction) -> Result<RawExecutionResult> {
        let n = self.dispatches.fetch_add(1, Ordering::SeqCst) + 1;
        self.sent.lock().unwrap().push(tx.clone());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if let Some(result) = &self.send_result {
            return result.clone().map_err(Error::Provider);
        }
        let queued = self.queued.lock().unwrap().pop_front();
        match queued {
            Some(result) => result.map_err(Error::Provider),
            None => Ok(self.default_result(tx, n)),
        }
    }

    async fn sign_message(&self, _account: Address, message: &[u8]) -> Result<SignedMessage> {
        Ok(SignedMessage {
            message_hash: keccak256(message),
            signature: Bytes::from_static(&[0u8; 65]),
        })
    }

    async fn reset_environment(&self) -> Result<()> {
        Ok(())
    }

    async fn new_account(&self) -> Result<Address> {
        Err(Error::Unsupported {
            provider: self.kind.name(),
            operation: "new_account",
        })
    }

    async fn balance(&self, _address: Address) -> Result<U256> {
        Ok(U256::ZERO)
    }
}

/// VM that reports the same outcome for every execution
pub(crate) struct ScriptedExecutor {
    outcome: VmOutcome,
}

impl ScriptedExecutor {
    pub(crate) fn new(outcome: VmOutcome) -> Self {
        Self { outcome }
    }
}

#[async_trait]
impl VmExecutor for ScriptedExecutor {
    async fn execute(&self, _tx: &NormalizedTransaction) -> Result<VmOutcome> {
        Ok(self.outcome.clone())
    }
}

/// Registry holding `provider` under its kind's name and fresh scripted
/// providers under the other well-known names
pub(crate) fn registry_with(provider: impl Into<Arc<ScriptedProvider>>) -> Arc<ProviderRegistry> {
    let provider = provider.into();
    let slot = |kind: ProviderKind| -> Arc<dyn Provider> {
        if provider.kind() == kind {
            provider.clone()
        } else {
            Arc::new(ScriptedProvider::new(kind))
        }
    };
    Arc::new(ProviderRegistry::new(
        slot(ProviderKind::Simulated),
        slot(ProviderKind::Injected),
        slot(ProviderKind::RemoteNode),
    ))
}

/// Pipeline whose context selects `provider`
pub(crate) fn pipeline_for(
    provider: Arc<ScriptedProvider>,
) -> (TransactionPipeline, Arc<LocalExecutionContext>) {
    let name = provider.kind().name();
    let registry = registry_with(provider);
    let context = Arc::new(LocalExecutionContext::new(registry.clone(), name));
    (TransactionPipeline::new(registry, context.clone()), context)
}

pub(crate) fn creation_tx() -> NormalizedTransaction {
    NormalizedTransaction {
        to: None,
        data: Bytes::from_static(&[0x60, 0x80, 0x60, 0x40]),
        use_call: false,
        from: Sender::Known(DEFAULT_ACCOUNT),
        value: U256::ZERO,
        gas_limit: 3_000_000,
        timestamp: Utc::now(),
    }
}

/// Hooks that proceed everywhere except an optional cancelling stage, and
/// record which stages were visited
pub(crate) struct ScriptedHooks {
    cancel_at: Option<&'static str>,
    stages: Mutex<Vec<&'static str>>,
}

impl ScriptedHooks {
    pub(crate) fn approving() -> Self {
        Self {
            cancel_at: None,
            stages: Mutex::new(Vec::new()),
        }
    }

    /// Cancel at `"confirm"`, `"continue"` or `"prompt"`
    pub(crate) fn cancelling_at(stage: &'static str) -> Self {
        Self {
            cancel_at: Some(stage),
            stages: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn stages(&self) -> Vec<&'static str> {
        self.stages.lock().unwrap().clone()
    }

    fn visit(&self, stage: &'static str) -> Decision {
        self.stages.lock().unwrap().push(stage);
        if self.cancel_at == Some(stage) {
            Decision::Cancel
        } else {
            Decision::Proceed
        }
    }
}

#[async_trait]
impl ConfirmationHooks for ScriptedHooks {
    async fn confirm_estimate(
        &self,
        _network: &NetworkInfo,
        _tx: &NormalizedTransaction,
        _gas_estimate: u64,
        _gas_price: u128,
    ) -> Decision {
        self.visit("confirm")
    }

    async fn continue_on_error(&self, _error: &Error) -> Decision {
        self.visit("continue")
    }

    async fn prompt(&self) -> Decision {
        self.visit("prompt")
    }
}

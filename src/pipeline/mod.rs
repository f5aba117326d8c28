//! Transaction pipeline
//!
//! A submission runs strictly in order: resolve, announce, confirm, dispatch,
//! classify, notify. Any stage before dispatch can stop the submission; once
//! dispatch starts the submission runs to completion or a backend failure.
//!
//! The active provider is read once, when the submission starts, so a provider
//! switch while a transaction is in flight cannot mix two backends' semantics.

mod classifier;
mod engine;
mod events;
mod handshake;
mod pending;
mod resolver;

pub use classifier::{classify, ExecutionResult, ReturnData};
pub use engine::{DirectSubmission, SubmissionEngine};
pub use events::{EventBus, ExecutedTransaction, TxEvent};
pub use handshake::{
    negotiate, AutoConfirm, ConfirmationHooks, Decision, Handshake, HandshakeState,
};
pub use pending::{PendingEntry, PendingGuard, PendingTransactions};
pub use resolver::{
    resolve_account, resolve_gas_and_value, resolve_sender, GasAndValue, SenderFallback,
    DEFAULT_GAS_LIMIT,
};

use crate::context::{ExecutionContext, TransactionContext};
use crate::providers::{NetworkInfo, Provider, ProviderRegistry, SignedMessage};
use crate::transaction::{NormalizedTransaction, TransactionIntent};
use crate::units::format_gwei;
use crate::{Error, Result};
use alloy::primitives::{Address, Bytes, U256};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub const DEFAULT_EVENT_CAPACITY: usize = 256;

pub struct TransactionPipeline {
    registry: Arc<ProviderRegistry>,
    context: Arc<dyn ExecutionContext>,
    engine: Arc<dyn SubmissionEngine>,
    events: EventBus,
    pending: PendingTransactions,
    sender_fallback: SenderFallback,
}

impl TransactionPipeline {
    pub fn new(registry: Arc<ProviderRegistry>, context: Arc<dyn ExecutionContext>) -> Self {
        Self {
            registry,
            context,
            engine: Arc::new(DirectSubmission),
            events: EventBus::new(DEFAULT_EVENT_CAPACITY),
            pending: PendingTransactions::new(),
            sender_fallback: SenderFallback::default(),
        }
    }

    pub fn with_engine(mut self, engine: Arc<dyn SubmissionEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_sender_fallback(mut self, fallback: SenderFallback) -> Self {
        self.sender_fallback = fallback;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.events = EventBus::new(capacity);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TxEvent> {
        self.events.subscribe()
    }

    /// Number of submissions currently in flight
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn active_provider(&self) -> Arc<dyn Provider> {
        self.registry.active(self.context.as_ref())
    }

    pub async fn detect_network(&self) -> Result<NetworkInfo> {
        self.context.detect_network().await
    }

    /// Submit one transaction through every pipeline stage
    pub async fn submit(
        &self,
        intent: TransactionIntent,
        tx_context: &dyn TransactionContext,
        hooks: &dyn ConfirmationHooks,
    ) -> Result<ExecutionResult> {
        let provider = self.active_provider();
        self.run(provider, None, intent, tx_context, hooks).await
    }

    /// Submit a raw transaction, refusing to do so on mainnet
    pub async fn send_transaction(
        &self,
        intent: TransactionIntent,
        tx_context: &dyn TransactionContext,
        hooks: &dyn ConfirmationHooks,
    ) -> Result<ExecutionResult> {
        let provider = self.active_provider();
        let network = self.context.detect_network().await?;
        if network.is_mainnet() {
            warn!(network = %network.name, "Refusing raw transaction on mainnet");
            return Err(Error::MainnetDisallowed);
        }
        self.run(provider, Some(network), intent, tx_context, hooks)
            .await
    }

    /// Invoke a contract method; `use_call` for read-only methods
    pub async fn call_function(
        &self,
        to: Address,
        data: Bytes,
        use_call: bool,
        value: Option<U256>,
        tx_context: &dyn TransactionContext,
        hooks: &dyn ConfirmationHooks,
    ) -> Result<ExecutionResult> {
        let intent = TransactionIntent {
            to: Some(to),
            data,
            use_call,
            value,
            ..Default::default()
        };
        self.submit(intent, tx_context, hooks).await
    }

    async fn run(
        &self,
        provider: Arc<dyn Provider>,
        network: Option<NetworkInfo>,
        intent: TransactionIntent,
        tx_context: &dyn TransactionContext,
        hooks: &dyn ConfirmationHooks,
    ) -> Result<ExecutionResult> {
        let backend = provider.kind();
        let simulated = backend.is_simulated();

        // Resolve
        let from =
            resolve_sender(&intent, tx_context, provider.as_ref(), self.sender_fallback).await?;
        let GasAndValue { gas_limit, value } = resolve_gas_and_value(&intent, tx_context);
        let TransactionIntent {
            to,
            data,
            use_call,
            timestamp,
            payload,
            ..
        } = intent;
        let tx = NormalizedTransaction {
            to,
            data,
            use_call,
            from,
            value,
            gas_limit,
            timestamp: timestamp.unwrap_or_else(Utc::now),
        };

        // Announce
        info!(
            provider = %backend,
            kind = ?tx.kind(),
            from = %tx.from,
            to = ?tx.to,
            gas_limit = tx.gas_limit,
            "Initiating transaction"
        );
        self.events.emit(TxEvent::InitiatingTransaction {
            timestamp: tx.timestamp,
            tx: tx.clone(),
            payload: payload.clone(),
        });
        let _pending = self.pending.begin(&tx);

        // Confirm
        let network = match network {
            Some(network) => network,
            None => provider.network().await?,
        };
        let gas_estimate = self
            .engine
            .confirm(provider.as_ref(), &network, &tx, hooks)
            .await?;
        debug!(?gas_estimate, network = %network.name, "Confirmation complete, dispatching");

        // Dispatch
        let dispatched = self.engine.dispatch(provider.as_ref(), &tx).await;

        // Classify
        let (raw_result, outcome) = match dispatched {
            Ok(raw) => {
                if !simulated && !tx.use_call {
                    if let Some(tx_hash) = raw.transaction_hash {
                        self.events.emit(TxEvent::TransactionBroadcasted {
                            tx_hash,
                            network_name: network.name.clone(),
                        });
                    }
                }
                (Some(raw.clone()), classify(raw, simulated, tx.kind()))
            }
            Err(err) => (None, Err(err)),
        };

        // Notify
        let created_address = outcome
            .as_ref()
            .ok()
            .and_then(|result| result.created_address);
        match &outcome {
            Ok(result) => info!(
                success = result.success,
                created_address = ?created_address,
                "Transaction executed"
            ),
            Err(err) => warn!(error = %err, "Transaction failed after dispatch"),
        }
        self.events.emit(TxEvent::executed(ExecutedTransaction {
            error: outcome.as_ref().err().map(|err| err.to_string()),
            from: tx.from,
            to: tx.to,
            data: tx.data,
            use_call: tx.use_call,
            raw_result,
            timestamp: tx.timestamp,
            payload,
            created_address,
        }));

        outcome
    }

    /// Current gas price of the active backend, in gwei
    pub async fn determine_gas_price(&self) -> Result<String> {
        self.active_provider()
            .gas_price()
            .await
            .map(format_gwei)
            .map_err(|e| Error::GasPriceUnavailable(e.to_string()))
    }

    pub async fn accounts(&self) -> Result<Vec<Address>> {
        self.active_provider().accounts().await
    }

    pub async fn new_account(&self) -> Result<Address> {
        self.active_provider().new_account().await
    }

    pub async fn sign_message(&self, account: Address, message: &[u8]) -> Result<SignedMessage> {
        self.active_provider().sign_message(account, message).await
    }

    pub async fn balance_in_ether(&self, address: Address) -> Result<String> {
        self.active_provider().balance_in_ether(address).await
    }

    pub async fn reset_environment(&self) -> Result<()> {
        self.active_provider().reset_environment().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{LocalExecutionContext, SessionDefaults};
    use crate::providers::{
        ProviderKind, RawExecutionResult, SimulatedProvider, TxReceipt, VmOutcome,
    };
    use crate::test_support::{
        pipeline_for, registry_with, ScriptedExecutor, ScriptedHooks, ScriptedProvider,
        DEFAULT_ACCOUNT,
    };
    use alloy::primitives::{address, B256};
    use tokio::sync::Notify;
    use tokio_test::assert_ok;

    const TARGET: Address = address!("5fbdb2315678afecb367f032d93f642f64180aa3");
    const CREATED: Address = address!("e7f1725e7734ce288f8367e1bb143e90bb3f0512");

    fn drain(rx: &mut broadcast::Receiver<TxEvent>) -> Vec<&'static str> {
        let mut names = Vec::new();
        while let Ok(event) = rx.try_recv() {
            names.push(event.name());
        }
        names
    }

    fn creation_bytecode() -> Bytes {
        Bytes::from_static(&[0x60, 0x80, 0x60, 0x40, 0x52])
    }

    #[tokio::test]
    async fn simulated_zero_status_creation_fails() {
        let provider = Arc::new(
            ScriptedProvider::new(ProviderKind::Simulated).with_send_result(Ok(
                RawExecutionResult {
                    transaction_hash: Some(B256::repeat_byte(1)),
                    receipt: Some(TxReceipt {
                        transaction_hash: B256::repeat_byte(1),
                        status: false,
                        contract_address: None,
                        gas_used: 90_000,
                        block_number: None,
                    }),
                    ..Default::default()
                },
            )),
        );
        let (pipeline, _context) = pipeline_for(provider.clone());
        let mut events = pipeline.subscribe();

        let err = pipeline
            .submit(
                TransactionIntent::create(creation_bytecode()),
                &(),
                &ScriptedHooks::approving(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::CreationFailed(_)));
        assert_eq!(provider.dispatches(), 1);
        assert_eq!(
            drain(&mut events),
            vec!["initiating_transaction", "transaction_executed"]
        );
    }

    #[tokio::test]
    async fn zero_status_creation_on_the_simulated_ledger() {
        let simulated = SimulatedProvider::new(
            Arc::new(ScriptedExecutor::new(VmOutcome::default())),
            2,
            1,
        );
        let registry = Arc::new(ProviderRegistry::new(
            Arc::new(simulated),
            Arc::new(ScriptedProvider::new(ProviderKind::Injected)),
            Arc::new(ScriptedProvider::new(ProviderKind::RemoteNode)),
        ));
        let context = Arc::new(LocalExecutionContext::new(registry.clone(), "simulated"));
        let pipeline = TransactionPipeline::new(registry, context);
        let mut events = pipeline.subscribe();

        let err = pipeline
            .submit(
                TransactionIntent::create(creation_bytecode()),
                &(),
                &AutoConfirm::approve_all(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CreationFailed(_)));

        let _initiating = events.recv().await.unwrap();
        match events.recv().await.unwrap() {
            TxEvent::TransactionExecuted(executed) => {
                assert!(executed.created_address.is_none());
                assert!(executed.error.is_some());
            }
            other => panic!("unexpected event {}", other.name()),
        }
    }

    #[tokio::test]
    async fn cancellation_at_any_stage_prevents_dispatch() {
        for (stage, estimate) in [
            ("confirm", Ok(21_000)),
            ("continue", Err("estimate failed".to_string())),
            ("prompt", Ok(21_000)),
        ] {
            let provider = Arc::new(
                ScriptedProvider::new(ProviderKind::RemoteNode).with_estimate(estimate),
            );
            let (pipeline, _context) = pipeline_for(provider.clone());
            let mut events = pipeline.subscribe();
            let hooks = ScriptedHooks::cancelling_at(stage);

            let err = pipeline
                .submit(TransactionIntent::send(TARGET, Bytes::new()), &(), &hooks)
                .await
                .unwrap_err();

            assert!(err.is_cancellation(), "stage {stage}: {err}");
            assert_eq!(hooks.stages().last().copied(), Some(stage));
            assert_eq!(provider.dispatches(), 0, "stage {stage}");
            assert_eq!(drain(&mut events), vec!["initiating_transaction"]);
            assert_eq!(pipeline.pending_count(), 0);
        }
    }

    #[tokio::test]
    async fn mainnet_raw_send_is_refused_before_anything_happens() {
        let provider = Arc::new(
            ScriptedProvider::new(ProviderKind::RemoteNode)
                .with_network(NetworkInfo::new("1", "Main")),
        );
        let (pipeline, _context) = pipeline_for(provider.clone());
        let mut events = pipeline.subscribe();

        let err = pipeline
            .send_transaction(
                TransactionIntent::send(TARGET, Bytes::new()),
                &(),
                &ScriptedHooks::approving(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::MainnetDisallowed));
        assert_eq!(provider.dispatches(), 0);
        assert_eq!(provider.account_queries(), 0);
        assert!(drain(&mut events).is_empty());
    }

    /// Host context that always reports `network` with remote-node selected
    struct HostContext {
        network: NetworkInfo,
    }

    #[async_trait::async_trait]
    impl ExecutionContext for HostContext {
        async fn detect_network(&self) -> Result<NetworkInfo> {
            Ok(self.network.clone())
        }

        fn active_provider_name(&self) -> String {
            ProviderKind::RemoteNode.name().to_string()
        }

        fn is_simulated(&self) -> bool {
            false
        }

        fn subscribe(&self) -> broadcast::Receiver<crate::context::ContextEvent> {
            broadcast::channel(1).1
        }
    }

    #[tokio::test]
    async fn mainnet_guard_follows_the_execution_context() {
        let provider = Arc::new(ScriptedProvider::new(ProviderKind::RemoteNode));
        let pipeline = TransactionPipeline::new(
            registry_with(provider.clone()),
            Arc::new(HostContext {
                network: NetworkInfo::new("1", "Main"),
            }),
        );

        let err = pipeline
            .send_transaction(
                TransactionIntent::send(TARGET, Bytes::new()),
                &(),
                &ScriptedHooks::approving(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::MainnetDisallowed));
        assert_eq!(provider.dispatches(), 0);
    }

    #[tokio::test]
    async fn raw_send_off_mainnet_goes_through() {
        let provider = Arc::new(ScriptedProvider::new(ProviderKind::RemoteNode));
        let (pipeline, _context) = pipeline_for(provider.clone());

        assert_ok!(
            pipeline
                .send_transaction(
                    TransactionIntent::send(TARGET, Bytes::new()),
                    &(),
                    &ScriptedHooks::approving(),
                )
                .await
        );
        assert_eq!(provider.dispatches(), 1);
    }

    #[tokio::test]
    async fn remote_send_is_broadcast_then_executed() {
        let provider = Arc::new(ScriptedProvider::new(ProviderKind::RemoteNode));
        let (pipeline, _context) = pipeline_for(provider.clone());
        let mut events = pipeline.subscribe();

        let result = pipeline
            .submit(
                TransactionIntent::send(TARGET, Bytes::new()),
                &(),
                &ScriptedHooks::approving(),
            )
            .await
            .unwrap();

        assert!(result.success);
        assert!(matches!(result.return_data, Some(ReturnData::Receipt(_))));
        assert_eq!(
            drain(&mut events),
            vec![
                "initiating_transaction",
                "transaction_broadcasted",
                "transaction_executed"
            ]
        );
    }

    #[tokio::test]
    async fn calls_skip_confirmation_and_carry_no_value() {
        let provider = Arc::new(ScriptedProvider::new(ProviderKind::Simulated).with_send_result(
            Ok(RawExecutionResult {
                return_value: Some(Bytes::from_static(&[0x2a])),
                ..Default::default()
            }),
        ));
        let (pipeline, _context) = pipeline_for(provider.clone());
        let mut events = pipeline.subscribe();
        let hooks = ScriptedHooks::approving();
        let defaults = SessionDefaults {
            value: Some(U256::from(1_000)),
            ..Default::default()
        };

        let result = pipeline
            .call_function(TARGET, Bytes::from_static(&[0x01]), true, None, &defaults, &hooks)
            .await
            .unwrap();

        assert_eq!(
            result.return_data,
            Some(ReturnData::Value(Bytes::from_static(&[0x2a])))
        );
        assert!(hooks.stages().is_empty());

        match events.recv().await.unwrap() {
            TxEvent::InitiatingTransaction { tx, .. } => {
                assert_eq!(tx.value, U256::ZERO);
                assert_eq!(tx.from.address(), Some(DEFAULT_ACCOUNT));
            }
            other => panic!("unexpected event {}", other.name()),
        }
        assert_eq!(events.recv().await.unwrap().name(), "call_executed");
    }

    #[tokio::test]
    async fn dispatch_failure_is_reported_through_executed_event() {
        let provider = Arc::new(
            ScriptedProvider::new(ProviderKind::RemoteNode)
                .with_send_result(Err("nonce too low".to_string())),
        );
        let (pipeline, _context) = pipeline_for(provider.clone());
        let mut events = pipeline.subscribe();

        let err = pipeline
            .submit(
                TransactionIntent::send(TARGET, Bytes::new()),
                &(),
                &ScriptedHooks::approving(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider(_)));

        let _initiating = events.recv().await.unwrap();
        match events.recv().await.unwrap() {
            TxEvent::TransactionExecuted(executed) => {
                assert!(executed.error.unwrap().contains("nonce too low"));
                assert!(executed.raw_result.is_none());
            }
            other => panic!("unexpected event {}", other.name()),
        }
    }

    #[tokio::test]
    async fn created_address_is_reported() {
        let provider = Arc::new(ScriptedProvider::new(ProviderKind::Simulated).with_send_result(
            Ok(RawExecutionResult {
                receipt: Some(TxReceipt {
                    transaction_hash: B256::repeat_byte(2),
                    status: true,
                    contract_address: None,
                    gas_used: 120_000,
                    block_number: None,
                }),
                created_address: Some(CREATED),
                ..Default::default()
            }),
        ));
        let (pipeline, _context) = pipeline_for(provider);
        let mut events = pipeline.subscribe();

        let result = pipeline
            .submit(
                TransactionIntent::create(creation_bytecode()),
                &(),
                &ScriptedHooks::approving(),
            )
            .await
            .unwrap();
        assert_eq!(result.created_address, Some(CREATED));

        let _initiating = events.recv().await.unwrap();
        match events.recv().await.unwrap() {
            TxEvent::TransactionExecuted(executed) => {
                assert_eq!(executed.created_address, Some(CREATED));
                assert!(executed.error.is_none());
            }
            other => panic!("unexpected event {}", other.name()),
        }
    }

    #[tokio::test]
    async fn in_flight_submission_keeps_its_backend() {
        let gate = Arc::new(Notify::new());
        let provider = Arc::new(
            ScriptedProvider::new(ProviderKind::Simulated)
                .with_gate(gate.clone())
                .with_send_result(Ok(RawExecutionResult {
                    exec_error: Some("revert: paused".to_string()),
                    ..Default::default()
                })),
        );
        let (pipeline, context) = pipeline_for(provider.clone());
        let pipeline = Arc::new(pipeline);

        let task = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move {
                pipeline
                    .submit(
                        TransactionIntent::send(TARGET, Bytes::new()),
                        &(),
                        &AutoConfirm::approve_all(),
                    )
                    .await
            })
        };

        while provider.dispatches() == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(pipeline.pending_count(), 1);

        // switching backends mid-flight must not change classification
        context.select(ProviderKind::RemoteNode.name());
        gate.notify_one();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::ExecutionReverted(_)));
        assert_eq!(pipeline.pending_count(), 0);
    }

    #[tokio::test]
    async fn gas_price_failure_has_fixed_prefix() {
        let provider =
            Arc::new(ScriptedProvider::new(ProviderKind::RemoteNode).with_failing_gas_price());
        let (pipeline, _context) = pipeline_for(provider);
        let err = pipeline.determine_gas_price().await.unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Unable to retrieve the current network gas price."));
    }

    #[tokio::test]
    async fn gas_price_is_reported_in_gwei() {
        let provider = Arc::new(ScriptedProvider::new(ProviderKind::RemoteNode));
        let (pipeline, _context) = pipeline_for(provider);
        assert_eq!(pipeline.determine_gas_price().await.unwrap(), "1");
    }
}

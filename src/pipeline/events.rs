//! Pipeline notifications

use crate::providers::RawExecutionResult;
use crate::transaction::{NormalizedTransaction, Sender};
use alloy::primitives::{Address, Bytes, B256};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

/// Everything a caller can observe about an executed submission
#[derive(Debug, Clone, Serialize)]
pub struct ExecutedTransaction {
    pub error: Option<String>,
    pub from: Sender,
    pub to: Option<Address>,
    pub data: Bytes,
    pub use_call: bool,
    pub raw_result: Option<RawExecutionResult>,
    pub timestamp: DateTime<Utc>,
    pub payload: Option<Value>,
    pub created_address: Option<Address>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TxEvent {
    /// Emitted before any backend interaction
    InitiatingTransaction {
        timestamp: DateTime<Utc>,
        tx: NormalizedTransaction,
        payload: Option<Value>,
    },
    CallExecuted(ExecutedTransaction),
    TransactionExecuted(ExecutedTransaction),
    TransactionBroadcasted {
        tx_hash: B256,
        network_name: String,
    },
}

impl TxEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TxEvent::InitiatingTransaction { .. } => "initiating_transaction",
            TxEvent::CallExecuted(_) => "call_executed",
            TxEvent::TransactionExecuted(_) => "transaction_executed",
            TxEvent::TransactionBroadcasted { .. } => "transaction_broadcasted",
        }
    }

    /// `CallExecuted` or `TransactionExecuted`, selected by `use_call`
    pub fn executed(executed: ExecutedTransaction) -> Self {
        if executed.use_call {
            TxEvent::CallExecuted(executed)
        } else {
            TxEvent::TransactionExecuted(executed)
        }
    }
}

/// Fan-out channel for pipeline notifications
///
/// Emitting never blocks and never fails; events sent while nobody listens
/// are dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<TxEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TxEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: TxEvent) {
        let name = event.name();
        if self.sender.send(event).is_err() {
            trace!(event = name, "No subscribers for pipeline event");
        }
    }
}

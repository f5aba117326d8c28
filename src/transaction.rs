//! Transaction intents and normalized records
//!
//! A [`TransactionIntent`] is what a caller asks for. Once the sender, gas limit
//! and value are resolved it becomes a [`NormalizedTransaction`], the record that
//! is announced, confirmed and dispatched.

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, Bytes, U256};
use alloy::rpc::types::TransactionRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Caller-specified description of a transaction before defaults are resolved
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionIntent {
    /// Destination, `None` for contract creation
    pub to: Option<Address>,
    /// Calldata or creation bytecode
    pub data: Bytes,
    /// Execute as a read-only query, never submitting a state change
    pub use_call: bool,
    pub from: Option<Address>,
    pub value: Option<U256>,
    pub gas_limit: Option<u64>,
    pub timestamp: Option<DateTime<Utc>>,
    /// Opaque caller metadata carried through notifications
    pub payload: Option<Value>,
}

impl TransactionIntent {
    /// Intent to create a contract from creation bytecode
    pub fn create(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Default::default()
        }
    }

    /// Intent to submit a state-changing transaction to `to`
    pub fn send(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to: Some(to),
            data: data.into(),
            ..Default::default()
        }
    }

    /// Intent to query `to` without changing state
    pub fn call(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to: Some(to),
            data: data.into(),
            use_call: true,
            ..Default::default()
        }
    }

    pub fn with_from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Resolved sending account
///
/// `Unknown` is substituted when account lookup fails for a reason other than
/// an empty or invalid account list and the pipeline is configured to degrade
/// instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    Known(Address),
    Unknown,
}

impl Sender {
    pub fn address(&self) -> Option<Address> {
        match self {
            Sender::Known(address) => Some(*address),
            Sender::Unknown => None,
        }
    }
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sender::Known(address) => write!(f, "{}", address),
            Sender::Unknown => write!(f, "unknown"),
        }
    }
}

/// What a normalized record does once dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionKind {
    Call,
    Transaction,
    Creation,
}

/// Fully-resolved transaction ready for dispatch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTransaction {
    pub to: Option<Address>,
    pub data: Bytes,
    pub use_call: bool,
    pub from: Sender,
    pub value: U256,
    pub gas_limit: u64,
    pub timestamp: DateTime<Utc>,
}

impl NormalizedTransaction {
    pub fn kind(&self) -> ExecutionKind {
        if self.use_call {
            ExecutionKind::Call
        } else if self.to.is_none() {
            ExecutionKind::Creation
        } else {
            ExecutionKind::Transaction
        }
    }

    pub fn is_creation(&self) -> bool {
        self.kind() == ExecutionKind::Creation
    }

    /// Build the JSON-RPC request for this record
    pub fn to_request(&self) -> TransactionRequest {
        let mut request = TransactionRequest::default()
            .input(self.data.clone().into())
            .value(self.value)
            .gas_limit(self.gas_limit);

        request = match self.to {
            Some(to) => request.to(to),
            None => request.into_create(),
        };

        if let Some(from) = self.from.address() {
            request = request.from(from);
        }

        request
    }
}

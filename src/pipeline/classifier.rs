//! Post-dispatch result classification
//!
//! Backends report results in different shapes. The simulated VM exposes an
//! execution error, the created address and the return value directly; nodes
//! only give back a receipt (or the output of a read-only query). The
//! classifier branches on the backend kind, never on which fields happen to be
//! populated.

use crate::providers::{RawExecutionResult, TxReceipt};
use crate::transaction::ExecutionKind;
use crate::{Error, Result};
use alloy::primitives::{Address, Bytes};
use serde::Serialize;

/// Data returned by an execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum ReturnData {
    /// Inline return value or query output
    Value(Bytes),
    /// Nodes have no synchronous return channel for submitted transactions
    Receipt(TxReceipt),
}

/// Normalized outcome of one submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub created_address: Option<Address>,
    pub return_data: Option<ReturnData>,
    pub raw: RawExecutionResult,
}

/// Interpret a backend's raw result
pub fn classify(
    raw: RawExecutionResult,
    simulated: bool,
    kind: ExecutionKind,
) -> Result<ExecutionResult> {
    if simulated {
        if let Some(message) = &raw.exec_error {
            return Err(Error::ExecutionReverted(message.clone()));
        }
    }

    let status = raw.receipt.as_ref().map_or(true, |receipt| receipt.status);

    let created_address = if simulated {
        raw.created_address
    } else {
        raw.receipt
            .as_ref()
            .and_then(|receipt| receipt.contract_address)
    };

    if kind == ExecutionKind::Creation {
        if !status {
            return Err(Error::CreationFailed(
                "transaction execution failed".to_string(),
            ));
        }
        if created_address.is_none() {
            return Err(Error::CreationFailed(
                "no contract address was returned".to_string(),
            ));
        }
    }

    let return_data = if simulated {
        raw.return_value.clone().map(ReturnData::Value)
    } else if let Some(output) = &raw.call_output {
        Some(ReturnData::Value(output.clone()))
    } else {
        raw.receipt.clone().map(ReturnData::Receipt)
    };

    Ok(ExecutionResult {
        success: status,
        created_address: if kind == ExecutionKind::Creation {
            created_address
        } else {
            None
        },
        return_data,
        raw,
    })
}

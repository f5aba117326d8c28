//! Audit log
//!
//! Appends one JSONL entry per pipeline notification for compliance and
//! debugging.

use crate::pipeline::{ExecutedTransaction, TxEvent};
use crate::transaction::Sender;
use alloy::primitives::{Address, B256};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Entry in the audit log
#[derive(Debug, Serialize)]
struct AuditEntry {
    timestamp: DateTime<Utc>,
    entry_type: &'static str,
    from: Option<Sender>,
    to: Option<Address>,
    tx_hash: Option<B256>,
    created_address: Option<Address>,
    network: Option<String>,
    payload: Option<Value>,
    error: Option<String>,
    status: &'static str,
}

impl AuditEntry {
    fn from_event(event: &TxEvent) -> Self {
        let entry_type = event.name();
        match event {
            TxEvent::InitiatingTransaction {
                timestamp,
                tx,
                payload,
            } => Self {
                timestamp: *timestamp,
                entry_type,
                from: Some(tx.from),
                to: tx.to,
                tx_hash: None,
                created_address: None,
                network: None,
                payload: payload.clone(),
                error: None,
                status: "pending",
            },
            TxEvent::CallExecuted(executed) | TxEvent::TransactionExecuted(executed) => {
                Self::executed(entry_type, executed)
            }
            TxEvent::TransactionBroadcasted {
                tx_hash,
                network_name,
            } => Self {
                timestamp: Utc::now(),
                entry_type,
                from: None,
                to: None,
                tx_hash: Some(*tx_hash),
                created_address: None,
                network: Some(network_name.clone()),
                payload: None,
                error: None,
                status: "broadcast",
            },
        }
    }

    fn executed(entry_type: &'static str, executed: &ExecutedTransaction) -> Self {
        let status = match (&executed.error, &executed.raw_result) {
            (Some(_), _) => "error",
            (None, Some(raw)) if raw.receipt.as_ref().is_some_and(|r| !r.status) => "failed",
            (None, _) => "success",
        };
        Self {
            timestamp: executed.timestamp,
            entry_type,
            from: Some(executed.from),
            to: executed.to,
            tx_hash: executed
                .raw_result
                .as_ref()
                .and_then(|raw| raw.transaction_hash),
            created_address: executed.created_address,
            network: None,
            payload: executed.payload.clone(),
            error: executed.error.clone(),
            status,
        }
    }
}

/// Writer for audit log entries
struct AuditLogWriter {
    path: PathBuf,
}

impl AuditLogWriter {
    fn write(&self, entry: &AuditEntry) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let json = serde_json::to_string(entry)?;
        writeln!(file, "{}", json)?;
        Ok(())
    }
}

/// JSONL sink for pipeline notifications
#[derive(Clone)]
pub struct AuditLog {
    writer: Arc<Mutex<AuditLogWriter>>,
}

impl AuditLog {
    /// Create an audit log appending to `log_path`
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            writer: Arc::new(Mutex::new(AuditLogWriter {
                path: log_path.into(),
            })),
        }
    }

    /// Append an entry for `event`; write failures are logged, never raised
    pub async fn record(&self, event: &TxEvent) {
        let entry = AuditEntry::from_event(event);
        let writer = self.writer.lock().await;
        if let Err(e) = writer.write(&entry) {
            warn!(error = %e, "Failed to write audit log entry");
        }
    }

    /// Record every event from `events` until the channel closes
    pub fn spawn(self, mut events: broadcast::Receiver<TxEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => self.record(&event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Audit log fell behind, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Audit log stopped");
        })
    }
}

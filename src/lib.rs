//! Transaction submission and execution orchestration
//!
//! Resolves who sends a transaction and with what gas and value, negotiates a
//! three-stage confirmation with the caller, dispatches to one of several
//! interchangeable EVM backends and classifies the backend's result:
//! - a simulated in-process ledger
//! - a user-controlled signing agent
//! - a remote node
//!
//! Contract deployment with recursive library linking is built on the same
//! pipeline.

pub mod audit_log;
pub mod config;
pub mod context;
pub mod deploy;
pub mod pipeline;
pub mod providers;
pub mod runner;
pub mod transaction;
pub mod units;
pub mod wallet;

mod error;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use config::{Config, RpcConfig};
pub use context::{ExecutionContext, LocalExecutionContext, SessionDefaults, TransactionContext};
pub use deploy::{DeploymentOrchestrator, SolcFormatter};
pub use error::{Error, Result, GAS_PRICE_UNAVAILABLE};
pub use pipeline::{AutoConfirm, ConfirmationHooks, ExecutionResult, TransactionPipeline, TxEvent};
pub use providers::{Provider, ProviderKind, ProviderRegistry};
pub use runner::TxRunner;
pub use transaction::TransactionIntent;
pub use units::calculate_fee;

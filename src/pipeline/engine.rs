//! Submission engine
//!
//! The engine owns the two backend-facing steps of a submission: running the
//! confirmation handshake and handing the record to the backend. The pipeline
//! calls it; hosts can swap in their own (for example, one that queues
//! transactions for an external signer).

use super::handshake::{negotiate, ConfirmationHooks};
use crate::providers::{NetworkInfo, Provider, RawExecutionResult};
use crate::transaction::NormalizedTransaction;
use crate::Result;
use async_trait::async_trait;

#[async_trait]
pub trait SubmissionEngine: Send + Sync {
    /// Run the confirmation handshake; `Err(UserCancelled)` when declined
    async fn confirm(
        &self,
        provider: &dyn Provider,
        network: &NetworkInfo,
        tx: &NormalizedTransaction,
        hooks: &dyn ConfirmationHooks,
    ) -> Result<Option<u64>>;

    /// Hand the record to the backend; cannot be cancelled once started
    async fn dispatch(
        &self,
        provider: &dyn Provider,
        tx: &NormalizedTransaction,
    ) -> Result<RawExecutionResult>;
}

/// Engine that negotiates with the caller's hooks and submits straight to the
/// provider
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectSubmission;

#[async_trait]
impl SubmissionEngine for DirectSubmission {
    async fn confirm(
        &self,
        provider: &dyn Provider,
        network: &NetworkInfo,
        tx: &NormalizedTransaction,
        hooks: &dyn ConfirmationHooks,
    ) -> Result<Option<u64>> {
        // read-only queries change nothing and need no approval
        if tx.use_call {
            return Ok(None);
        }
        negotiate(hooks, provider, network, tx).await
    }

    async fn dispatch(
        &self,
        provider: &dyn Provider,
        tx: &NormalizedTransaction,
    ) -> Result<RawExecutionResult> {
        provider.send(tx).await
    }
}

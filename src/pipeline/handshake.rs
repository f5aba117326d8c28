//! Confirmation handshake
//!
//! Before a state-changing transaction is dispatched the caller gets three
//! chances to stop it: after seeing the gas estimate, after an estimation
//! error, and at a final prompt. Each hook returns exactly one [`Decision`].
//!
//! ```text
//!   estimate ok ──> AwaitingEstimateConfirm ─┐
//!                                            ├─proceed─> AwaitingFinalPrompt ─proceed─> Proceeding
//!   estimate err ─> AwaitingErrorAck ────────┘                  │
//!        │                   │                                  │
//!        └──────── cancel ───┴──────────── cancel ──────────────┴──> Cancelled
//! ```

use crate::providers::{NetworkInfo, Provider};
use crate::transaction::NormalizedTransaction;
use crate::{Error, Result};
use async_trait::async_trait;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Proceed,
    Cancel,
}

/// Caller-supplied confirmation hooks
#[async_trait]
pub trait ConfirmationHooks: Send + Sync {
    /// Inspect the gas estimate against current network conditions
    async fn confirm_estimate(
        &self,
        network: &NetworkInfo,
        tx: &NormalizedTransaction,
        gas_estimate: u64,
        gas_price: u128,
    ) -> Decision;

    /// Gas estimation failed; decide whether to submit anyway
    async fn continue_on_error(&self, error: &Error) -> Decision;

    /// Final acknowledgement before signing and submission
    async fn prompt(&self) -> Decision;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    AwaitingEstimateConfirm,
    AwaitingErrorAck,
    AwaitingFinalPrompt,
    Cancelled,
    Proceeding,
}

impl HandshakeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, HandshakeState::Cancelled | HandshakeState::Proceeding)
    }
}

/// The handshake's state; transitions only through [`Handshake::apply`]
#[derive(Debug, Clone)]
pub struct Handshake {
    state: HandshakeState,
}

impl Handshake {
    /// Start in the stage matching the estimation outcome
    pub fn start(estimate_succeeded: bool) -> Self {
        let state = if estimate_succeeded {
            HandshakeState::AwaitingEstimateConfirm
        } else {
            HandshakeState::AwaitingErrorAck
        };
        Self { state }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Apply the caller's decision for the current stage
    ///
    /// Terminal states absorb further decisions.
    pub fn apply(&mut self, decision: Decision) -> HandshakeState {
        use HandshakeState::*;

        self.state = match (self.state, decision) {
            (Cancelled, _) => Cancelled,
            (Proceeding, _) => Proceeding,
            (_, Decision::Cancel) => Cancelled,
            (AwaitingEstimateConfirm | AwaitingErrorAck, Decision::Proceed) => AwaitingFinalPrompt,
            (AwaitingFinalPrompt, Decision::Proceed) => Proceeding,
        };
        self.state
    }
}

/// Drive the handshake for `tx` against `provider`
///
/// Returns the gas estimate when one was obtained. A cancellation at any stage
/// yields [`Error::UserCancelled`]; a gas price lookup failure yields
/// [`Error::GasPriceUnavailable`].
pub async fn negotiate(
    hooks: &dyn ConfirmationHooks,
    provider: &dyn Provider,
    network: &NetworkInfo,
    tx: &NormalizedTransaction,
) -> Result<Option<u64>> {
    let estimate = provider.estimate_gas(tx).await;
    let mut handshake = Handshake::start(estimate.is_ok());

    loop {
        let decision = match handshake.state() {
            HandshakeState::AwaitingEstimateConfirm => {
                let gas_estimate = estimate.as_ref().copied().unwrap_or(tx.gas_limit);
                let gas_price = provider
                    .gas_price()
                    .await
                    .map_err(|e| Error::GasPriceUnavailable(e.to_string()))?;
                debug!(gas_estimate, gas_price, network = %network.name, "Awaiting estimate confirmation");
                hooks
                    .confirm_estimate(network, tx, gas_estimate, gas_price)
                    .await
            }
            HandshakeState::AwaitingErrorAck => match &estimate {
                Err(error) => {
                    debug!(%error, "Gas estimation failed, awaiting acknowledgement");
                    hooks.continue_on_error(error).await
                }
                Ok(_) => Decision::Proceed,
            },
            HandshakeState::AwaitingFinalPrompt => hooks.prompt().await,
            HandshakeState::Cancelled => {
                info!("Transaction cancelled during confirmation");
                return Err(Error::UserCancelled);
            }
            HandshakeState::Proceeding => return Ok(estimate.ok()),
        };
        handshake.apply(decision);
    }
}

/// Non-interactive confirmation policy
///
/// Proceeds unless the estimate exceeds `max_gas`; estimation errors cancel
/// unless `continue_on_error` is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm {
    pub max_gas: Option<u64>,
    pub continue_on_error: bool,
}

impl AutoConfirm {
    /// Approve everything
    pub fn approve_all() -> Self {
        Self {
            max_gas: None,
            continue_on_error: true,
        }
    }

    /// Cancel everything at the first stage
    pub fn reject_all() -> Self {
        Self {
            max_gas: Some(0),
            continue_on_error: false,
        }
    }
}

#[async_trait]
impl ConfirmationHooks for AutoConfirm {
    async fn confirm_estimate(
        &self,
        _network: &NetworkInfo,
        _tx: &NormalizedTransaction,
        gas_estimate: u64,
        _gas_price: u128,
    ) -> Decision {
        match self.max_gas {
            Some(max) if gas_estimate > max => {
                info!(gas_estimate, max_gas = max, "Gas estimate above ceiling");
                Decision::Cancel
            }
            _ => Decision::Proceed,
        }
    }

    async fn continue_on_error(&self, _error: &Error) -> Decision {
        if self.continue_on_error {
            Decision::Proceed
        } else {
            Decision::Cancel
        }
    }

    async fn prompt(&self) -> Decision {
        Decision::Proceed
    }
}

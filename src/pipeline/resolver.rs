//! Sender, gas limit and value resolution

use crate::context::TransactionContext;
use crate::providers::Provider;
use crate::transaction::{Sender, TransactionIntent};
use crate::{Error, Result};
use alloy::primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Gas limit used when the session sets none
pub const DEFAULT_GAS_LIMIT: u64 = 3_000_000;

/// What to do when account lookup fails for an unexpected reason
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderFallback {
    /// Continue with [`Sender::Unknown`] and let the backend decide
    #[default]
    UnknownSender,
    /// Fail the submission with the lookup error
    Propagate,
}

/// Pick the sending account: explicit, then session default, then the
/// provider's first account.
pub async fn resolve_account(
    intent: &TransactionIntent,
    context: &dyn TransactionContext,
    provider: &dyn Provider,
) -> Result<Address> {
    if let Some(from) = intent.from {
        return Ok(from);
    }
    if let Some(from) = context.default_from() {
        return Ok(from);
    }

    let accounts = provider.accounts().await?;
    let address = *accounts.first().ok_or(Error::NoAccountAvailable)?;

    if provider.kind().is_simulated() && !provider.has_account(address).await? {
        return Err(Error::InvalidAccountSelected(address.to_string()));
    }

    debug!(%address, provider = %provider.kind(), "Using provider's first account");
    Ok(address)
}

/// [`resolve_account`] with the configured fallback applied
///
/// Empty and invalid account lists are always reported.
pub async fn resolve_sender(
    intent: &TransactionIntent,
    context: &dyn TransactionContext,
    provider: &dyn Provider,
    fallback: SenderFallback,
) -> Result<Sender> {
    match resolve_account(intent, context, provider).await {
        Ok(address) => Ok(Sender::Known(address)),
        Err(err @ (Error::NoAccountAvailable | Error::InvalidAccountSelected(_))) => Err(err),
        Err(err) => match fallback {
            SenderFallback::UnknownSender => {
                warn!(error = %err, "Account resolution failed, continuing with unknown sender");
                Ok(Sender::Unknown)
            }
            SenderFallback::Propagate => Err(err),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasAndValue {
    pub gas_limit: u64,
    pub value: U256,
}

/// Resolve gas limit and value; pure, never fails
pub fn resolve_gas_and_value(
    intent: &TransactionIntent,
    context: &dyn TransactionContext,
) -> GasAndValue {
    let gas_limit = intent
        .gas_limit
        .or_else(|| context.gas_limit())
        .unwrap_or(DEFAULT_GAS_LIMIT);

    let value = match intent.value {
        Some(value) => value,
        None if intent.use_call => U256::ZERO,
        None => context.value().unwrap_or(U256::ZERO),
    };

    GasAndValue { gas_limit, value }
}

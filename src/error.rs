//! Error types for transaction orchestration

use thiserror::Error;

/// Prefix shown whenever the backend cannot report a gas price
pub const GAS_PRICE_UNAVAILABLE: &str = "Unable to retrieve the current network gas price.\n\
     Please resolve this issue before sending any transaction.";

#[derive(Error, Debug)]
pub enum Error {
    #[error("No accounts available")]
    NoAccountAvailable,

    #[error("Invalid account selected: {0}")]
    InvalidAccountSelected(String),

    #[error("{prefix}\n{0}", prefix = GAS_PRICE_UNAVAILABLE)]
    GasPriceUnavailable(String),

    #[error("Transaction cancelled by user")]
    UserCancelled,

    #[error("Execution reverted: {0}")]
    ExecutionReverted(String),

    #[error("Contract creation failed: {0}")]
    CreationFailed(String),

    #[error("Not allowed on mainnet")]
    MainnetDisallowed,

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Not supported by {provider} provider: {operation}")]
    Unsupported {
        provider: &'static str,
        operation: &'static str,
    },

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bytecode formatting failed: {0}")]
    Formatter(String),

    #[error("creation of {contract} errored: {source}")]
    CreationErrored {
        contract: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Library {0} not found in compilation unit")]
    UnknownLibrary(String),

    #[error("Library linking exceeded maximum depth of {0}")]
    LinkDepthExceeded(usize),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Cancellation is a normal termination, not a failure
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::UserCancelled)
    }

    pub(crate) fn provider(err: impl std::fmt::Display) -> Self {
        Error::Provider(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gas_price_error_carries_fixed_prefix() {
        let err = Error::GasPriceUnavailable("connection refused".to_string());
        let msg = err.to_string();
        assert!(msg.starts_with("Unable to retrieve the current network gas price."));
        assert!(msg.contains("Please resolve this issue before sending any transaction."));
        assert!(msg.ends_with("connection refused"));
    }

    #[test]
    fn creation_errored_names_the_contract() {
        let err = Error::CreationErrored {
            contract: "Token".to_string(),
            source: Box::new(Error::ExecutionReverted("out of gas".to_string())),
        };
        assert_eq!(
            err.to_string(),
            "creation of Token errored: Execution reverted: out of gas"
        );
    }

    #[test]
    fn only_user_cancel_is_cancellation() {
        assert!(Error::UserCancelled.is_cancellation());
        assert!(!Error::MainnetDisallowed.is_cancellation());
    }
}

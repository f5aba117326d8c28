//! Secure wallet management
//!
//! Private keys for the injected signing agent and the simulated ledger's
//! accounts live here and are never serialized or logged.

mod signer;

pub use signer::SecureWallet;

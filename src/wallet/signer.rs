//! Secure wallet implementation
//!
//! Keys are held in alloy's PrivateKeySigner and never serialized or logged.
//! Both the injected signing agent and the simulated ledger's accounts sign
//! through this type.

use crate::providers::SignedMessage;
use crate::{Error, Result};
use alloy::network::EthereumWallet;
use alloy::primitives::{eip191_hash_message, Address, Bytes, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use secrecy::{ExposeSecret, SecretString};

/// Secure wallet that protects private keys
pub struct SecureWallet {
    signer: PrivateKeySigner,
    /// Public address (safe to expose)
    address: Address,
    /// Ethereum wallet for alloy provider integration
    wallet: EthereumWallet,
}

impl SecureWallet {
    /// Create a wallet from an environment variable holding a hex private key
    pub fn from_env(var_name: &str) -> Result<Self> {
        let key = std::env::var(var_name).map_err(|_| {
            Error::Wallet(format!(
                "Environment variable {} not set. Required for wallet initialization.",
                var_name
            ))
        })?;

        Self::from_secret(&SecretString::from(key))
    }

    pub fn from_secret(key: &SecretString) -> Result<Self> {
        Self::from_hex(key.expose_secret())
    }

    /// Create a wallet from a hex-encoded private key
    pub fn from_hex(key_hex: &str) -> Result<Self> {
        let key_hex = key_hex.strip_prefix("0x").unwrap_or(key_hex);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| Error::Wallet(format!("Invalid private key: {}", e)))?;

        Ok(Self::from_signer(signer))
    }

    /// Fresh wallet with a random key
    pub fn random() -> Self {
        Self::from_signer(PrivateKeySigner::random())
    }

    fn from_signer(signer: PrivateKeySigner) -> Self {
        let address = signer.address();
        let wallet = EthereumWallet::from(signer.clone());
        Self {
            signer,
            address,
            wallet,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Signing wallet for alloy providers; never exposes the raw key
    pub fn wallet(&self) -> &EthereumWallet {
        &self.wallet
    }

    /// Sign an EIP-191 personal message
    pub fn sign_message(&self, message: &[u8]) -> Result<SignedMessage> {
        let message_hash = eip191_hash_message(message);
        let signature = self.sign_hash(&message_hash)?;
        Ok(SignedMessage {
            message_hash,
            signature: Bytes::copy_from_slice(&signature.as_bytes()),
        })
    }

    fn sign_hash(&self, hash: &B256) -> Result<alloy::signers::Signature> {
        self.signer
            .sign_hash_sync(hash)
            .map_err(|e| Error::Wallet(format!("Signing failed: {}", e)))
    }
}

// Implement Debug manually to avoid exposing the signer
impl std::fmt::Debug for SecureWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureWallet")
            .field("address", &self.address)
            .field("signer", &"[REDACTED]")
            .finish()
    }
}

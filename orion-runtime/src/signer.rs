//! Local transaction signing.
//!
//! The private key is kept as the hex string it was configured with, wiped
//! on drop, and only turned into a signer for the duration of a signing call.

use std::fmt;

use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, B256, Bytes};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use zeroize::Zeroizing;

use crate::error::VaultError;

/// A configured private key. `Debug` never prints the secret.
#[derive(Clone)]
pub struct SignerKey {
    secret: Zeroizing<String>,
    address: Address,
}

/// Signed EIP-2718 payload and its hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub raw: Bytes,
    pub hash: B256,
}

impl SignerKey {
    /// Validate a hex private key (with or without "0x").
    pub fn new(private_key: &str) -> Result<Self, VaultError> {
        let secret = Zeroizing::new(private_key.trim().to_string());
        let address = Self::load(&secret)?.address();
        Ok(Self { secret, address })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign a fully populated request (nonce, gas, gas price, chain id).
    pub async fn sign(&self, tx: TransactionRequest) -> Result<SignedTransaction, VaultError> {
        let wallet = EthereumWallet::from(Self::load(&self.secret)?);
        let envelope = tx
            .from(self.address)
            .build(&wallet)
            .await
            .map_err(|e| VaultError::Signing(format!("cannot sign transaction: {e}")))?;
        Ok(SignedTransaction {
            raw: Bytes::from(envelope.encoded_2718()),
            hash: *envelope.tx_hash(),
        })
    }

    fn load(secret: &str) -> Result<PrivateKeySigner, VaultError> {
        secret
            .parse::<PrivateKeySigner>()
            .map_err(|e| VaultError::Signing(format!("Invalid private key: {e}")))
    }
}

impl fmt::Debug for SignerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignerKey")
            .field("address", &self.address)
            .field("secret", &"<redacted>")
            .finish()
    }
}

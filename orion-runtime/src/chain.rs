//! Chain access for EVM-compatible networks.
//!
//! [`ChainRpc`] is the narrow set of JSON-RPC operations the vault client
//! needs. [`ChainClient`] implements it over an alloy HTTP provider; tests
//! substitute scripted implementations.

use std::fmt;
use std::time::Duration;

use alloy::network::ReceiptResponse as _;
use alloy::primitives::{Address, B256, Bytes, U256};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::client::RpcClient;
use alloy::rpc::types::TransactionRequest;
use alloy::transports::http::{Http, reqwest};
use alloy::transports::{RpcError, TransportErrorKind};
use async_trait::async_trait;

use crate::error::VaultError;
use crate::types::TxReceipt;

/// Failure of a single JSON-RPC round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcFailure {
    /// The request did not get an answer: connection reset, timeout, 5xx.
    Transport(String),
    /// The node answered with a JSON-RPC error object.
    Rejected {
        code: i64,
        message: String,
        data: Option<Bytes>,
    },
    /// No answer within the allowed time; the request may still have arrived.
    Timeout(Duration),
    /// Malformed response or local usage error.
    Other(String),
}

impl RpcFailure {
    /// Whether repeating the identical request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, RpcFailure::Transport(_) | RpcFailure::Timeout(_))
    }

    /// Revert payload attached to an `execution reverted` error, if any.
    pub fn revert_data(&self) -> Option<&Bytes> {
        match self {
            RpcFailure::Rejected { data, .. } => data.as_ref(),
            _ => None,
        }
    }

    /// Whether the node reports the transaction as already in its pool.
    pub fn is_already_known(&self) -> bool {
        match self {
            RpcFailure::Rejected { message, .. } => {
                let message = message.to_ascii_lowercase();
                message.contains("already known") || message.contains("known transaction")
            }
            _ => false,
        }
    }

    /// Whether the node reports the sender's nonce as already used.
    pub fn is_nonce_too_low(&self) -> bool {
        match self {
            RpcFailure::Rejected { message, .. } => message.to_ascii_lowercase().contains("nonce too low"),
            _ => false,
        }
    }
}

impl fmt::Display for RpcFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcFailure::Transport(message) => write!(f, "transport error: {message}"),
            RpcFailure::Rejected { code, message, .. } => write!(f, "node error {code}: {message}"),
            RpcFailure::Timeout(limit) => write!(f, "no answer within {limit:?}"),
            RpcFailure::Other(message) => f.write_str(message),
        }
    }
}

impl From<RpcError<TransportErrorKind>> for RpcFailure {
    fn from(e: RpcError<TransportErrorKind>) -> Self {
        match e {
            RpcError::ErrorResp(payload) => RpcFailure::Rejected {
                code: payload.code,
                message: payload.message.to_string(),
                data: payload.as_revert_data(),
            },
            RpcError::Transport(kind) => RpcFailure::Transport(kind.to_string()),
            other => RpcFailure::Other(other.to_string()),
        }
    }
}

/// JSON-RPC operations used by the vault client.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Endpoint description used in error messages.
    fn endpoint(&self) -> String;

    async fn chain_id(&self) -> Result<u64, RpcFailure>;

    /// `eth_call` against the latest block.
    async fn call(&self, tx: &TransactionRequest) -> Result<Bytes, RpcFailure>;

    /// Nonce including transactions still in the pool.
    async fn pending_nonce(&self, address: Address) -> Result<u64, RpcFailure>;

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64, RpcFailure>;

    async fn gas_price(&self) -> Result<u128, RpcFailure>;

    async fn balance(&self, address: Address) -> Result<U256, RpcFailure>;

    /// Broadcast a signed EIP-2718 payload; returns the node-reported hash.
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, RpcFailure>;

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>, RpcFailure>;
}

/// Read-only alloy provider over HTTP. Signing happens in the dispatcher.
pub struct ChainClient {
    provider: RootProvider,
    rpc_url: url::Url,
}

/// Per-request HTTP timeout used by [`ChainClient::new`].
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

impl ChainClient {
    pub fn new(rpc_url: &str) -> Result<Self, VaultError> {
        let url: url::Url = rpc_url
            .parse()
            .map_err(|e| VaultError::Config(format!("Invalid RPC URL '{rpc_url}': {e}")))?;
        Self::from_url(url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// HTTP provider whose requests fail once `request_timeout` passes.
    pub fn from_url(url: url::Url, request_timeout: Duration) -> Result<Self, VaultError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| VaultError::Config(format!("Failed to build HTTP client: {e}")))?;
        let client = RpcClient::new(Http::with_client(http, url.clone()), false);
        Ok(Self {
            provider: RootProvider::new(client),
            rpc_url: url,
        })
    }

    pub fn provider(&self) -> &RootProvider {
        &self.provider
    }
}

#[async_trait]
impl ChainRpc for ChainClient {
    fn endpoint(&self) -> String {
        // Strip credentials and query strings (API keys) from error messages.
        let mut shown = self.rpc_url.clone();
        let _ = shown.set_password(None);
        let _ = shown.set_username("");
        shown.set_query(None);
        shown.to_string()
    }

    async fn chain_id(&self) -> Result<u64, RpcFailure> {
        Ok(self.provider.get_chain_id().await?)
    }

    async fn call(&self, tx: &TransactionRequest) -> Result<Bytes, RpcFailure> {
        Ok(self.provider.call(tx.clone()).await?)
    }

    async fn pending_nonce(&self, address: Address) -> Result<u64, RpcFailure> {
        Ok(self.provider.get_transaction_count(address).pending().await?)
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64, RpcFailure> {
        Ok(self.provider.estimate_gas(tx.clone()).await?)
    }

    async fn gas_price(&self) -> Result<u128, RpcFailure> {
        Ok(self.provider.get_gas_price().await?)
    }

    async fn balance(&self, address: Address) -> Result<U256, RpcFailure> {
        Ok(self.provider.get_balance(address).await?)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, RpcFailure> {
        let pending = self.provider.send_raw_transaction(raw).await?;
        Ok(*pending.tx_hash())
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>, RpcFailure> {
        let receipt = self.provider.get_transaction_receipt(hash).await?;
        Ok(receipt.map(|r| TxReceipt {
            tx_hash: r.transaction_hash,
            success: r.status(),
            block_number: r.block_number.unwrap_or_default(),
            gas_used: r.gas_used,
            logs: r.inner.logs().iter().map(|log| log.inner.clone()).collect(),
        }))
    }
}

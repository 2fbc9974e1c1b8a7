//! Transaction dispatch pipeline: nonce → gas estimate → local signing →
//! broadcast with bounded retries → receipt polling.
//!
//! One dispatch never outlives `confirmation_timeout`, counted from the
//! start of [`TransactionDispatcher::submit`]. Every RPC round trip is raced
//! against the remaining budget on the dispatcher's [`Clock`], so a node that
//! stops answering still ends in `Pending` once a payload may have left.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, B256, Bytes, U256};
use alloy::rpc::types::TransactionRequest;

use crate::chain::{ChainRpc, RpcFailure};
use crate::clock::Clock;
use crate::error::VaultError;
use crate::revert::decode_revert_reason;
use crate::signer::{SignedTransaction, SignerKey};
use crate::types::DispatchOutcome;

/// Retry, backoff and confirmation parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchPolicy {
    /// Total broadcast attempts, including the first.
    pub max_broadcast_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Total time budget of one dispatch, from nonce lookup to receipt.
    pub confirmation_timeout: Duration,
    pub poll_interval: Duration,
    /// Longest wait for a single JSON-RPC answer.
    pub request_timeout: Duration,
    /// Added on top of the node's gas estimate.
    pub gas_buffer_percent: u64,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            max_broadcast_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            confirmation_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(2),
            request_timeout: Duration::from_secs(30),
            gas_buffer_percent: 20,
        }
    }
}

impl DispatchPolicy {
    /// Delay before broadcast attempt `attempt + 1` (1-based `attempt`).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    pub fn buffered_gas(&self, estimate: u64) -> u64 {
        estimate.saturating_add(estimate.saturating_mul(self.gas_buffer_percent) / 100)
    }
}

/// A contract call ready to be dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedTransaction {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    /// Short name for logs, e.g. `updateStrategist`.
    pub label: &'static str,
}

impl EncodedTransaction {
    pub fn new(to: Address, data: Vec<u8>, label: &'static str) -> Self {
        Self {
            to,
            data: Bytes::from(data),
            value: U256::ZERO,
            label,
        }
    }

    fn request(&self, from: Address) -> TransactionRequest {
        TransactionRequest::default()
            .from(from)
            .to(self.to)
            .input(self.data.clone().into())
            .value(self.value)
    }
}

/// A signed transaction and the parameters it was built with.
#[derive(Debug, Clone)]
pub struct PreparedTransaction {
    pub signed: SignedTransaction,
    pub nonce: u64,
    pub gas_limit: u64,
    pub gas_price: u128,
}

/// Builds, signs, broadcasts and confirms transactions.
pub struct TransactionDispatcher {
    rpc: Arc<dyn ChainRpc>,
    clock: Arc<dyn Clock>,
    chain_id: u64,
    policy: DispatchPolicy,
}

impl TransactionDispatcher {
    pub fn new(rpc: Arc<dyn ChainRpc>, clock: Arc<dyn Clock>, chain_id: u64, policy: DispatchPolicy) -> Self {
        Self {
            rpc,
            clock,
            chain_id,
            policy,
        }
    }

    /// Dispatch `tx` signed by `signer`.
    ///
    /// Flow:
    /// 1. Prepare: pending nonce, gas estimate (+buffer), gas price, balance check, sign
    /// 2. Broadcast the signed payload, retrying transient failures with backoff
    /// 3. Poll for the receipt until the confirmation timeout
    ///
    /// A missing receipt at the deadline yields [`DispatchOutcome::Pending`].
    pub async fn submit(&self, tx: &EncodedTransaction, signer: &SignerKey) -> Result<DispatchOutcome, VaultError> {
        let deadline = self.deadline();
        let prepared = self.prepare_within(tx, signer, deadline).await?;
        let tx_hash = self.broadcast_within(tx, &prepared.signed, deadline).await?;
        self.await_receipt_within(tx, signer.address(), tx_hash, deadline).await
    }

    /// Steps 1-3 of the pipeline: everything before the first broadcast.
    pub async fn prepare(&self, tx: &EncodedTransaction, signer: &SignerKey) -> Result<PreparedTransaction, VaultError> {
        self.prepare_within(tx, signer, self.deadline()).await
    }

    async fn prepare_within(
        &self,
        tx: &EncodedTransaction,
        signer: &SignerKey,
        deadline: Duration,
    ) -> Result<PreparedTransaction, VaultError> {
        let from = signer.address();
        let endpoint = self.rpc.endpoint();

        let nonce = self
            .bounded(deadline, self.rpc.pending_nonce(from))
            .await
            .map_err(|e| VaultError::rpc(&endpoint, format!("nonce lookup for {from} failed: {e}")))?;

        let estimate = self
            .bounded(deadline, self.rpc.estimate_gas(&tx.request(from).nonce(nonce)))
            .await
            .map_err(|e| self.estimate_failure(tx, e))?;
        let gas_limit = self.policy.buffered_gas(estimate);

        let gas_price = self
            .bounded(deadline, self.rpc.gas_price())
            .await
            .map_err(|e| VaultError::rpc(&endpoint, format!("gas price lookup failed: {e}")))?;

        let balance = self
            .bounded(deadline, self.rpc.balance(from))
            .await
            .map_err(|e| VaultError::rpc(&endpoint, format!("balance lookup for {from} failed: {e}")))?;
        let max_cost = U256::from(gas_limit) * U256::from(gas_price) + tx.value;
        if balance < max_cost {
            return Err(VaultError::validation(
                "signer balance",
                format!("{from} holds {balance} wei, {label} needs up to {max_cost} wei", label = tx.label),
            ));
        }

        let request = tx
            .request(from)
            .nonce(nonce)
            .gas_limit(gas_limit)
            .gas_price(gas_price)
            .with_chain_id(self.chain_id);
        let signed = signer.sign(request).await?;

        tracing::debug!(
            "Prepared {}: nonce={nonce}, gas_limit={gas_limit} (estimate {estimate}), gas_price={gas_price}, tx={}",
            tx.label,
            signed.hash
        );

        Ok(PreparedTransaction {
            signed,
            nonce,
            gas_limit,
            gas_price,
        })
    }

    /// Broadcast `signed`, retrying transient failures.
    ///
    /// Every attempt sends the same payload, so a node that accepted an
    /// earlier attempt deduplicates later ones by hash.
    pub async fn broadcast(&self, tx: &EncodedTransaction, signed: &SignedTransaction) -> Result<B256, VaultError> {
        self.broadcast_within(tx, signed, self.deadline()).await
    }

    async fn broadcast_within(
        &self,
        tx: &EncodedTransaction,
        signed: &SignedTransaction,
        deadline: Duration,
    ) -> Result<B256, VaultError> {
        let max_attempts = self.policy.max_broadcast_attempts.max(1);
        let mut attempt = 0;
        // Set once an attempt went unanswered: the node may hold the payload.
        let mut maybe_delivered = false;

        loop {
            attempt += 1;
            let result = self.bounded(deadline, self.rpc.send_raw_transaction(&signed.raw)).await;
            match result {
                Ok(node_hash) => {
                    if node_hash != signed.hash {
                        tracing::warn!(
                            "Node reported hash {node_hash} for {}, expected {}",
                            tx.label,
                            signed.hash
                        );
                    }
                    tracing::info!("Broadcast {} tx={} (attempt {attempt})", tx.label, signed.hash);
                    return Ok(signed.hash);
                }
                Err(e) if e.is_already_known() => {
                    tracing::info!("Node already holds {} tx={}", tx.label, signed.hash);
                    return Ok(signed.hash);
                }
                Err(e) if attempt > 1 && e.is_nonce_too_low() => {
                    // An earlier attempt may have been mined; only our own receipt proves it.
                    if let Ok(Some(_)) = self.bounded(deadline, self.rpc.transaction_receipt(signed.hash)).await {
                        tracing::info!("Earlier attempt of {} was mined, tx={}", tx.label, signed.hash);
                        return Ok(signed.hash);
                    }
                    return Err(self.broadcast_failure(attempt, signed, e));
                }
                Err(e) => {
                    if matches!(e, RpcFailure::Timeout(_)) {
                        maybe_delivered = true;
                    }
                    let out_of_time = self.remaining(deadline).is_zero();
                    if e.is_transient() && attempt < max_attempts && !out_of_time {
                        let delay = self.policy.backoff(attempt).min(self.remaining(deadline));
                        tracing::warn!(
                            "Broadcast of {} failed (attempt {attempt}/{max_attempts}): {e}; retrying in {delay:?}",
                            tx.label
                        );
                        self.clock.sleep(delay).await;
                        continue;
                    }
                    if maybe_delivered && e.is_transient() {
                        tracing::warn!(
                            "Broadcast of {} unanswered after {attempt} attempts; looking for tx={}",
                            tx.label,
                            signed.hash
                        );
                        return Ok(signed.hash);
                    }
                    return Err(self.broadcast_failure(attempt, signed, e));
                }
            }
        }
    }

    /// Poll for the receipt of `tx_hash` until the confirmation timeout.
    pub async fn await_receipt(&self, tx: &EncodedTransaction, from: Address, tx_hash: B256) -> Result<DispatchOutcome, VaultError> {
        self.await_receipt_within(tx, from, tx_hash, self.deadline()).await
    }

    async fn await_receipt_within(
        &self,
        tx: &EncodedTransaction,
        from: Address,
        tx_hash: B256,
        deadline: Duration,
    ) -> Result<DispatchOutcome, VaultError> {
        loop {
            match self.bounded(deadline, self.rpc.transaction_receipt(tx_hash)).await {
                Ok(Some(receipt)) if receipt.success => {
                    tracing::info!(
                        "Confirmed {} tx={tx_hash} block={} gas_used={}",
                        tx.label,
                        receipt.block_number,
                        receipt.gas_used
                    );
                    return Ok(DispatchOutcome::Confirmed(receipt));
                }
                Ok(Some(receipt)) => {
                    let reason = self.replay_revert_reason(tx, from, deadline).await;
                    tracing::warn!("{} reverted in block {}: {reason}", tx.label, receipt.block_number);
                    return Err(VaultError::Revert {
                        reason,
                        tx_hash: Some(tx_hash.to_string()),
                    });
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Receipt poll for {tx_hash} failed: {e}"),
            }

            let remaining = self.remaining(deadline);
            if remaining.is_zero() {
                tracing::warn!(
                    "No receipt for {} tx={tx_hash} within {:?}; reporting pending",
                    tx.label,
                    self.policy.confirmation_timeout
                );
                return Ok(DispatchOutcome::Pending { tx_hash });
            }
            self.clock.sleep(self.policy.poll_interval.min(remaining)).await;
        }
    }

    fn deadline(&self) -> Duration {
        self.clock.elapsed() + self.policy.confirmation_timeout
    }

    fn remaining(&self, deadline: Duration) -> Duration {
        deadline.saturating_sub(self.clock.elapsed())
    }

    /// Await one RPC round trip, giving up after `request_timeout` or at
    /// `deadline`, whichever comes first.
    async fn bounded<T>(
        &self,
        deadline: Duration,
        request: impl Future<Output = Result<T, RpcFailure>>,
    ) -> Result<T, RpcFailure> {
        let limit = self.policy.request_timeout.min(self.remaining(deadline));
        tokio::select! {
            biased;
            result = request => result,
            _ = self.clock.sleep(limit) => Err(RpcFailure::Timeout(limit)),
        }
    }

    /// Re-run a reverted call to recover its revert reason.
    async fn replay_revert_reason(&self, tx: &EncodedTransaction, from: Address, deadline: Duration) -> String {
        match self.bounded(deadline, self.rpc.call(&tx.request(from))).await {
            Err(e) => match e.revert_data() {
                Some(data) => decode_revert_reason(data),
                None => e.to_string(),
            },
            Ok(_) => "reverted on-chain; replay at the latest block succeeded, reason unavailable".to_string(),
        }
    }

    fn estimate_failure(&self, tx: &EncodedTransaction, e: RpcFailure) -> VaultError {
        let reverted = match &e {
            RpcFailure::Rejected { message, data, .. } => {
                data.is_some() || message.to_ascii_lowercase().contains("revert")
            }
            _ => false,
        };
        if reverted {
            let reason = match e.revert_data() {
                Some(data) => decode_revert_reason(data),
                None => e.to_string(),
            };
            tracing::warn!("Gas estimation for {} reverted: {reason}", tx.label);
            VaultError::Revert { reason, tx_hash: None }
        } else {
            VaultError::rpc(self.rpc.endpoint(), format!("gas estimation for {} failed: {e}", tx.label))
        }
    }

    fn broadcast_failure(&self, attempts: u32, signed: &SignedTransaction, e: RpcFailure) -> VaultError {
        VaultError::Broadcast {
            attempts,
            tx_hash: signed.hash.to_string(),
            message: format!("{e} (endpoint {})", self.rpc.endpoint()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = DispatchPolicy::default();
        assert_eq!(policy.max_broadcast_attempts, 3);
        assert_eq!(policy.confirmation_timeout, Duration::from_secs(120));
        assert_eq!(policy.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = DispatchPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_secs(1));
        assert_eq!(policy.backoff(3), Duration::from_secs(2));
        assert_eq!(policy.backoff(5), Duration::from_secs(8));
        assert_eq!(policy.backoff(40), Duration::from_secs(8));
    }

    #[test]
    fn test_gas_buffer() {
        let policy = DispatchPolicy::default();
        assert_eq!(policy.buffered_gas(100_000), 120_000);
        assert_eq!(policy.buffered_gas(u64::MAX), u64::MAX);
    }

    #[test]
    fn test_encoded_transaction_request() {
        let to = Address::repeat_byte(0x22);
        let from = Address::repeat_byte(0x33);
        let tx = EncodedTransaction::new(to, vec![1, 2, 3], "test");
        let request = tx.request(from);
        assert_eq!(request.from, Some(from));
        assert_eq!(request.input.input().map(|b| b.to_vec()), Some(vec![1, 2, 3]));
    }
}

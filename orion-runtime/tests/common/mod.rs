//! Scripted chain and fixtures shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use alloy::primitives::{Address, B256, Bytes, Log, U256, keccak256};
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::{SolCall, SolValue};
use async_trait::async_trait;

use orion_runtime::chain::{ChainRpc, RpcFailure};
use orion_runtime::clock::ManualClock;
use orion_runtime::commands::CommandContext;
use orion_runtime::config::Settings;
use orion_runtime::contracts::{IOrionConfig, IOrionTransparentVault};
use orion_runtime::dispatcher::DispatchPolicy;
use orion_runtime::signer::SignerKey;
use orion_runtime::types::TxReceipt;

// Hardhat accounts #0 and #1
pub const MANAGER_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const STRATEGIST_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

pub const CONFIG: Address = Address::repeat_byte(0xc0);
pub const FACTORY: Address = Address::repeat_byte(0xfa);
pub const VAULT: Address = Address::repeat_byte(0x5a);
pub const ASSET_A: Address = Address::repeat_byte(0xa1);
pub const ASSET_B: Address = Address::repeat_byte(0xb2);

static LOG_INIT: Once = Once::new();

pub fn setup_log() {
    LOG_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

pub fn manager() -> SignerKey {
    SignerKey::new(MANAGER_KEY).unwrap()
}

pub fn strategist() -> SignerKey {
    SignerKey::new(STRATEGIST_KEY).unwrap()
}

/// ABI-encode a single return value.
pub fn ret<T: SolValue>(value: T) -> Bytes {
    Bytes::from((value,).abi_encode_params())
}

/// `execution reverted` answer carrying `data`.
pub fn reverted(data: Vec<u8>) -> RpcFailure {
    RpcFailure::Rejected {
        code: 3,
        message: "execution reverted".into(),
        data: Some(Bytes::from(data)),
    }
}

pub fn transport_error() -> RpcFailure {
    RpcFailure::Transport("connection reset by peer".into())
}

/// When the chain hands out a receipt for a broadcast transaction.
#[derive(Debug, Clone)]
pub enum ReceiptMode {
    /// Never mined.
    Never,
    /// The node never answers receipt queries.
    Hang,
    /// Mined after `polls` empty polls.
    After { polls: usize, success: bool, logs: Vec<Log> },
}

struct State {
    chain_id: u64,
    calls: HashMap<(Address, [u8; 4]), Result<Bytes, RpcFailure>>,
    nonce: u64,
    gas_estimate: Result<u64, RpcFailure>,
    gas_price: u128,
    balance: U256,
    send_script: VecDeque<Result<(), RpcFailure>>,
    /// Broadcasts reach the node but are never answered.
    hang_sends: bool,
    receipt_mode: ReceiptMode,
    receipt_polls: usize,
    /// Every raw payload handed to `send_raw_transaction`, accepted or not.
    sent: Vec<Bytes>,
    estimates: Vec<TransactionRequest>,
    rpc_count: usize,
}

/// In-memory [`ChainRpc`] with scripted answers.
pub struct MockChain {
    state: Mutex<State>,
}

impl MockChain {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                chain_id: 31337,
                calls: HashMap::new(),
                nonce: 7,
                gas_estimate: Ok(100_000),
                gas_price: 1_000_000_000,
                balance: U256::from(10u64).pow(U256::from(18u64)),
                send_script: VecDeque::new(),
                hang_sends: false,
                receipt_mode: ReceiptMode::After {
                    polls: 0,
                    success: true,
                    logs: vec![],
                },
                receipt_polls: 0,
                sent: vec![],
                estimates: vec![],
                rpc_count: 0,
            }),
        }
    }

    pub fn on_call<C: SolCall>(&self, to: Address, answer: Result<Bytes, RpcFailure>) {
        self.state.lock().unwrap().calls.insert((to, C::SELECTOR), answer);
    }

    pub fn set_gas_estimate(&self, estimate: Result<u64, RpcFailure>) {
        self.state.lock().unwrap().gas_estimate = estimate;
    }

    pub fn set_balance(&self, balance: U256) {
        self.state.lock().unwrap().balance = balance;
    }

    /// Answers for successive broadcasts; once exhausted every broadcast succeeds.
    pub fn script_sends(&self, script: Vec<Result<(), RpcFailure>>) {
        self.state.lock().unwrap().send_script = script.into();
    }

    pub fn hang_sends(&self) {
        self.state.lock().unwrap().hang_sends = true;
    }

    pub fn set_receipt_mode(&self, mode: ReceiptMode) {
        self.state.lock().unwrap().receipt_mode = mode;
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn estimates(&self) -> Vec<TransactionRequest> {
        self.state.lock().unwrap().estimates.clone()
    }

    /// Call data of every transaction that reached gas estimation.
    pub fn estimated_inputs(&self) -> Vec<Bytes> {
        self.estimates()
            .into_iter()
            .filter_map(|tx| tx.input.input().cloned())
            .collect()
    }

    pub fn rpc_count(&self) -> usize {
        self.state.lock().unwrap().rpc_count
    }

    /// A registered, idle vault managed by account #0 with strategist #1.
    pub fn with_vault() -> Self {
        let chain = Self::new();
        chain.on_call::<IOrionConfig::isSystemIdleCall>(CONFIG, Ok(ret(true)));
        chain.on_call::<IOrionConfig::isWhitelistedManagerCall>(CONFIG, Ok(ret(true)));
        chain.on_call::<IOrionConfig::strategistIntentDecimalsCall>(CONFIG, Ok(ret(9u16)));
        chain.on_call::<IOrionConfig::getAllWhitelistedAssetsCall>(CONFIG, Ok(ret(vec![ASSET_A, ASSET_B])));
        chain.on_call::<IOrionConfig::transparentVaultFactoryCall>(CONFIG, Ok(ret(FACTORY)));
        chain.on_call::<IOrionConfig::getAllOrionVaultsCall>(CONFIG, Ok(ret(vec![VAULT])));

        chain.on_call::<IOrionTransparentVault::managerCall>(VAULT, Ok(ret(manager().address())));
        chain.on_call::<IOrionTransparentVault::strategistCall>(VAULT, Ok(ret(strategist().address())));
        chain.set_fee_model(0, 1000, 100);
        chain.on_call::<IOrionTransparentVault::MAX_PERFORMANCE_FEECall>(VAULT, Ok(ret(3000u16)));
        chain.on_call::<IOrionTransparentVault::MAX_MANAGEMENT_FEECall>(VAULT, Ok(ret(300u16)));
        chain.on_call::<IOrionTransparentVault::depositAccessControlCall>(VAULT, Ok(ret(Address::ZERO)));
        chain.on_call::<IOrionTransparentVault::isDecommissioningCall>(VAULT, Ok(ret(false)));
        chain
    }

    pub fn set_fee_model(&self, fee_type: u8, performance: u16, management: u16) {
        let model = IOrionTransparentVault::FeeModel {
            feeType: fee_type,
            performanceFee: performance,
            managementFee: management,
            highWaterMark: U256::ZERO,
        };
        self.on_call::<IOrionTransparentVault::activeFeeModelCall>(VAULT, Ok(ret(model)));
    }

    fn bump(&self) -> std::sync::MutexGuard<'_, State> {
        let mut state = self.state.lock().unwrap();
        state.rpc_count += 1;
        state
    }

    /// `None` when the node leaves the broadcast unanswered.
    fn send_answer(&self, raw: &[u8]) -> Option<Result<B256, RpcFailure>> {
        let mut state = self.bump();
        state.sent.push(Bytes::copy_from_slice(raw));
        if state.hang_sends {
            return None;
        }
        match state.send_script.pop_front() {
            Some(Err(e)) => Some(Err(e)),
            _ => Some(Ok(keccak256(raw))),
        }
    }

    /// `None` when the node leaves the receipt query unanswered.
    fn receipt_answer(&self, hash: B256) -> Option<Result<Option<TxReceipt>, RpcFailure>> {
        let mut state = self.bump();
        let known = state.sent.iter().any(|raw| keccak256(raw) == hash);
        let (polls, success, logs) = match &state.receipt_mode {
            ReceiptMode::Hang => return None,
            ReceiptMode::After { polls, success, logs } if known => (*polls, *success, logs.clone()),
            _ => return Some(Ok(None)),
        };
        if state.receipt_polls < polls {
            state.receipt_polls += 1;
            return Some(Ok(None));
        }
        Some(Ok(Some(TxReceipt {
            tx_hash: hash,
            success,
            block_number: 1234,
            gas_used: 84_000,
            logs,
        })))
    }
}

#[async_trait]
impl ChainRpc for MockChain {
    fn endpoint(&self) -> String {
        "mock://chain".to_string()
    }

    async fn chain_id(&self) -> Result<u64, RpcFailure> {
        Ok(self.bump().chain_id)
    }

    async fn call(&self, tx: &TransactionRequest) -> Result<Bytes, RpcFailure> {
        let state = self.bump();
        let to = tx.to.and_then(|kind| kind.to().copied()).unwrap_or_default();
        let input = tx.input.input().cloned().unwrap_or_default();
        if input.len() < 4 {
            return Err(RpcFailure::Other("call without selector".into()));
        }
        let selector = [input[0], input[1], input[2], input[3]];
        state
            .calls
            .get(&(to, selector))
            .cloned()
            .unwrap_or_else(|| Err(RpcFailure::Other(format!("unscripted call 0x{} on {to}", hex::encode(selector)))))
    }

    async fn pending_nonce(&self, _address: Address) -> Result<u64, RpcFailure> {
        Ok(self.bump().nonce)
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64, RpcFailure> {
        let mut state = self.bump();
        state.estimates.push(tx.clone());
        state.gas_estimate.clone()
    }

    async fn gas_price(&self) -> Result<u128, RpcFailure> {
        Ok(self.bump().gas_price)
    }

    async fn balance(&self, _address: Address) -> Result<U256, RpcFailure> {
        Ok(self.bump().balance)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256, RpcFailure> {
        match self.send_answer(raw) {
            Some(answer) => answer,
            None => std::future::pending().await,
        }
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<TxReceipt>, RpcFailure> {
        match self.receipt_answer(hash) {
            Some(answer) => answer,
            None => std::future::pending().await,
        }
    }
}

pub fn settings() -> Settings {
    let vars: HashMap<&str, String> = HashMap::from([
        ("RPC_URL", "http://localhost:8545".to_string()),
        ("CHAIN_ID", "31337".to_string()),
        ("ORION_CONFIG_ADDRESS", CONFIG.to_string()),
        ("ORION_TX_POLL_INTERVAL_MS", "2000".to_string()),
    ]);
    Settings::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

pub fn policy() -> DispatchPolicy {
    settings().dispatch
}

/// Command context over `chain` with a virtual clock.
pub fn context(chain: &Arc<MockChain>) -> (CommandContext, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let ctx = CommandContext::new(chain.clone(), clock.clone(), &settings());
    (ctx, clock)
}

pub fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

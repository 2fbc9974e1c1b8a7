//! Vault lifecycle commands: deploy, submit order intents, update
//! strategist / fee model / deposit access control, inspect.
//!
//! Each command validates everything it can locally before touching the
//! chain, then reads fresh on-chain state, and only dispatches when the
//! requested change differs from what the vault already holds.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use alloy::primitives::{Address, B256};
use alloy::sol_types::SolEvent;
use rust_decimal::Decimal;

use crate::chain::{ChainClient, ChainRpc};
use crate::clock::{Clock, TokioClock};
use crate::config::Settings;
use crate::contracts::ITransparentVaultFactory::OrionVaultCreated;
use crate::dispatcher::{EncodedTransaction, TransactionDispatcher};
use crate::error::{VaultError, exit_code};
use crate::fees::{FeeRequest, validate_vault_name, validate_vault_symbol};
use crate::intent::AllocationIntent;
use crate::signer::SignerKey;
use crate::types::{DispatchOutcome, TxReceipt, VaultConfig, VaultType};
use crate::vault_client::{
    VaultClient, encode_create_vault, encode_set_deposit_access_control, encode_submit_intent,
    encode_update_fee_model, encode_update_strategist,
};

/// Shared state for one command invocation.
pub struct CommandContext {
    client: VaultClient,
    dispatcher: TransactionDispatcher,
    intent_tolerance: Decimal,
}

impl CommandContext {
    pub fn new(rpc: Arc<dyn ChainRpc>, clock: Arc<dyn Clock>, settings: &Settings) -> Self {
        Self::for_chain(rpc, clock, settings.chain_id, settings)
    }

    /// Like [`CommandContext::new`], signing for `chain_id` instead of `settings.chain_id`.
    pub fn for_chain(rpc: Arc<dyn ChainRpc>, clock: Arc<dyn Clock>, chain_id: u64, settings: &Settings) -> Self {
        Self {
            client: VaultClient::new(rpc.clone(), settings.orion_config),
            dispatcher: TransactionDispatcher::new(rpc, clock, chain_id, settings.dispatch.clone()),
            intent_tolerance: settings.intent_tolerance,
        }
    }

    /// Connect to `settings.rpc_url` and confirm the node's chain id.
    ///
    /// A chain id differing from `CHAIN_ID` is logged; transactions are
    /// signed for the chain the node reports.
    pub async fn connect(settings: &Settings) -> Result<Self, VaultError> {
        let rpc = Arc::new(ChainClient::from_url(
            settings.rpc_url.clone(),
            settings.dispatch.request_timeout,
        )?);
        let node_chain_id = rpc
            .chain_id()
            .await
            .map_err(|e| VaultError::rpc(rpc.endpoint(), format!("chain id lookup failed: {e}")))?;

        if node_chain_id != settings.chain_id {
            tracing::warn!(
                "RPC reports chain {node_chain_id} but CHAIN_ID is {}; signing for chain {node_chain_id}",
                settings.chain_id
            );
        }
        tracing::info!("Connected to {} (chain {node_chain_id})", rpc.endpoint());

        Ok(Self::for_chain(rpc, Arc::new(TokioClock::new()), node_chain_id, settings))
    }

    async fn ensure_idle(&self, action: &str) -> Result<(), VaultError> {
        if self.client.is_system_idle().await? {
            Ok(())
        } else {
            Err(VaultError::SystemNotIdle(action.to_string()))
        }
    }

    async fn dispatch(
        &self,
        tx: &EncodedTransaction,
        signer: &SignerKey,
    ) -> Result<DispatchOutcome, VaultError> {
        tracing::info!("Dispatching {} to {} from {}", tx.label, tx.to, signer.address());
        self.dispatcher.submit(tx, signer).await
    }
}

/// Parameters of a new transparent vault.
#[derive(Debug, Clone)]
pub struct DeployVaultRequest {
    pub vault_type: VaultType,
    pub name: String,
    pub symbol: String,
    pub strategist: Address,
    pub fees: FeeRequest,
    /// Zero for open deposits.
    pub deposit_access_control: Address,
}

impl DeployVaultRequest {
    /// Checks that need no chain access.
    pub fn validate(&self) -> Result<(), VaultError> {
        if self.vault_type != VaultType::Transparent {
            return Err(VaultError::validation(
                "vault type",
                "only transparent vaults can be deployed by this client",
            ));
        }
        validate_vault_name(&self.name)?;
        validate_vault_symbol(&self.symbol)?;
        self.fees.validate_protocol_bounds()?;
        if self.strategist == Address::ZERO {
            return Err(VaultError::validation("strategist", "must not be the zero address"));
        }
        Ok(())
    }
}

/// Result of a command that completed without error.
#[derive(Debug, Clone)]
pub enum CommandOutcome {
    Confirmed {
        action: &'static str,
        tx_hash: B256,
        block_number: u64,
        gas_used: u64,
        /// Address of a newly deployed vault.
        vault: Option<Address>,
    },
    /// Requested state already in place; nothing was sent.
    NoOp { reason: String },
    /// Broadcast but unconfirmed when the wait expired.
    Pending { action: &'static str, tx_hash: B256 },
    Info(Box<VaultConfig>),
}

impl CommandOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            CommandOutcome::Pending { .. } => exit_code::PENDING,
            _ => exit_code::SUCCESS,
        }
    }

    pub fn tx_hash(&self) -> Option<B256> {
        match self {
            CommandOutcome::Confirmed { tx_hash, .. } | CommandOutcome::Pending { tx_hash, .. } => Some(*tx_hash),
            _ => None,
        }
    }

    fn from_dispatch(action: &'static str, outcome: DispatchOutcome, vault: Option<Address>) -> Self {
        match outcome {
            DispatchOutcome::Confirmed(receipt) => CommandOutcome::Confirmed {
                action,
                tx_hash: receipt.tx_hash,
                block_number: receipt.block_number,
                gas_used: receipt.gas_used,
                vault,
            },
            DispatchOutcome::Pending { tx_hash } => CommandOutcome::Pending { action, tx_hash },
        }
    }
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandOutcome::Confirmed {
                action,
                tx_hash,
                block_number,
                gas_used,
                vault,
            } => {
                write!(f, "{action} confirmed: tx {tx_hash} in block {block_number} (gas used {gas_used})")?;
                if let Some(vault) = vault {
                    write!(f, "\nvault address: {vault}")?;
                }
                Ok(())
            }
            CommandOutcome::NoOp { reason } => write!(f, "no-op: {reason}"),
            CommandOutcome::Pending { action, tx_hash } => write!(
                f,
                "PENDING: {action} tx {tx_hash} was broadcast but not confirmed yet; check it on a block explorer"
            ),
            CommandOutcome::Info(config) => {
                let json = serde_json::to_string_pretty(config).map_err(|_| fmt::Error)?;
                f.write_str(&json)
            }
        }
    }
}

/// Deploy a new transparent vault through the factory.
///
/// Fee parameters, name and symbol are validated before any RPC call.
pub async fn deploy_vault(
    ctx: &CommandContext,
    manager: &SignerKey,
    request: &DeployVaultRequest,
) -> Result<CommandOutcome, VaultError> {
    request.validate()?;

    ctx.ensure_idle("deploy vault").await?;

    let manager_address = manager.address();
    if !ctx.client.is_whitelisted_manager(manager_address).await? {
        return Err(VaultError::validation(
            "manager",
            format!("{manager_address} is not whitelisted as a vault manager in OrionConfig"),
        ));
    }

    let factory = ctx.client.transparent_vault_factory().await?;
    let tx = encode_create_vault(
        factory,
        request.strategist,
        &request.name,
        &request.symbol,
        &request.fees,
        request.deposit_access_control,
    );

    let outcome = ctx.dispatch(&tx, manager).await?;
    let vault = match &outcome {
        DispatchOutcome::Confirmed(receipt) => {
            let vault = created_vault(receipt, factory);
            match vault {
                Some(vault) => tracing::info!("Deployed vault {vault} ({})", request.name),
                None => tracing::warn!("No OrionVaultCreated event in receipt {}", receipt.tx_hash),
            }
            vault
        }
        DispatchOutcome::Pending { .. } => None,
    };
    Ok(CommandOutcome::from_dispatch("deploy-vault", outcome, vault))
}

/// Address of the vault announced by `factory` in `receipt`.
fn created_vault(receipt: &TxReceipt, factory: Address) -> Option<Address> {
    receipt
        .logs
        .iter()
        .filter(|log| log.address == factory)
        .find_map(|log| OrionVaultCreated::decode_log(log).ok())
        .map(|event| event.data.vault)
}

/// Parse the intent file at `intent_path` and submit it as `signer`.
pub async fn submit_order(
    ctx: &CommandContext,
    strategist: &SignerKey,
    vault: Address,
    intent_path: &Path,
) -> Result<CommandOutcome, VaultError> {
    let intent = AllocationIntent::from_file(intent_path, ctx.intent_tolerance)?;
    submit_intent(ctx, strategist, vault, &intent).await
}

/// Submit an already validated intent.
///
/// The vault accepts intents when the system is idle, the vault is
/// registered and not decommissioning, and `strategist` is its strategist.
/// The fetched `deposit_access_control` is not consulted: it gates
/// depositors, not the strategist's intents.
pub async fn submit_intent(
    ctx: &CommandContext,
    strategist: &SignerKey,
    vault: Address,
    intent: &AllocationIntent,
) -> Result<CommandOutcome, VaultError> {
    tracing::info!("Order intent for {vault}: {intent}");
    ctx.ensure_idle("submit order intent").await?;
    ctx.client.ensure_registered(vault).await?;

    let config = ctx.client.fetch(vault).await?;
    let signer = strategist.address();
    if config.strategist != signer {
        return Err(VaultError::validation(
            "signer",
            format!("{signer} is not the strategist of vault {vault} ({})", config.strategist),
        ));
    }
    if config.is_decommissioning {
        return Err(VaultError::validation(
            "vault",
            format!("{vault} is decommissioning and no longer accepts order intents"),
        ));
    }

    let whitelist = ctx.client.whitelisted_assets().await?;
    intent.ensure_whitelisted(&whitelist)?;

    let decimals = ctx.client.intent_decimals().await?;
    let tx = encode_submit_intent(vault, intent, decimals)?;
    tracing::debug!("Intent fingerprint {}", intent.fingerprint(decimals)?);

    let outcome = ctx.dispatch(&tx, strategist).await?;
    Ok(CommandOutcome::from_dispatch("submit-order", outcome, None))
}

pub async fn update_strategist(
    ctx: &CommandContext,
    manager: &SignerKey,
    vault: Address,
    new_strategist: Address,
) -> Result<CommandOutcome, VaultError> {
    if new_strategist == Address::ZERO {
        return Err(VaultError::validation("strategist", "must not be the zero address"));
    }

    let config = managed_vault(ctx, manager, vault).await?;
    if config.strategist == new_strategist {
        return Ok(CommandOutcome::NoOp {
            reason: format!("{new_strategist} is already the strategist of {vault}"),
        });
    }

    ctx.ensure_idle("update strategist").await?;
    let tx = encode_update_strategist(vault, new_strategist);
    let outcome = ctx.dispatch(&tx, manager).await?;
    Ok(CommandOutcome::from_dispatch("update-strategist", outcome, None))
}

pub async fn update_fee_model(
    ctx: &CommandContext,
    manager: &SignerKey,
    vault: Address,
    fees: FeeRequest,
) -> Result<CommandOutcome, VaultError> {
    fees.validate_protocol_bounds()?;

    let config = managed_vault(ctx, manager, vault).await?;
    fees.validate_bounds(config.max_performance_fee_bps, config.max_management_fee_bps)?;
    if !config
        .fee_model
        .differs_from(fees.fee_type, fees.performance_fee_bps, fees.management_fee_bps)
    {
        return Ok(CommandOutcome::NoOp {
            reason: format!(
                "{vault} already uses {} with {} bps performance / {} bps management fee",
                fees.fee_type, fees.performance_fee_bps, fees.management_fee_bps
            ),
        });
    }

    ctx.ensure_idle("update fee model").await?;
    let tx = encode_update_fee_model(vault, &fees);
    let outcome = ctx.dispatch(&tx, manager).await?;
    Ok(CommandOutcome::from_dispatch("update-fee-model", outcome, None))
}

pub async fn set_deposit_access_control(
    ctx: &CommandContext,
    manager: &SignerKey,
    vault: Address,
    access_control: Address,
) -> Result<CommandOutcome, VaultError> {
    let config = managed_vault(ctx, manager, vault).await?;
    if config.deposit_access_control == access_control {
        return Ok(CommandOutcome::NoOp {
            reason: format!("{vault} already uses deposit access control {access_control}"),
        });
    }

    ctx.ensure_idle("set deposit access control").await?;
    let tx = encode_set_deposit_access_control(vault, access_control);
    let outcome = ctx.dispatch(&tx, manager).await?;
    Ok(CommandOutcome::from_dispatch("set-deposit-access-control", outcome, None))
}

/// Read-only snapshot of a registered vault.
pub async fn vault_info(ctx: &CommandContext, vault: Address) -> Result<CommandOutcome, VaultError> {
    ctx.client.ensure_registered(vault).await?;
    let config = ctx.client.fetch(vault).await?;
    Ok(CommandOutcome::Info(Box::new(config)))
}

/// Fetch `vault` and require `manager` to be its manager.
async fn managed_vault(
    ctx: &CommandContext,
    manager: &SignerKey,
    vault: Address,
) -> Result<VaultConfig, VaultError> {
    ctx.client.ensure_registered(vault).await?;
    let config = ctx.client.fetch(vault).await?;
    let signer = manager.address();
    if config.manager != signer {
        return Err(VaultError::validation(
            "signer",
            format!("{signer} is not the manager of vault {vault} ({})", config.manager),
        ));
    }
    Ok(config)
}

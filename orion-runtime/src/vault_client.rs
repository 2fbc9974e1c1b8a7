//! Read access to Orion vaults and the protocol config registry.
//!
//! Uses alloy contract bindings from `crate::contracts` for ABI encoding of
//! both the `eth_call` reads and the state-changing calls handed to the
//! dispatcher. Reads fail fast: a failed call is reported with the endpoint
//! and never retried.

use std::sync::Arc;

use alloy::primitives::{Address, Bytes};
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::SolCall;

use crate::chain::ChainRpc;
use crate::contracts::{IOrionConfig, IOrionTransparentVault, ITransparentVaultFactory, TRANSPARENT_VAULT_KIND};
use crate::dispatcher::EncodedTransaction;
use crate::error::VaultError;
use crate::fees::FeeRequest;
use crate::intent::AllocationIntent;
use crate::types::{FeeModel, FeeType, VaultConfig};

/// Reads vault and protocol state over a [`ChainRpc`].
#[derive(Clone)]
pub struct VaultClient {
    rpc: Arc<dyn ChainRpc>,
    config_address: Address,
}

impl VaultClient {
    pub fn new(rpc: Arc<dyn ChainRpc>, config_address: Address) -> Self {
        Self { rpc, config_address }
    }

    /// Snapshot of a vault's configuration.
    pub async fn fetch(&self, vault: Address) -> Result<VaultConfig, VaultError> {
        let manager = self.read(vault, IOrionTransparentVault::managerCall {}).await?;
        let strategist = self.read(vault, IOrionTransparentVault::strategistCall {}).await?;
        let fee_model = self.read(vault, IOrionTransparentVault::activeFeeModelCall {}).await?;
        let max_performance_fee_bps = self
            .read(vault, IOrionTransparentVault::MAX_PERFORMANCE_FEECall {})
            .await?;
        let max_management_fee_bps = self
            .read(vault, IOrionTransparentVault::MAX_MANAGEMENT_FEECall {})
            .await?;
        let deposit_access_control = self
            .read(vault, IOrionTransparentVault::depositAccessControlCall {})
            .await?;
        let is_decommissioning = self
            .read(vault, IOrionTransparentVault::isDecommissioningCall {})
            .await?;

        let fee_type = FeeType::from_u8(fee_model.feeType).map_err(|_| {
            VaultError::rpc(
                self.rpc.endpoint(),
                format!("vault {vault} reports unknown fee type {}", fee_model.feeType),
            )
        })?;

        Ok(VaultConfig {
            vault,
            manager,
            strategist,
            fee_model: FeeModel {
                fee_type,
                performance_fee_bps: fee_model.performanceFee,
                management_fee_bps: fee_model.managementFee,
                high_water_mark: fee_model.highWaterMark,
            },
            max_performance_fee_bps,
            max_management_fee_bps,
            deposit_access_control,
            is_decommissioning,
        })
    }

    pub async fn is_system_idle(&self) -> Result<bool, VaultError> {
        self.read(self.config_address, IOrionConfig::isSystemIdleCall {}).await
    }

    pub async fn is_whitelisted_manager(&self, manager: Address) -> Result<bool, VaultError> {
        self.read(self.config_address, IOrionConfig::isWhitelistedManagerCall { manager })
            .await
    }

    pub async fn intent_decimals(&self) -> Result<u8, VaultError> {
        self.read(self.config_address, IOrionConfig::strategistIntentDecimalsCall {})
            .await
    }

    pub async fn whitelisted_assets(&self) -> Result<Vec<Address>, VaultError> {
        self.read(self.config_address, IOrionConfig::getAllWhitelistedAssetsCall {})
            .await
    }

    pub async fn transparent_vault_factory(&self) -> Result<Address, VaultError> {
        let factory = self
            .read(self.config_address, IOrionConfig::transparentVaultFactoryCall {})
            .await?;
        if factory == Address::ZERO {
            return Err(VaultError::Config(format!(
                "OrionConfig {} has no transparent vault factory",
                self.config_address
            )));
        }
        Ok(factory)
    }

    pub async fn transparent_vaults(&self) -> Result<Vec<Address>, VaultError> {
        self.read(
            self.config_address,
            IOrionConfig::getAllOrionVaultsCall {
                vaultType: TRANSPARENT_VAULT_KIND,
            },
        )
        .await
    }

    /// Fail unless `vault` is registered as a transparent vault.
    pub async fn ensure_registered(&self, vault: Address) -> Result<(), VaultError> {
        if self.transparent_vaults().await?.contains(&vault) {
            Ok(())
        } else {
            Err(VaultError::validation(
                "vault address",
                format!("{vault} is not a registered Orion transparent vault"),
            ))
        }
    }

    async fn read<C: SolCall>(&self, to: Address, call: C) -> Result<C::Return, VaultError> {
        let request = TransactionRequest::default()
            .to(to)
            .input(Bytes::from(call.abi_encode()).into());
        let output = self
            .rpc
            .call(&request)
            .await
            .map_err(|e| VaultError::rpc(self.rpc.endpoint(), format!("{} on {to} failed: {e}", C::SIGNATURE)))?;
        tracing::debug!("{} on {to} returned {} bytes", C::SIGNATURE, output.len());
        C::abi_decode_returns(&output).map_err(|e| {
            VaultError::rpc(
                self.rpc.endpoint(),
                format!("cannot decode {} result from {to}: {e}", C::SIGNATURE),
            )
        })
    }
}

/// Encode `createVault` on the transparent vault factory.
pub fn encode_create_vault(
    factory: Address,
    strategist: Address,
    name: &str,
    symbol: &str,
    fees: &FeeRequest,
    deposit_access_control: Address,
) -> EncodedTransaction {
    let call = ITransparentVaultFactory::createVaultCall {
        strategist,
        name: name.to_string(),
        symbol: symbol.to_string(),
        feeType: fees.fee_type.as_u8(),
        performanceFee: fees.performance_fee_bps,
        managementFee: fees.management_fee_bps,
        depositAccessControl: deposit_access_control,
    };
    EncodedTransaction::new(factory, call.abi_encode(), "createVault")
}

/// Encode `submitIntent` with weights quantized to `decimals`.
pub fn encode_submit_intent(
    vault: Address,
    intent: &AllocationIntent,
    decimals: u8,
) -> Result<EncodedTransaction, VaultError> {
    Ok(EncodedTransaction::new(vault, intent.encode_call(decimals)?, "submitIntent"))
}

pub fn encode_update_strategist(vault: Address, new_strategist: Address) -> EncodedTransaction {
    let call = IOrionTransparentVault::updateStrategistCall {
        newStrategist: new_strategist,
    };
    EncodedTransaction::new(vault, call.abi_encode(), "updateStrategist")
}

pub fn encode_update_fee_model(vault: Address, fees: &FeeRequest) -> EncodedTransaction {
    let call = IOrionTransparentVault::updateFeeModelCall {
        feeType: fees.fee_type.as_u8(),
        performanceFee: fees.performance_fee_bps,
        managementFee: fees.management_fee_bps,
    };
    EncodedTransaction::new(vault, call.abi_encode(), "updateFeeModel")
}

pub fn encode_set_deposit_access_control(vault: Address, access_control: Address) -> EncodedTransaction {
    let call = IOrionTransparentVault::setDepositAccessControlCall {
        accessControl: access_control,
    };
    EncodedTransaction::new(vault, call.abi_encode(), "setDepositAccessControl")
}

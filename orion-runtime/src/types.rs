use std::fmt;
use std::str::FromStr;

use alloy::primitives::{Address, B256, Log, U256};
use serde::{Deserialize, Serialize};

use crate::error::VaultError;

/// Fee accrual model of a vault. Discriminants match the on-chain enum.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FeeType {
    /// Fee on the latest return, no hurdle or high-water mark.
    Absolute,
    /// Fee unlocked once the hurdle rate is reached.
    SoftHurdle,
    /// Fee only above a fixed hurdle rate.
    HardHurdle,
    /// Fee only on gains above the previous peak.
    HighWaterMark,
    /// Hard hurdle combined with a high-water mark.
    HurdleHwm,
}

impl FeeType {
    pub const ALL: [FeeType; 5] = [
        FeeType::Absolute,
        FeeType::SoftHurdle,
        FeeType::HardHurdle,
        FeeType::HighWaterMark,
        FeeType::HurdleHwm,
    ];

    pub fn as_u8(self) -> u8 {
        match self {
            FeeType::Absolute => 0,
            FeeType::SoftHurdle => 1,
            FeeType::HardHurdle => 2,
            FeeType::HighWaterMark => 3,
            FeeType::HurdleHwm => 4,
        }
    }

    pub fn from_u8(value: u8) -> Result<Self, VaultError> {
        FeeType::ALL
            .into_iter()
            .find(|t| t.as_u8() == value)
            .ok_or_else(|| VaultError::validation("fee type", format!("unknown discriminant {value}")))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeeType::Absolute => "absolute",
            FeeType::SoftHurdle => "soft_hurdle",
            FeeType::HardHurdle => "hard_hurdle",
            FeeType::HighWaterMark => "high_water_mark",
            FeeType::HurdleHwm => "hurdle_hwm",
        }
    }
}

impl fmt::Display for FeeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeeType {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        FeeType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| {
                VaultError::validation(
                    "fee type",
                    format!(
                        "'{s}' is not one of {}",
                        FeeType::ALL.map(FeeType::as_str).join(", ")
                    ),
                )
            })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VaultType {
    Transparent,
    Encrypted,
}

impl FromStr for VaultType {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "transparent" => Ok(VaultType::Transparent),
            "encrypted" => Ok(VaultType::Encrypted),
            other => Err(VaultError::validation(
                "vault type",
                format!("'{other}' is not one of transparent, encrypted"),
            )),
        }
    }
}

/// Fee parameters as stored by a vault. Fees are in basis points.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FeeModel {
    pub fee_type: FeeType,
    pub performance_fee_bps: u16,
    pub management_fee_bps: u16,
    pub high_water_mark: U256,
}

impl FeeModel {
    /// Whether applying `(fee_type, performance, management)` would change this model.
    pub fn differs_from(&self, fee_type: FeeType, performance_fee_bps: u16, management_fee_bps: u16) -> bool {
        self.fee_type != fee_type
            || self.performance_fee_bps != performance_fee_bps
            || self.management_fee_bps != management_fee_bps
    }
}

/// Snapshot of a vault's on-chain configuration.
///
/// Only valid for the operation that fetched it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    pub vault: Address,
    pub manager: Address,
    pub strategist: Address,
    pub fee_model: FeeModel,
    pub max_performance_fee_bps: u16,
    pub max_management_fee_bps: u16,
    /// Zero address means deposits are open to everyone.
    pub deposit_access_control: Address,
    pub is_decommissioning: bool,
}

impl VaultConfig {
    pub fn deposit_access_restricted(&self) -> bool {
        self.deposit_access_control != Address::ZERO
    }
}

/// Confirmed transaction receipt.
#[derive(Debug, Clone)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub success: bool,
    pub block_number: u64,
    pub gas_used: u64,
    pub logs: Vec<Log>,
}

/// Result of handing a transaction to the dispatcher.
#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    Confirmed(TxReceipt),
    /// Broadcast accepted but no receipt within the confirmation window.
    /// The transaction may still be mined.
    Pending { tx_hash: B256 },
}

impl DispatchOutcome {
    pub fn tx_hash(&self) -> B256 {
        match self {
            DispatchOutcome::Confirmed(receipt) => receipt.tx_hash,
            DispatchOutcome::Pending { tx_hash } => *tx_hash,
        }
    }
}

//! Process settings, read once from the environment.

use std::time::Duration;

use alloy::primitives::{Address, address};
use rust_decimal::Decimal;

use crate::dispatcher::DispatchPolicy;
use crate::error::VaultError;
use crate::intent::DEFAULT_WEIGHT_TOLERANCE;
use crate::signer::SignerKey;

/// Sepolia, the only network with a published OrionConfig deployment.
pub const DEFAULT_CHAIN_ID: u64 = 11_155_111;

/// Known OrionConfig deployments by chain id.
const ORION_CONFIG_DEPLOYMENTS: &[(u64, Address)] =
    &[(11_155_111, address!("0xc9e19770B9Ba4bC41795698Da777d04417513FE0"))];

/// OrionConfig address for `chain_id`, if the protocol is deployed there.
pub fn orion_config_for_chain(chain_id: u64) -> Option<Address> {
    ORION_CONFIG_DEPLOYMENTS
        .iter()
        .find(|(id, _)| *id == chain_id)
        .map(|(_, address)| *address)
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub rpc_url: url::Url,
    pub chain_id: u64,
    pub orion_config: Address,
    pub vault_address: Option<Address>,
    pub manager_key: Option<SignerKey>,
    pub strategist_key: Option<SignerKey>,
    pub dispatch: DispatchPolicy,
    pub intent_tolerance: Decimal,
}

impl Settings {
    pub fn from_env() -> Result<Self, VaultError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, VaultError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let rpc_url = get("RPC_URL").ok_or_else(|| VaultError::Config("RPC_URL is not set".into()))?;
        let rpc_url: url::Url = rpc_url
            .parse()
            .map_err(|e| VaultError::Config(format!("RPC_URL '{rpc_url}' is not a valid URL: {e}")))?;

        let chain_id = parse_or("CHAIN_ID", get("CHAIN_ID"), DEFAULT_CHAIN_ID)?;

        let orion_config = match get("ORION_CONFIG_ADDRESS") {
            Some(raw) => parse_address("ORION_CONFIG_ADDRESS", &raw)?,
            None => orion_config_for_chain(chain_id).ok_or_else(|| {
                VaultError::Config(format!(
                    "no OrionConfig deployment known for chain {chain_id}; set ORION_CONFIG_ADDRESS"
                ))
            })?,
        };

        let vault_address = get("ORION_VAULT_ADDRESS")
            .map(|raw| parse_address("ORION_VAULT_ADDRESS", &raw))
            .transpose()?;
        let manager_key = get("MANAGER_PRIVATE_KEY")
            .map(|raw| parse_key("MANAGER_PRIVATE_KEY", &raw))
            .transpose()?;
        let strategist_key = get("STRATEGIST_PRIVATE_KEY")
            .map(|raw| parse_key("STRATEGIST_PRIVATE_KEY", &raw))
            .transpose()?;

        let defaults = DispatchPolicy::default();
        let max_broadcast_attempts = parse_or(
            "ORION_TX_MAX_BROADCAST_ATTEMPTS",
            get("ORION_TX_MAX_BROADCAST_ATTEMPTS"),
            defaults.max_broadcast_attempts,
        )?;
        if max_broadcast_attempts == 0 {
            return Err(VaultError::Config(
                "ORION_TX_MAX_BROADCAST_ATTEMPTS must be at least 1".into(),
            ));
        }
        let confirmation_timeout = Duration::from_secs(parse_or(
            "ORION_TX_CONFIRMATION_TIMEOUT_SECS",
            get("ORION_TX_CONFIRMATION_TIMEOUT_SECS"),
            defaults.confirmation_timeout.as_secs(),
        )?);
        let poll_interval = Duration::from_millis(parse_or(
            "ORION_TX_POLL_INTERVAL_MS",
            get("ORION_TX_POLL_INTERVAL_MS"),
            defaults.poll_interval.as_millis() as u64,
        )?);
        let request_timeout = Duration::from_secs(parse_or(
            "ORION_TX_REQUEST_TIMEOUT_SECS",
            get("ORION_TX_REQUEST_TIMEOUT_SECS"),
            defaults.request_timeout.as_secs(),
        )?);
        if request_timeout.is_zero() {
            return Err(VaultError::Config("ORION_TX_REQUEST_TIMEOUT_SECS must be at least 1".into()));
        }

        let intent_tolerance = parse_or(
            "ORION_INTENT_TOLERANCE",
            get("ORION_INTENT_TOLERANCE"),
            DEFAULT_WEIGHT_TOLERANCE,
        )?;
        if intent_tolerance.is_sign_negative() {
            return Err(VaultError::Config("ORION_INTENT_TOLERANCE must not be negative".into()));
        }

        Ok(Self {
            rpc_url,
            chain_id,
            orion_config,
            vault_address,
            manager_key,
            strategist_key,
            dispatch: DispatchPolicy {
                max_broadcast_attempts,
                confirmation_timeout,
                poll_interval,
                request_timeout,
                ..defaults
            },
            intent_tolerance,
        })
    }

    pub fn vault_address(&self) -> Result<Address, VaultError> {
        self.vault_address
            .ok_or_else(|| VaultError::Config("ORION_VAULT_ADDRESS is not set".into()))
    }

    pub fn manager_key(&self) -> Result<&SignerKey, VaultError> {
        self.manager_key
            .as_ref()
            .ok_or_else(|| VaultError::Config("MANAGER_PRIVATE_KEY is not set".into()))
    }

    pub fn strategist_key(&self) -> Result<&SignerKey, VaultError> {
        self.strategist_key
            .as_ref()
            .ok_or_else(|| VaultError::Config("STRATEGIST_PRIVATE_KEY is not set".into()))
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T, VaultError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw
            .parse()
            .map_err(|e| VaultError::Config(format!("{key} '{raw}' is invalid: {e}"))),
        None => Ok(default),
    }
}

fn parse_address(key: &str, raw: &str) -> Result<Address, VaultError> {
    raw.parse()
        .map_err(|e| VaultError::Config(format!("{key} '{raw}' is not a valid address: {e}")))
}

fn parse_key(key: &str, raw: &str) -> Result<SignerKey, VaultError> {
    SignerKey::new(raw).map_err(|_| VaultError::Config(format!("{key} is not a valid private key")))
}

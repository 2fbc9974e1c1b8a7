//! Human-readable decoding of EVM revert payloads.

use alloy::sol_types::{Panic, Revert, SolError};

use crate::contracts::{AlreadyRegistered, InvalidArguments, NotAuthorized, SystemNotIdle, ZeroAddress};

/// Decode revert data into a reason string.
///
/// Recognizes `Error(string)`, `Panic(uint256)` and the protocol's custom
/// errors; anything else is rendered as hex with its selector.
pub fn decode_revert_reason(data: &[u8]) -> String {
    if data.is_empty() {
        return "execution reverted without reason".to_string();
    }
    if data.len() < 4 {
        return format!("malformed revert data 0x{}", hex::encode(data));
    }

    let selector: [u8; 4] = [data[0], data[1], data[2], data[3]];

    if selector == Revert::SELECTOR {
        if let Ok(revert) = Revert::abi_decode(data) {
            return revert.reason;
        }
    }
    if selector == Panic::SELECTOR {
        if let Ok(panic) = Panic::abi_decode(data) {
            return format!("panic code {}", panic.code);
        }
    }

    let known = [
        (NotAuthorized::SELECTOR, "NotAuthorized(): caller lacks the required role or whitelist entry"),
        (SystemNotIdle::SELECTOR, "SystemNotIdle(): protocol is processing an epoch"),
        (InvalidArguments::SELECTOR, "InvalidArguments(): the contract rejected the call parameters"),
        (AlreadyRegistered::SELECTOR, "AlreadyRegistered(): entry already exists"),
        (ZeroAddress::SELECTOR, "ZeroAddress(): zero address is not allowed"),
    ];
    if let Some((_, reason)) = known.iter().find(|(sel, _)| *sel == selector) {
        return (*reason).to_string();
    }

    format!(
        "unknown custom error 0x{} (data 0x{})",
        hex::encode(selector),
        hex::encode(data)
    )
}

use thiserror::Error;

/// Process exit codes, one per error category.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const VALIDATION: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const RPC: i32 = 4;
    pub const SIGNING: i32 = 5;
    pub const BROADCAST: i32 = 6;
    pub const REVERT: i32 = 7;
    pub const SYSTEM_NOT_IDLE: i32 = 8;
    /// Broadcast succeeded but no receipt arrived in time.
    pub const PENDING: i32 = 9;
}

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("RPC error at {endpoint}: {message}")]
    Rpc { endpoint: String, message: String },

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Broadcast failed after {attempts} attempt(s) (tx {tx_hash}): {message}")]
    Broadcast {
        attempts: u32,
        tx_hash: String,
        message: String,
    },

    #[error("Transaction reverted{}: {reason}", tx_suffix(.tx_hash))]
    Revert {
        reason: String,
        tx_hash: Option<String>,
    },

    #[error("System is not idle. Cannot {0} at this time.")]
    SystemNotIdle(String),
}

fn tx_suffix(tx_hash: &Option<String>) -> String {
    match tx_hash {
        Some(hash) => format!(" (tx {hash})"),
        None => String::new(),
    }
}

impl VaultError {
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        VaultError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn rpc(endpoint: impl Into<String>, message: impl ToString) -> Self {
        VaultError::Rpc {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            VaultError::Validation { .. } => exit_code::VALIDATION,
            VaultError::Config(_) => exit_code::CONFIG,
            VaultError::Rpc { .. } => exit_code::RPC,
            VaultError::Signing(_) => exit_code::SIGNING,
            VaultError::Broadcast { .. } => exit_code::BROADCAST,
            VaultError::Revert { .. } => exit_code::REVERT,
            VaultError::SystemNotIdle(_) => exit_code::SYSTEM_NOT_IDLE,
        }
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(e: serde_json::Error) -> Self {
        VaultError::validation("json", e.to_string())
    }
}

impl From<std::io::Error> for VaultError {
    fn from(e: std::io::Error) -> Self {
        VaultError::Config(format!("I/O error: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_are_distinct() {
        let errors = [
            VaultError::validation("weight", "negative"),
            VaultError::Config("missing".into()),
            VaultError::rpc("http://localhost:8545", "refused"),
            VaultError::Signing("bad key".into()),
            VaultError::Broadcast {
                attempts: 3,
                tx_hash: "0x01".into(),
                message: "reset".into(),
            },
            VaultError::Revert {
                reason: "NotAuthorized()".into(),
                tx_hash: None,
            },
            VaultError::SystemNotIdle("submit order intent".into()),
        ];
        let mut codes: Vec<i32> = errors.iter().map(|e| e.exit_code()).collect();
        codes.push(exit_code::PENDING);
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), 8);
        assert!(!codes.contains(&exit_code::SUCCESS));
    }

    #[test]
    fn test_revert_message_includes_hash() {
        let err = VaultError::Revert {
            reason: "paused".into(),
            tx_hash: Some("0xabc".into()),
        };
        assert_eq!(err.to_string(), "Transaction reverted (tx 0xabc): paused");

        let err = VaultError::Revert {
            reason: "paused".into(),
            tx_hash: None,
        };
        assert_eq!(err.to_string(), "Transaction reverted: paused");
    }

    #[test]
    fn test_rpc_error_names_endpoint() {
        let err = VaultError::rpc("http://node:8545", "connection refused");
        assert!(err.to_string().contains("http://node:8545"));
    }
}

use crate::error::VaultError;
use crate::types::FeeType;

/// Protocol ceiling for the performance fee, in basis points (30%).
pub const MAX_PERFORMANCE_FEE_BPS: u16 = 3000;
/// Protocol ceiling for the management fee, in basis points (3%).
pub const MAX_MANAGEMENT_FEE_BPS: u16 = 300;

/// Longest vault name accepted by the factory, in UTF-8 bytes.
pub const MAX_VAULT_NAME_BYTES: usize = 26;
/// Longest share symbol accepted by the factory, in UTF-8 bytes.
pub const MAX_VAULT_SYMBOL_BYTES: usize = 4;

/// Requested fee parameters, checked against a pair of ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeRequest {
    pub fee_type: FeeType,
    pub performance_fee_bps: u16,
    pub management_fee_bps: u16,
}

impl FeeRequest {
    pub fn new(fee_type: FeeType, performance_fee_bps: u16, management_fee_bps: u16) -> Self {
        Self {
            fee_type,
            performance_fee_bps,
            management_fee_bps,
        }
    }

    /// Validate against the protocol-wide ceilings.
    pub fn validate_protocol_bounds(&self) -> Result<(), VaultError> {
        self.validate_bounds(MAX_PERFORMANCE_FEE_BPS, MAX_MANAGEMENT_FEE_BPS)
    }

    /// Validate against explicit ceilings (e.g. those reported by a vault).
    pub fn validate_bounds(&self, max_performance_bps: u16, max_management_bps: u16) -> Result<(), VaultError> {
        if self.performance_fee_bps > max_performance_bps {
            return Err(VaultError::validation(
                "performance fee",
                format!(
                    "{} bps exceeds maximum {max_performance_bps} bps",
                    self.performance_fee_bps
                ),
            ));
        }
        if self.management_fee_bps > max_management_bps {
            return Err(VaultError::validation(
                "management fee",
                format!(
                    "{} bps exceeds maximum {max_management_bps} bps",
                    self.management_fee_bps
                ),
            ));
        }
        Ok(())
    }
}

pub fn validate_vault_name(name: &str) -> Result<(), VaultError> {
    if name.trim().is_empty() {
        return Err(VaultError::validation("vault name", "must not be empty"));
    }
    if name.len() > MAX_VAULT_NAME_BYTES {
        return Err(VaultError::validation(
            "vault name",
            format!("'{name}' exceeds maximum length of {MAX_VAULT_NAME_BYTES} bytes"),
        ));
    }
    Ok(())
}

pub fn validate_vault_symbol(symbol: &str) -> Result<(), VaultError> {
    if symbol.trim().is_empty() {
        return Err(VaultError::validation("vault symbol", "must not be empty"));
    }
    if symbol.len() > MAX_VAULT_SYMBOL_BYTES {
        return Err(VaultError::validation(
            "vault symbol",
            format!("'{symbol}' exceeds maximum length of {MAX_VAULT_SYMBOL_BYTES} bytes"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fees_at_ceiling_pass() {
        let req = FeeRequest::new(FeeType::HardHurdle, 3000, 300);
        assert!(req.validate_protocol_bounds().is_ok());
    }

    #[test]
    fn test_performance_fee_above_ceiling() {
        let err = FeeRequest::new(FeeType::Absolute, 3001, 0)
            .validate_protocol_bounds()
            .unwrap_err();
        assert!(err.to_string().contains("performance fee"));
        assert!(err.to_string().contains("3001"));
    }

    #[test]
    fn test_management_fee_above_ceiling() {
        let err = FeeRequest::new(FeeType::Absolute, 0, 301)
            .validate_protocol_bounds()
            .unwrap_err();
        assert!(err.to_string().contains("management fee"));
    }

    #[test]
    fn test_vault_specific_ceilings() {
        let req = FeeRequest::new(FeeType::HighWaterMark, 2000, 200);
        assert!(req.validate_bounds(2000, 200).is_ok());
        assert!(req.validate_bounds(1999, 200).is_err());
        assert!(req.validate_bounds(2000, 199).is_err());
    }

    #[test]
    fn test_name_and_symbol_limits_count_bytes() {
        assert!(validate_vault_name("Algorithmic Yield Vault").is_ok());
        assert!(validate_vault_name(&"a".repeat(27)).is_err());
        assert!(validate_vault_name("").is_err());
        assert!(validate_vault_symbol("AYV").is_ok());
        assert!(validate_vault_symbol("ORION").is_err());
        // three characters, six bytes
        assert!(validate_vault_symbol("éèê").is_err());
    }
}

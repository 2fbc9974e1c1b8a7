//! Portfolio allocation intents: parsing, validation and on-chain encoding.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use alloy::primitives::{Address, B256, keccak256};
use alloy::sol_types::SolCall;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;

use crate::contracts::IOrionTransparentVault;
use crate::error::VaultError;

/// Default allowed deviation of the weight sum from 1.0.
pub const DEFAULT_WEIGHT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 6);

/// Largest intent precision whose scaled weights still fit a `uint32`.
pub const MAX_INTENT_DECIMALS: u8 = 9;

/// Target allocation: asset address → weight, iterated in ascending address order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationIntent {
    weights: BTreeMap<Address, Decimal>,
}

impl AllocationIntent {
    /// Parse an intent from its JSON form: `{"0x…": 0.25, …}`.
    pub fn parse(raw: &str, tolerance: Decimal) -> Result<Self, VaultError> {
        let mut de = serde_json::Deserializer::from_str(raw);
        let entries = RawEntries::deserialize(&mut de)
            .map_err(|e| VaultError::validation("order intent", format!("malformed JSON: {e}")))?;
        de.end()
            .map_err(|e| VaultError::validation("order intent", format!("trailing data: {e}")))?;

        let mut parsed = Vec::with_capacity(entries.0.len());
        for (key, value) in entries.0 {
            let weight = parse_weight(&key, &value)?;
            parsed.push((key, weight));
        }
        Self::from_entries(parsed, tolerance)
    }

    pub fn from_file(path: impl AsRef<Path>, tolerance: Decimal) -> Result<Self, VaultError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            VaultError::validation("order intent", format!("cannot read {}: {e}", path.display()))
        })?;
        Self::parse(&raw, tolerance)
    }

    /// Build an intent from `(address, weight)` pairs and validate it.
    pub fn from_entries<S: AsRef<str>>(
        entries: impl IntoIterator<Item = (S, Decimal)>,
        tolerance: Decimal,
    ) -> Result<Self, VaultError> {
        let mut weights = BTreeMap::new();
        for (key, weight) in entries {
            let key = key.as_ref();
            let asset = parse_asset(key)?;
            if weight.is_sign_negative() && !weight.is_zero() {
                return Err(VaultError::validation(
                    format!("weight of {key}"),
                    format!("{weight} is negative"),
                ));
            }
            if weights.insert(asset, weight).is_some() {
                return Err(VaultError::validation(
                    "order intent",
                    format!("duplicate asset {asset}"),
                ));
            }
        }

        if weights.is_empty() {
            return Err(VaultError::validation("order intent", "must contain at least one asset"));
        }

        let sum = weights
            .values()
            .try_fold(Decimal::ZERO, |acc, w| acc.checked_add(*w))
            .ok_or_else(|| VaultError::validation("order intent", "weights sum overflows the decimal range"))?;
        if (sum - Decimal::ONE).abs() > tolerance {
            return Err(VaultError::validation(
                "order intent",
                format!("weights sum to {}, expected 1 (tolerance {tolerance})", sum.normalize()),
            ));
        }
        Ok(Self { weights })
    }

    pub fn total_weight(&self) -> Decimal {
        self.weights.values().copied().sum()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn weight(&self, asset: &Address) -> Option<Decimal> {
        self.weights.get(asset).copied()
    }

    pub fn assets(&self) -> impl Iterator<Item = &Address> {
        self.weights.keys()
    }

    /// Reject assets outside the protocol's investment universe.
    pub fn ensure_whitelisted(&self, whitelist: &[Address]) -> Result<(), VaultError> {
        match self.assets().find(|asset| !whitelist.contains(asset)) {
            Some(asset) => Err(VaultError::validation(
                "order intent",
                format!("asset {asset} is not whitelisted in the investment universe"),
            )),
            None => Ok(()),
        }
    }

    /// Quantize weights to `decimals` fixed-point digits.
    ///
    /// The encoded weights always sum to exactly `10^decimals`; the rounding
    /// residue lands on the largest weight (lowest address on ties).
    pub fn encode(&self, decimals: u8) -> Result<Vec<IOrionTransparentVault::IntentToken>, VaultError> {
        if decimals > MAX_INTENT_DECIMALS {
            return Err(VaultError::validation(
                "intent decimals",
                format!("{decimals} exceeds the supported maximum of {MAX_INTENT_DECIMALS}"),
            ));
        }
        let scale = 10u64.pow(decimals as u32);
        let scale_dec = Decimal::from(scale);

        let mut scaled: Vec<(Address, i64)> = Vec::with_capacity(self.weights.len());
        let mut largest = 0;
        let mut largest_weight = Decimal::MIN;
        for (i, (asset, weight)) in self.weights.iter().enumerate() {
            if *weight > largest_weight {
                largest = i;
                largest_weight = *weight;
            }
            let value = weight
                .checked_mul(scale_dec)
                .ok_or_else(|| {
                    VaultError::validation(format!("weight of {asset}"), format!("{weight} is out of range"))
                })?
                .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                .to_i64()
                .ok_or_else(|| {
                    VaultError::validation(format!("weight of {asset}"), format!("{weight} is out of range"))
                })?;
            scaled.push((*asset, value));
        }

        let out_of_range = || VaultError::validation("order intent", "encoded weights are out of range");
        let total = scaled
            .iter()
            .try_fold(0i64, |acc, (_, v)| acc.checked_add(*v))
            .ok_or_else(out_of_range)?;
        let residue = (scale as i64).checked_sub(total).ok_or_else(out_of_range)?;
        scaled[largest].1 = scaled[largest].1.checked_add(residue).ok_or_else(out_of_range)?;

        scaled
            .into_iter()
            .map(|(token, value)| {
                let weight = u32::try_from(value).map_err(|_| {
                    VaultError::validation(format!("weight of {token}"), format!("encoded value {value} does not fit uint32"))
                })?;
                Ok(IOrionTransparentVault::IntentToken { token, weight })
            })
            .collect()
    }

    /// ABI-encoded `submitIntent` call data.
    pub fn encode_call(&self, decimals: u8) -> Result<Vec<u8>, VaultError> {
        let call = IOrionTransparentVault::submitIntentCall {
            intent: self.encode(decimals)?,
        };
        Ok(call.abi_encode())
    }

    /// Keccak-256 of the call data; identical for identical logical intents.
    pub fn fingerprint(&self, decimals: u8) -> Result<B256, VaultError> {
        Ok(keccak256(self.encode_call(decimals)?))
    }
}

impl fmt::Display for AllocationIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .weights
            .iter()
            .map(|(asset, weight)| format!("{asset}={}", weight.normalize()))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

fn parse_asset(key: &str) -> Result<Address, VaultError> {
    let hex_part = key.strip_prefix("0x").or_else(|| key.strip_prefix("0X"));
    match hex_part {
        Some(digits) if digits.len() == 40 && digits.chars().all(|c| c.is_ascii_hexdigit()) => {
            Address::from_str(digits).map_err(|e| VaultError::validation("asset address", format!("'{key}': {e}")))
        }
        _ => Err(VaultError::validation(
            "asset address",
            format!("'{key}' is not a 0x-prefixed 20-byte hex address"),
        )),
    }
}

fn parse_weight(key: &str, value: &serde_json::Value) -> Result<Decimal, VaultError> {
    let serde_json::Value::Number(number) = value else {
        return Err(VaultError::validation(
            format!("weight of {key}"),
            format!("{value} is not a number"),
        ));
    };
    let text = number.to_string();
    Decimal::from_str_exact(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|e| VaultError::validation(format!("weight of {key}"), format!("{text}: {e}")))
}

/// JSON object entries in document order, duplicates preserved.
struct RawEntries(Vec<(String, serde_json::Value)>);

impl<'de> Deserialize<'de> for RawEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = RawEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object mapping asset addresses to weights")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((key, value)) = map.next_entry::<String, serde_json::Value>()? {
                    entries.push((key, value));
                }
                Ok(RawEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const B: &str = "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
    const C: &str = "0xcccccccccccccccccccccccccccccccccccccccc";

    fn tol() -> Decimal {
        DEFAULT_WEIGHT_TOLERANCE
    }

    #[test]
    fn test_default_tolerance_is_one_millionth() {
        assert_eq!(DEFAULT_WEIGHT_TOLERANCE, Decimal::from_str("0.000001").unwrap());
    }

    #[test]
    fn test_parse_valid_intent() {
        let raw = format!(r#"{{"{B}": 0.4, "{A}": 0.6}}"#);
        let intent = AllocationIntent::parse(&raw, tol()).unwrap();
        assert_eq!(intent.len(), 2);
        assert_eq!(intent.total_weight(), Decimal::ONE);
        let order: Vec<Address> = intent.assets().copied().collect();
        assert_eq!(order, vec![A.parse::<Address>().unwrap(), B.parse::<Address>().unwrap()]);
    }

    #[test]
    fn test_sum_below_one_names_sum() {
        let raw = format!(r#"{{"{A}": 0.5, "{B}": 0.4}}"#);
        let err = AllocationIntent::parse(&raw, tol()).unwrap_err();
        assert!(matches!(err, VaultError::Validation { .. }));
        assert!(err.to_string().contains("sum to 0.9"), "{err}");
    }

    #[test]
    fn test_sum_within_tolerance_accepted() {
        let raw = format!(r#"{{"{A}": 0.3333333, "{B}": 0.3333333, "{C}": 0.3333334}}"#);
        assert!(AllocationIntent::parse(&raw, tol()).is_ok());

        let raw = format!(r#"{{"{A}": 0.333333, "{B}": 0.333333, "{C}": 0.333333}}"#);
        assert!(AllocationIntent::parse(&raw, tol()).is_ok());

        let raw = format!(r#"{{"{A}": 0.33333, "{B}": 0.33333, "{C}": 0.33333}}"#);
        assert!(AllocationIntent::parse(&raw, tol()).is_err());
    }

    #[test]
    fn test_duplicate_asset_rejected() {
        let raw = format!(r#"{{"{A}": 0.5, "{A}": 0.5}}"#);
        let err = AllocationIntent::parse(&raw, tol()).unwrap_err();
        assert!(err.to_string().contains("duplicate"), "{err}");
    }

    #[test]
    fn test_duplicate_asset_differing_case_rejected() {
        let upper = format!("0x{}", "A".repeat(40));
        let raw = format!(r#"{{"{A}": 0.5, "{upper}": 0.5}}"#);
        let err = AllocationIntent::parse(&raw, tol()).unwrap_err();
        assert!(err.to_string().contains("duplicate"), "{err}");
    }

    #[test]
    fn test_negative_weight_rejected() {
        let raw = format!(r#"{{"{A}": 1.5, "{B}": -0.5}}"#);
        let err = AllocationIntent::parse(&raw, tol()).unwrap_err();
        assert!(err.to_string().contains("negative"), "{err}");
    }

    #[test]
    fn test_non_numeric_weight_rejected() {
        let raw = format!(r#"{{"{A}": "half", "{B}": 0.5}}"#);
        let err = AllocationIntent::parse(&raw, tol()).unwrap_err();
        assert!(err.to_string().contains("not a number"), "{err}");

        let raw = format!(r#"{{"{A}": null}}"#);
        assert!(AllocationIntent::parse(&raw, tol()).is_err());
    }

    #[test]
    fn test_malformed_addresses_rejected() {
        for key in ["0xA", "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "0xzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz"] {
            let raw = format!(r#"{{"{key}": 1.0}}"#);
            let err = AllocationIntent::parse(&raw, tol()).unwrap_err();
            assert!(err.to_string().contains("asset address"), "{key}: {err}");
        }
    }

    #[test]
    fn test_empty_and_non_object_rejected() {
        assert!(AllocationIntent::parse("{}", tol()).is_err());
        assert!(AllocationIntent::parse("[1, 2]", tol()).is_err());
        assert!(AllocationIntent::parse("not json", tol()).is_err());
    }

    #[test]
    fn test_scientific_notation_weight() {
        let raw = format!(r#"{{"{A}": 1e-7, "{B}": 0.9999999}}"#);
        let intent = AllocationIntent::parse(&raw, tol()).unwrap();
        assert_eq!(intent.weight(&A.parse().unwrap()), Some(Decimal::from_str("0.0000001").unwrap()));
    }

    #[test]
    fn test_encoding_is_deterministic_across_key_order_and_case() {
        let first = format!(r#"{{"{A}": 0.25, "{B}": 0.5, "{C}": 0.25}}"#);
        let second = format!(
            r#"{{"{}": 0.25, "{}": 0.5, "{A}": 0.25}}"#,
            C.to_uppercase().replace("0X", "0x"),
            B
        );
        let a = AllocationIntent::parse(&first, tol()).unwrap();
        let b = AllocationIntent::parse(&second, tol()).unwrap();
        assert_eq!(a.encode_call(9).unwrap(), b.encode_call(9).unwrap());
        assert_eq!(a.fingerprint(9).unwrap(), b.fingerprint(9).unwrap());
    }

    #[test]
    fn test_encode_sums_to_scale() {
        let raw = format!(r#"{{"{A}": 0.3333333, "{B}": 0.3333333, "{C}": 0.3333334}}"#);
        let intent = AllocationIntent::parse(&raw, tol()).unwrap();
        let tokens = intent.encode(2).unwrap();
        let total: u64 = tokens.iter().map(|t| t.weight as u64).sum();
        assert_eq!(total, 100);
        // residue goes to the largest weight
        assert_eq!(tokens[2].weight, 34);
        assert_eq!(tokens[0].weight, 33);
    }

    #[test]
    fn test_encode_full_precision() {
        let raw = format!(r#"{{"{A}": 0.125, "{B}": 0.875}}"#);
        let intent = AllocationIntent::parse(&raw, tol()).unwrap();
        let tokens = intent.encode(9).unwrap();
        assert_eq!(tokens[0].weight, 125_000_000);
        assert_eq!(tokens[1].weight, 875_000_000);
    }

    #[test]
    fn test_encode_rejects_excess_decimals() {
        let raw = format!(r#"{{"{A}": 1}}"#);
        let intent = AllocationIntent::parse(&raw, tol()).unwrap();
        assert!(intent.encode(10).is_err());
    }

    #[test]
    fn test_ensure_whitelisted() {
        let raw = format!(r#"{{"{A}": 0.5, "{B}": 0.5}}"#);
        let intent = AllocationIntent::parse(&raw, tol()).unwrap();
        let a: Address = A.parse().unwrap();
        let b: Address = B.parse().unwrap();
        assert!(intent.ensure_whitelisted(&[a, b]).is_ok());
        let err = intent.ensure_whitelisted(&[a]).unwrap_err();
        assert!(err.to_string().contains("not whitelisted"));
    }

    #[test]
    fn test_weight_sum_overflow_is_validation_error() {
        let raw = format!(r#"{{"{A}": 5e28, "{B}": 5e28}}"#);
        let err = AllocationIntent::parse(&raw, tol()).unwrap_err();
        assert!(matches!(err, VaultError::Validation { .. }));
        assert!(err.to_string().contains("overflows"), "{err}");
    }

    #[test]
    fn test_encode_huge_weight_is_validation_error() {
        // Only reachable with an absurd tolerance.
        let huge = Decimal::from_str("70000000000000000000000000000").unwrap();
        let intent = AllocationIntent::from_entries([(A, huge)], Decimal::MAX).unwrap();
        let err = intent.encode(9).unwrap_err();
        assert!(matches!(err, VaultError::Validation { .. }));
        assert!(err.to_string().contains("out of range"), "{err}");
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("intent.json");
        std::fs::write(&path, format!(r#"{{"{A}": 1.0}}"#)).unwrap();
        let intent = AllocationIntent::from_file(&path, tol()).unwrap();
        assert_eq!(intent.len(), 1);

        let missing = AllocationIntent::from_file(dir.path().join("nope.json"), tol());
        assert!(missing.is_err());
    }
}

//! [`AmountValue`] represents a token amount in its smallest unit.
//!
//! This module holds its type definition, the USD conversion and serde implementations.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Number of decimals of the USDC mint on Solana.
pub const USDC_DECIMALS: u32 = 6;

/// Represents a token amount in the smallest unit of the asset.
///
/// SPL token amounts are `u64`, so this is the widest amount a transfer can carry.
/// Serialized as a decimal string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AmountValue(pub u64);

impl AmountValue {
    /// Convert a USD price into the smallest unit of a USD-pegged asset with `decimals` decimals.
    ///
    /// The result is floored. A tiny epsilon absorbs binary representation error so that
    /// e.g. `0.00002` becomes `20` and not `19`.
    pub fn from_usd(usd: f64, decimals: u32) -> Self {
        if !usd.is_finite() || usd <= 0.0 {
            return AmountValue(0);
        }
        let scaled = usd * 10f64.powi(decimals as i32);
        AmountValue((scaled + 1e-6).floor() as u64)
    }

    /// Convert a USD price into USDC base units (6 decimals).
    pub fn from_usdc(usd: f64) -> Self {
        Self::from_usd(usd, USDC_DECIMALS)
    }
}

impl From<u8> for AmountValue {
    fn from(value: u8) -> Self {
        AmountValue(value as u64)
    }
}

impl From<u16> for AmountValue {
    fn from(value: u16) -> Self {
        AmountValue(value as u64)
    }
}

impl From<u32> for AmountValue {
    fn from(value: u32) -> Self {
        AmountValue(value as u64)
    }
}

impl From<u64> for AmountValue {
    fn from(value: u64) -> Self {
        AmountValue(value)
    }
}

impl Display for AmountValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for AmountValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AmountValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let value = s.parse::<u64>().map_err(serde::de::Error::custom)?;
        Ok(AmountValue(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usd_prices_convert_to_usdc_units() {
        assert_eq!(AmountValue::from_usdc(0.00001), AmountValue(10));
        assert_eq!(AmountValue::from_usdc(0.00002), AmountValue(20));
        assert_eq!(AmountValue::from_usdc(0.00005), AmountValue(50));
        assert_eq!(AmountValue::from_usdc(0.0001), AmountValue(100));
        assert_eq!(AmountValue::from_usdc(0.00101), AmountValue(1010));
        assert_eq!(AmountValue::from_usdc(1.5), AmountValue(1_500_000));
    }

    #[test]
    fn sub_unit_prices_floor_to_zero() {
        assert_eq!(AmountValue::from_usdc(0.0000004), AmountValue(0));
        assert_eq!(AmountValue::from_usdc(-1.0), AmountValue(0));
        assert_eq!(AmountValue::from_usdc(f64::NAN), AmountValue(0));
    }

    #[test]
    fn amounts_are_decimal_strings_on_the_wire() {
        let json = serde_json::to_value(AmountValue(20)).unwrap();
        assert_eq!(json, serde_json::json!("20"));

        let parsed: AmountValue = serde_json::from_value(serde_json::json!("1010")).unwrap();
        assert_eq!(parsed, AmountValue(1010));

        assert!(serde_json::from_value::<AmountValue>(serde_json::json!("-3")).is_err());
        assert!(serde_json::from_value::<AmountValue>(serde_json::json!(20)).is_err());
    }
}

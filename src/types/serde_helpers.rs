//! Custom serde helpers for the upstream wire formats.
//!
//! The data API encodes 64-bit integers as JSON strings, sends money in
//! micros and mixes numbers and strings for fractional measures. These
//! helpers normalize all of that at the deserialization boundary.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, de};
use serde_json::Value;

/// Render a number or numeric string as its exact decimal text.
fn numeric_text<E: de::Error>(value: &Value) -> Result<Option<String>, E> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s.trim().to_string())),
        other => Err(de::Error::custom(format!(
            "expected a number or numeric string, got {}",
            other
        ))),
    }
}

/// Deserialize a `u64` from a number, a numeric string or null (as zero).
///
/// # Example
///
/// ```rust
/// use serde::Deserialize;
/// use ads_insight_client::types::serde_helpers::flexible_u64;
///
/// #[derive(Deserialize)]
/// struct Metrics {
///     #[serde(deserialize_with = "flexible_u64::deserialize")]
///     clicks: u64,
/// }
///
/// let m: Metrics = serde_json::from_str(r#"{"clicks":"42"}"#).unwrap();
/// assert_eq!(m.clicks, 42);
/// ```
pub mod flexible_u64 {
    use super::*;

    /// Deserialize a `u64` from a number or numeric string.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        match numeric_text::<D::Error>(&value)? {
            Some(text) => text.parse().map_err(de::Error::custom),
            None => Ok(0),
        }
    }
}

/// Deserialize a [`Decimal`] from a number, a numeric string or null (as zero).
pub mod flexible_decimal {
    use super::*;

    /// Deserialize a decimal from a number or numeric string.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        match numeric_text::<D::Error>(&value)? {
            Some(text) => parse_decimal(&text).map_err(de::Error::custom),
            None => Ok(Decimal::ZERO),
        }
    }
}

/// Deserialize an amount expressed in micros into currency units.
///
/// # Example
///
/// ```rust
/// use serde::Deserialize;
/// use rust_decimal::Decimal;
/// use ads_insight_client::types::serde_helpers::micros;
///
/// #[derive(Deserialize)]
/// struct Metrics {
///     #[serde(deserialize_with = "micros::deserialize")]
///     cost_micros: Decimal,
/// }
///
/// let m: Metrics = serde_json::from_str(r#"{"cost_micros":"2500000"}"#).unwrap();
/// assert_eq!(m.cost_micros, Decimal::new(25, 1));
/// ```
pub mod micros {
    use super::*;

    /// Deserialize micros into currency units.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = flexible_decimal::deserialize(deserializer)?;
        Ok((raw / Decimal::from(1_000_000)).normalize())
    }
}

/// Helper for empty strings that should be deserialized as None.
///
/// Some upstream fields return `""` instead of null.
///
/// # Example
///
/// ```rust
/// use serde::Deserialize;
/// use ads_insight_client::types::serde_helpers::empty_string_as_none;
///
/// #[derive(Deserialize, Debug)]
/// struct Row {
///     #[serde(deserialize_with = "empty_string_as_none::deserialize", default)]
///     ad_group_id: Option<String>,
/// }
///
/// let row: Row = serde_json::from_str(r#"{"ad_group_id":""}"#).unwrap();
/// assert!(row.ad_group_id.is_none());
/// ```
pub mod empty_string_as_none {
    use super::*;

    /// Deserialize a string, returning None if empty.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = Option::<String>::deserialize(deserializer)?;
        Ok(s.filter(|s| !s.is_empty()))
    }
}

/// Parse decimal text, accepting scientific notation.
fn parse_decimal(text: &str) -> Result<Decimal, rust_decimal::Error> {
    Decimal::from_str(text).or_else(|_| Decimal::from_scientific(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Sample {
        #[serde(deserialize_with = "flexible_u64::deserialize", default)]
        count: u64,
        #[serde(deserialize_with = "flexible_decimal::deserialize", default)]
        amount: Decimal,
        #[serde(deserialize_with = "micros::deserialize", default)]
        cost: Decimal,
    }

    #[test]
    fn test_numbers_and_strings() {
        let s: Sample =
            serde_json::from_str(r#"{"count":"7","amount":0.25,"cost":1250000}"#).unwrap();
        assert_eq!(s.count, 7);
        assert_eq!(s.amount, Decimal::new(25, 2));
        assert_eq!(s.cost, Decimal::new(125, 2));
    }

    #[test]
    fn test_nulls_and_missing_are_zero() {
        let s: Sample = serde_json::from_str(r#"{"count":null,"amount":""}"#).unwrap();
        assert_eq!(s.count, 0);
        assert_eq!(s.amount, Decimal::ZERO);
        assert_eq!(s.cost, Decimal::ZERO);
    }

    #[test]
    fn test_rejects_non_numeric() {
        let result: Result<Sample, _> = serde_json::from_str(r#"{"count":"many"}"#);
        assert!(result.is_err());
        let result: Result<Sample, _> = serde_json::from_str(r#"{"amount":true}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_scientific_notation() {
        let s: Sample = serde_json::from_str(r#"{"amount":"1e2"}"#).unwrap();
        assert_eq!(s.amount, Decimal::from(100));
    }
}

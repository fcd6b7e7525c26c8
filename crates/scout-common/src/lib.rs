//! Common utilities for Scout
//!
//! Conversions between the chain's wire formats (hex quantities, addresses,
//! bytecode) and the forms used for storage and classification.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

/// Seconds in one UTC day.
pub const DAY_SECS: i64 = 86_400;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("invalid address '{0}': expected 0x followed by 40 hex characters")]
    InvalidAddress(String),
    #[error("invalid hex quantity '{0}'")]
    InvalidQuantity(String),
    #[error("invalid hex data: {0}")]
    InvalidHex(String),
}

// ===== Addresses =====

/// Normalize an address to lower-case `0x` + 40 hex characters.
pub fn normalize_address(raw: &str) -> Result<String, FormatError> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| FormatError::InvalidAddress(raw.to_string()))?;

    if body.len() != 40 || !body.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(FormatError::InvalidAddress(raw.to_string()));
    }

    Ok(format!("0x{}", body.to_ascii_lowercase()))
}

/// Returns true if `raw` normalizes to a valid address.
pub fn is_valid_address(raw: &str) -> bool {
    normalize_address(raw).is_ok()
}

/// `0x1234...abcd` display form (first 6 and last 4 characters).
pub fn short_address(address: &str) -> String {
    if address.len() < 10 || !address.is_ascii() {
        return address.to_string();
    }
    format!("{}...{}", &address[..6], &address[address.len() - 4..])
}

// ===== Hex =====

/// Decode `0x`-prefixed (or bare) hex into bytes. `0x` alone is empty.
pub fn decode_hex(data: &str) -> Result<Vec<u8>, FormatError> {
    let body = data.strip_prefix("0x").unwrap_or(data);
    hex::decode(body).map_err(|e| FormatError::InvalidHex(e.to_string()))
}

/// Parse a quantity given either as `0x`-hex or as a decimal string.
pub fn parse_quantity(raw: &str) -> Result<u64, FormatError> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x") {
        Some("") => return Err(FormatError::InvalidQuantity(raw.to_string())),
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw.parse::<u64>(),
    };
    parsed.map_err(|_| FormatError::InvalidQuantity(raw.to_string()))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawQuantity {
    Number(u64),
    Text(String),
}

/// Serde helper: accepts a JSON number or a hex/decimal string.
pub fn deserialize_quantity<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match RawQuantity::deserialize(deserializer)? {
        RawQuantity::Number(n) => Ok(n),
        RawQuantity::Text(s) => parse_quantity(&s).map_err(serde::de::Error::custom),
    }
}

/// Optional variant of [`deserialize_quantity`]; use with `#[serde(default)]`.
pub fn deserialize_opt_quantity<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawQuantity>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawQuantity::Number(n)) => Ok(Some(n)),
        Some(RawQuantity::Text(s)) => parse_quantity(&s)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

// ===== Time =====

/// Unix seconds of the UTC midnight starting the day that contains `ts`.
pub fn day_start(ts: i64) -> i64 {
    ts.div_euclid(DAY_SECS) * DAY_SECS
}

/// Unix seconds of today's UTC midnight.
pub fn today_start() -> i64 {
    day_start(Utc::now().timestamp())
}

/// Render a day bucket as `YYYY-MM-DD`.
pub fn format_day(day: i64) -> String {
    DateTime::<Utc>::from_timestamp(day, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_address() {
        let addr = normalize_address("0xABCDEF0123456789abcdef0123456789ABCDEF01").unwrap();
        assert_eq!(addr, "0xabcdef0123456789abcdef0123456789abcdef01");

        assert!(normalize_address("0x1234").is_err());
        assert!(normalize_address("abcdef0123456789abcdef0123456789abcdef01").is_err());
        assert!(normalize_address("0xzzcdef0123456789abcdef0123456789abcdef01").is_err());
    }

    #[test]
    fn test_short_address() {
        assert_eq!(
            short_address("0xabcdef0123456789abcdef0123456789abcd1234"),
            "0xabcd...1234"
        );
        assert_eq!(short_address("0x12"), "0x12");
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x10").unwrap(), 16);
        assert_eq!(parse_quantity("42").unwrap(), 42);
        assert!(parse_quantity("0x").is_err());
        assert!(parse_quantity("0xgg").is_err());
    }

    #[test]
    fn test_deserialize_quantity_number_or_hex() {
        #[derive(Deserialize)]
        struct Block {
            #[serde(deserialize_with = "deserialize_quantity")]
            number: u64,
        }

        let a: Block = serde_json::from_str(r#"{"number": 255}"#).unwrap();
        let b: Block = serde_json::from_str(r#"{"number": "0xff"}"#).unwrap();
        assert_eq!(a.number, 255);
        assert_eq!(b.number, 255);
        assert!(serde_json::from_str::<Block>(r#"{"number": "nope"}"#).is_err());
    }

    #[test]
    fn test_decode_hex() {
        assert_eq!(decode_hex("0x").unwrap(), Vec::<u8>::new());
        assert_eq!(decode_hex("0xa9059cbb").unwrap(), vec![0xa9, 0x05, 0x9c, 0xbb]);
        assert!(decode_hex("0xabc").is_err());
    }

    #[test]
    fn test_day_start() {
        // 2024-01-02T03:04:05Z
        let ts = 1_704_164_645;
        assert_eq!(day_start(ts), 1_704_153_600);
        assert_eq!(format_day(day_start(ts)), "2024-01-02");
        assert_eq!(day_start(1_704_153_600), 1_704_153_600);
    }
}

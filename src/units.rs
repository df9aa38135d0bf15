//! Parsing of human-readable durations and sizes, and content hashing.
//!
//! Durations follow HAProxy timer syntax and are returned in milliseconds.
//! Sizes accept the `k`, `m` and `g` suffixes as powers of 1024.

use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors produced while parsing a duration or size string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnitError {
    #[error("empty value")]
    Empty,
    #[error("missing numeric value")]
    MissingNumber,
    #[error("unknown unit '{0}'")]
    UnknownUnit(String),
    #[error("value out of range")]
    Overflow,
}

/// Time unit suffixes accepted in duration strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
}

impl TimeUnit {
    fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "" | "ms" => Some(TimeUnit::Millisecond),
            "s" => Some(TimeUnit::Second),
            "m" => Some(TimeUnit::Minute),
            "h" => Some(TimeUnit::Hour),
            "d" => Some(TimeUnit::Day),
            _ => None,
        }
    }

    /// Number of milliseconds in one unit.
    pub fn as_millis(self) -> u64 {
        match self {
            TimeUnit::Millisecond => 1,
            TimeUnit::Second => 1_000,
            TimeUnit::Minute => 60_000,
            TimeUnit::Hour => 3_600_000,
            TimeUnit::Day => 86_400_000,
        }
    }
}

/// Split `"10s"` into `(10, "s")`.
fn split_number(input: &str) -> Result<(u64, &str), UnitError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(UnitError::Empty);
    }

    let end = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    if end == 0 {
        return Err(UnitError::MissingNumber);
    }

    let value = input[..end].parse::<u64>().map_err(|_| UnitError::Overflow)?;
    Ok((value, &input[end..]))
}

/// Parse a duration string such as `10s` or `500ms` into milliseconds.
///
/// A bare number is taken as milliseconds.
pub fn parse_time(input: &str) -> Result<u64, UnitError> {
    let (value, suffix) = split_number(input)?;
    let unit =
        TimeUnit::from_suffix(suffix).ok_or_else(|| UnitError::UnknownUnit(suffix.to_string()))?;
    value.checked_mul(unit.as_millis()).ok_or(UnitError::Overflow)
}

/// Parse a size string such as `200k` into bytes.
pub fn parse_size(input: &str) -> Result<u64, UnitError> {
    let (value, suffix) = split_number(input)?;
    let multiplier: u64 = match suffix.to_ascii_lowercase().as_str() {
        "" => 1,
        "k" => 1 << 10,
        "m" => 1 << 20,
        "g" => 1 << 30,
        _ => return Err(UnitError::UnknownUnit(suffix.to_string())),
    };
    value.checked_mul(multiplier).ok_or(UnitError::Overflow)
}

/// Stable hex digest of `content`, used to name content-addressed maps.
pub fn hash(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

//! Text-to-value conversion for bound fields.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};

use super::rule::Kind;
use super::value::Value;
use crate::duration::Duration;

/// Converts trimmed, non-empty text into a value of `kind`.
///
/// `format` is a chrono format string for `time` fields; empty means
/// RFC 3339. Returns the failure reason as text.
pub(crate) fn coerce(kind: Kind, text: &str, format: &str) -> Result<Value, String> {
    match kind {
        Kind::String => Ok(Value::String(text.to_string())),
        Kind::Int => parse_int(text).map(Value::Int),
        Kind::Uint => parse_uint(text).map(Value::Uint),
        Kind::Float => text
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|e| e.to_string()),
        Kind::Bool => parse_bool(text).map(Value::Bool),
        Kind::Time => parse_time(text, format).map(Value::Time),
        Kind::Duration => Duration::parse(text)
            .map(Value::Duration)
            .map_err(|e| e.to_string()),
        Kind::Bytes => Ok(Value::Bytes(text.as_bytes().to_vec())),
    }
}

/// Parses a signed integer with optional `0x`, `0o`, `0b` or leading-zero
/// octal prefix. Underscores are allowed between digits.
pub(crate) fn parse_int(text: &str) -> Result<i64, String> {
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let magnitude = parse_magnitude(digits)?;
    if negative {
        if magnitude > i64::MIN.unsigned_abs() {
            return Err("value out of range".to_string());
        }
        #[allow(clippy::cast_possible_wrap)]
        return Ok((magnitude as i64).wrapping_neg());
    }
    i64::try_from(magnitude).map_err(|_| "value out of range".to_string())
}

/// Parses an unsigned integer with the same prefixes as [`parse_int`].
pub(crate) fn parse_uint(text: &str) -> Result<u64, String> {
    if text.starts_with(['+', '-']) {
        return Err("invalid syntax".to_string());
    }
    parse_magnitude(text)
}

fn parse_magnitude(text: &str) -> Result<u64, String> {
    let lower = text.get(..2).map(str::to_ascii_lowercase);
    let (radix, body) = match lower.as_deref() {
        Some("0x") => (16, &text[2..]),
        Some("0o") => (8, &text[2..]),
        Some("0b") => (2, &text[2..]),
        _ if text.len() > 1 && text.starts_with('0') => (8, &text[1..]),
        _ => (10, text),
    };
    if body.starts_with('_') || body.ends_with('_') || body.contains("__") {
        return Err("invalid syntax".to_string());
    }
    let cleaned = body.replace('_', "");
    if cleaned.is_empty() || cleaned.starts_with(['+', '-']) {
        return Err("invalid syntax".to_string());
    }
    u64::from_str_radix(&cleaned, radix).map_err(|e| e.to_string())
}

/// Accepts `1 t T TRUE true True` and `0 f F FALSE false False`.
pub(crate) fn parse_bool(text: &str) -> Result<bool, String> {
    match text {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        _ => Err("invalid syntax".to_string()),
    }
}

/// Parses a timestamp. Formats without an offset are read as UTC, and
/// date-only formats as midnight UTC.
pub(crate) fn parse_time(text: &str, format: &str) -> Result<DateTime<FixedOffset>, String> {
    if format.is_empty() {
        return DateTime::parse_from_rfc3339(text).map_err(|e| e.to_string());
    }
    if let Ok(time) = DateTime::parse_from_str(text, format) {
        return Ok(time);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
        return Ok(naive.and_utc().fixed_offset());
    }
    NaiveDate::parse_from_str(text, format)
        .map_err(|e| e.to_string())
        .and_then(|date| {
            date.and_hms_opt(0, 0, 0)
                .map(|naive| naive.and_utc().fixed_offset())
                .ok_or_else(|| "invalid date".to_string())
        })
}

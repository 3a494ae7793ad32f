//! Signed nanosecond durations with a human-readable text form.
//!
//! # Overview
//!
//! [`Duration`] is used by the document binder for `duration` fields and by
//! any caller that needs to read values such as `"1h30m"`, `"-1.5h"` or
//! `"2d12h"`. Accepted units are `ns`, `us`, `µs`, `μs`, `ms`, `s`, `m`, `h`
//! and `d`; segments may carry a fractional part and the whole string may be
//! signed. The bare string `"0"` is the only value allowed without a unit.
//!
//! # Example
//!
//! ```
//! use fetchbind::Duration;
//!
//! let d: Duration = "2h45m".parse().unwrap();
//! assert_eq!(d.as_nanos(), 9_900_000_000_000);
//! assert_eq!(d.to_string(), "2h45m0s");
//! ```

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

const NANOSECOND: u64 = 1;
const MICROSECOND: u64 = 1_000 * NANOSECOND;
const MILLISECOND: u64 = 1_000 * MICROSECOND;
const SECOND: u64 = 1_000 * MILLISECOND;
const MINUTE: u64 = 60 * SECOND;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Magnitude of `i64::MIN`, the largest value a segment sum may reach.
const MAX_MAGNITUDE: u64 = 1 << 63;

/// Errors from [`Duration::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    /// Malformed number, empty input or overflow.
    #[error("invalid duration {input:?}")]
    Invalid {
        /// The rejected input.
        input: String,
    },

    /// A numeric segment had no unit.
    #[error("missing unit in duration {input:?}")]
    MissingUnit {
        /// The rejected input.
        input: String,
    },

    /// A segment used an unknown unit.
    #[error("unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit {
        /// The unit that was not recognised.
        unit: String,
        /// The rejected input.
        input: String,
    },
}

impl DurationError {
    fn invalid(input: &str) -> Self {
        Self::Invalid {
            input: input.to_string(),
        }
    }
}

/// Signed duration with nanosecond precision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Duration(i64);

impl Duration {
    /// Zero duration.
    pub const ZERO: Self = Self(0);

    /// Creates a duration from signed nanoseconds.
    #[must_use]
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// Returns the duration as signed nanoseconds.
    #[must_use]
    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    /// Returns true when the duration is negative.
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Converts to a standard duration, or `None` when negative.
    #[must_use]
    pub fn to_std(self) -> Option<std::time::Duration> {
        u64::try_from(self.0).ok().map(std::time::Duration::from_nanos)
    }

    /// Parses a duration string such as `"300ms"`, `"-1.5h"` or `"1d2h"`.
    ///
    /// # Errors
    ///
    /// Returns [`DurationError`] for empty input, a segment without a unit,
    /// an unknown unit, or a value that overflows `i64` nanoseconds.
    pub fn parse(input: &str) -> Result<Self, DurationError> {
        let (negative, mut rest) = match input.as_bytes().first() {
            Some(b'-') => (true, &input[1..]),
            Some(b'+') => (false, &input[1..]),
            _ => (false, input),
        };

        if rest == "0" {
            return Ok(Self::ZERO);
        }
        if rest.is_empty() {
            return Err(DurationError::invalid(input));
        }

        let mut total: u64 = 0;
        while !rest.is_empty() {
            let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
            let (int_digits, after_int) = rest.split_at(int_len);
            let mut value = leading_int(int_digits).ok_or_else(|| DurationError::invalid(input))?;
            rest = after_int;

            let mut fraction = 0;
            let mut scale = 1.0;
            let mut has_fraction = false;
            if let Some(after_dot) = rest.strip_prefix('.') {
                let frac_len = after_dot.bytes().take_while(u8::is_ascii_digit).count();
                (fraction, scale) = leading_fraction(&after_dot[..frac_len]);
                has_fraction = frac_len > 0;
                rest = &after_dot[frac_len..];
            }
            if int_len == 0 && !has_fraction {
                return Err(DurationError::invalid(input));
            }

            let unit_len = rest
                .find(|c: char| c == '.' || c.is_ascii_digit())
                .unwrap_or(rest.len());
            if unit_len == 0 {
                return Err(DurationError::MissingUnit {
                    input: input.to_string(),
                });
            }
            let (unit_text, after_unit) = rest.split_at(unit_len);
            let unit = unit_nanos(unit_text).ok_or_else(|| DurationError::UnknownUnit {
                unit: unit_text.to_string(),
                input: input.to_string(),
            })?;
            rest = after_unit;

            if value > MAX_MAGNITUDE / unit {
                return Err(DurationError::invalid(input));
            }
            value *= unit;
            if fraction > 0 {
                #[allow(
                    clippy::cast_precision_loss,
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss
                )]
                let extra = (fraction as f64 * (unit as f64 / scale)) as u64;
                value = value
                    .checked_add(extra)
                    .filter(|v| *v <= MAX_MAGNITUDE)
                    .ok_or_else(|| DurationError::invalid(input))?;
            }
            total = total
                .checked_add(value)
                .filter(|v| *v <= MAX_MAGNITUDE)
                .ok_or_else(|| DurationError::invalid(input))?;
        }

        if negative {
            // MAX_MAGNITUDE wraps to i64::MIN, which is its own negation.
            #[allow(clippy::cast_possible_wrap)]
            return Ok(Self((total as i64).wrapping_neg()));
        }
        i64::try_from(total)
            .map(Self)
            .map_err(|_| DurationError::invalid(input))
    }
}

fn unit_nanos(unit: &str) -> Option<u64> {
    match unit {
        "ns" => Some(NANOSECOND),
        "us" | "µs" | "μs" => Some(MICROSECOND),
        "ms" => Some(MILLISECOND),
        "s" => Some(SECOND),
        "m" => Some(MINUTE),
        "h" => Some(HOUR),
        "d" => Some(DAY),
        _ => None,
    }
}

/// Parses the integer part of a segment. An empty slice is zero.
fn leading_int(digits: &str) -> Option<u64> {
    digits.bytes().try_fold(0u64, |acc, b| {
        acc.checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(b - b'0')))
            .filter(|v| *v <= MAX_MAGNITUDE)
    })
}

/// Parses fractional digits, returning the value and its power-of-ten scale.
/// Digits past the representable precision are ignored.
fn leading_fraction(digits: &str) -> (u64, f64) {
    let mut value: u64 = 0;
    let mut scale = 1.0;
    for b in digits.bytes() {
        let Some(next) = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(b - b'0')))
            .filter(|v| *v <= MAX_MAGNITUDE)
        else {
            break;
        };
        value = next;
        scale *= 10.0;
    }
    (value, scale)
}

impl FromStr for Duration {
    type Err = DurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nanos = self.0.unsigned_abs();
        let mut out = String::new();
        if self.0 < 0 {
            out.push('-');
        }

        if nanos == 0 {
            return f.write_str("0s");
        }

        if nanos < SECOND {
            let (unit, digits, name) = if nanos < MICROSECOND {
                (NANOSECOND, 0, "ns")
            } else if nanos < MILLISECOND {
                (MICROSECOND, 3, "µs")
            } else {
                (MILLISECOND, 6, "ms")
            };
            out.push_str(&(nanos / unit).to_string());
            push_fraction(&mut out, nanos % unit, digits);
            out.push_str(name);
            return f.write_str(&out);
        }

        let total_secs = nanos / SECOND;
        let total_mins = total_secs / 60;
        let total_hours = total_mins / 60;
        let days = total_hours / 24;

        if days > 0 {
            out.push_str(&format!("{days}d"));
        }
        if total_hours > 0 {
            out.push_str(&format!("{}h", total_hours % 24));
        }
        if total_mins > 0 {
            out.push_str(&format!("{}m", total_mins % 60));
        }
        out.push_str(&(total_secs % 60).to_string());
        push_fraction(&mut out, nanos % SECOND, 9);
        out.push('s');
        f.write_str(&out)
    }
}

/// Appends `.digits` with trailing zeros removed; nothing when zero.
fn push_fraction(out: &mut String, fraction: u64, width: usize) {
    if fraction == 0 {
        return;
    }
    let padded = format!("{fraction:0width$}");
    out.push('.');
    out.push_str(padded.trim_end_matches('0'));
}

impl From<std::time::Duration> for Duration {
    fn from(value: std::time::Duration) -> Self {
        Self(i64::try_from(value.as_nanos()).unwrap_or(i64::MAX))
    }
}

impl Serialize for Duration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DurationVisitor;

        impl Visitor<'_> for DurationVisitor {
            type Value = Duration;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a duration string like \"1h30m\" or integer nanoseconds")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Duration, E> {
                Duration::parse(v).map_err(E::custom)
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Duration, E> {
                Ok(Duration(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Duration, E> {
                i64::try_from(v)
                    .map(Duration)
                    .map_err(|_| E::custom("duration overflows i64 nanoseconds"))
            }
        }

        deserializer.deserialize_any(DurationVisitor)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ==================== Parse Tests ====================

    #[test]
    fn test_parse_compound() {
        assert_eq!(Duration::parse("2h45m").unwrap().as_nanos(), 9_900_000_000_000);
    }

    #[test]
    fn test_parse_negative_fraction() {
        assert_eq!(Duration::parse("-1.5h").unwrap().as_nanos(), -5_400_000_000_000);
    }

    #[test]
    fn test_parse_zero_without_unit() {
        assert_eq!(Duration::parse("0").unwrap(), Duration::ZERO);
        assert_eq!(Duration::parse("-0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_days_and_micro_aliases() {
        assert_eq!(Duration::parse("1d").unwrap().as_nanos(), 86_400_000_000_000);
        assert_eq!(Duration::parse("3us").unwrap().as_nanos(), 3_000);
        assert_eq!(Duration::parse("3µs").unwrap().as_nanos(), 3_000);
        assert_eq!(Duration::parse("3μs").unwrap().as_nanos(), 3_000);
    }

    #[test]
    fn test_parse_leading_dot_fraction() {
        assert_eq!(Duration::parse(".5s").unwrap().as_nanos(), 500_000_000);
    }

    #[test]
    fn test_parse_missing_unit() {
        assert!(matches!(
            Duration::parse("10"),
            Err(DurationError::MissingUnit { .. })
        ));
    }

    #[test]
    fn test_parse_unknown_unit() {
        let err = Duration::parse("10y").unwrap_err();
        assert!(matches!(err, DurationError::UnknownUnit { ref unit, .. } if unit == "y"));
    }

    #[test]
    fn test_parse_rejects_empty_and_garbage() {
        assert!(Duration::parse("").is_err());
        assert!(Duration::parse("-").is_err());
        assert!(Duration::parse(".s").is_err());
        assert!(Duration::parse("h").is_err());
    }

    #[test]
    fn test_parse_overflow() {
        assert!(Duration::parse("9223372036854775808ns").is_err());
        assert!(Duration::parse("200000d").is_err());
        assert_eq!(
            Duration::parse("-9223372036854775808ns").unwrap().as_nanos(),
            i64::MIN
        );
    }

    // ==================== Display Tests ====================

    #[test]
    fn test_display_forms() {
        assert_eq!(Duration::ZERO.to_string(), "0s");
        assert_eq!(Duration::from_nanos(1).to_string(), "1ns");
        assert_eq!(Duration::from_nanos(1_500).to_string(), "1.5µs");
        assert_eq!(Duration::from_nanos(1_500_000).to_string(), "1.5ms");
        assert_eq!(Duration::parse("90s").unwrap().to_string(), "1m30s");
        assert_eq!(Duration::parse("1h").unwrap().to_string(), "1h0m0s");
        assert_eq!(Duration::parse("-1.5h").unwrap().to_string(), "-1h30m0s");
        assert_eq!(
            Duration::parse("1d2h3m4.5s").unwrap().to_string(),
            "1d2h3m4.5s"
        );
    }

    #[test]
    fn test_display_parses_back() {
        for text in ["1d0h0m1s", "36h", "1.25ms", "-7m"] {
            let d = Duration::parse(text).unwrap();
            assert_eq!(Duration::parse(&d.to_string()).unwrap(), d);
        }
    }

    // ==================== Conversion Tests ====================

    #[test]
    fn test_to_std() {
        assert_eq!(
            Duration::parse("1.5s").unwrap().to_std(),
            Some(std::time::Duration::from_millis(1_500))
        );
        assert_eq!(Duration::parse("-1s").unwrap().to_std(), None);
    }

    #[test]
    fn test_serde_string_and_integer() {
        let d: Duration = serde_json::from_str("\"1m\"").unwrap();
        assert_eq!(d.as_nanos(), 60_000_000_000);
        let d: Duration = serde_json::from_str("1500").unwrap();
        assert_eq!(d.as_nanos(), 1_500);
        assert_eq!(serde_json::to_string(&d).unwrap(), "\"1.5µs\"");
    }
}

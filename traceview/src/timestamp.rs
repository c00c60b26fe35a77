//! Timestamp decoding for payload field values.
//!
//! Numeric values are epoch counts whose unit is inferred from the number of
//! decimal digits in the integer part. String values are tried against
//! RFC 3339, RFC 850 and RFC 1123, in that order. Everything decodes to UTC.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde_json::{Number, Value};

use crate::error::{ParseError, Result};

/// Layout of an RFC 850 timestamp without its trailing zone token,
/// e.g. `Monday, 02-Jan-06 15:04:05`.
const RFC850_LAYOUT: &str = "%A, %d-%b-%y %H:%M:%S";

/// Decodes a JSON value as a UTC timestamp.
///
/// # Errors
///
/// Returns [`ParseError::InvalidEpoch`] for a number whose digit count is not
/// 10, 13, 16 or 19, and [`ParseError::InvalidTimestampFormat`] for a string
/// matching none of the supported formats or a value of any other type.
pub fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>> {
    match value {
        Value::Number(n) => from_epoch(integer_part(n)),
        Value::String(s) => parse_timestamp_str(s),
        other => Err(ParseError::InvalidTimestampFormat {
            value: other.to_string(),
        }
        .into()),
    }
}

/// Decodes a timestamp string. RFC 3339 wins over RFC 850, which wins over
/// RFC 1123.
///
/// # Errors
///
/// Returns [`ParseError::InvalidTimestampFormat`] if no format matches.
pub fn parse_timestamp_str(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Some(dt) = parse_rfc850(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    Err(ParseError::InvalidTimestampFormat {
        value: s.to_string(),
    }
    .into())
}

/// Maps an epoch count to an instant using its decimal digit count.
///
/// | digits | unit |
/// |--------|------|
/// | 10 | seconds |
/// | 13 | milliseconds |
/// | 16 | microseconds |
/// | 19 | divided by 1000, then microseconds |
///
/// The 19-digit row truncates nanosecond values to microsecond precision.
///
/// # Errors
///
/// Returns [`ParseError::InvalidEpoch`] for any other digit count or for a
/// value outside the representable range.
pub fn from_epoch(value: i128) -> Result<DateTime<Utc>> {
    let digits = value.unsigned_abs().to_string().len();
    let invalid = || ParseError::InvalidEpoch { value, digits };

    let as_i64 = |v: i128| i64::try_from(v).map_err(|_| invalid());
    let dt = match digits {
        10 => DateTime::from_timestamp(as_i64(value)?, 0),
        13 => DateTime::from_timestamp_millis(as_i64(value)?),
        16 => DateTime::from_timestamp_micros(as_i64(value)?),
        19 => DateTime::from_timestamp_micros(as_i64(value / 1000)?),
        _ => None,
    };
    dt.ok_or_else(|| invalid().into())
}

#[allow(clippy::cast_possible_truncation)] // saturating float-to-int cast drops the fraction
fn integer_part(n: &Number) -> i128 {
    if let Some(i) = n.as_i64() {
        return i128::from(i);
    }
    if let Some(u) = n.as_u64() {
        return i128::from(u);
    }
    n.as_f64().map_or(0, |f| f.trunc() as i128)
}

/// Parses `Monday, 02-Jan-06 15:04:05 MST`.
///
/// The zone is an abbreviation. The US zones resolve to the same offsets
/// RFC 2822 gives them, so both layouts agree; any other alphabetic
/// abbreviation is taken as UTC.
fn parse_rfc850(s: &str) -> Option<DateTime<FixedOffset>> {
    let (rest, zone) = s.trim().rsplit_once(' ')?;
    let naive = NaiveDateTime::parse_from_str(rest, RFC850_LAYOUT).ok()?;
    let offset = FixedOffset::east_opt(zone_offset_secs(zone)?)?;
    offset.from_local_datetime(&naive).single()
}

fn zone_offset_secs(zone: &str) -> Option<i32> {
    const HOUR: i32 = 3600;
    if zone.is_empty() || !zone.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let hours = match zone {
        "EST" => -5,
        "EDT" => -4,
        "CST" => -6,
        "CDT" => -5,
        "MST" => -7,
        "MDT" => -6,
        "PST" => -8,
        "PDT" => -7,
        _ => 0,
    };
    Some(hours * HOUR)
}

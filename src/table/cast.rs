//! Parsing of untyped query-API cells against a logical type

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use super::schema::{LogicalType, Value};

/// Naive layouts accepted for timestamps without an offset, interpreted as UTC
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Layouts accepted for timestamps carrying an explicit offset
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f %:z",
];

/// Parse a timestamp and normalize it to UTC.
///
/// Handles both inputs with and without timezone designators:
/// - "2024-01-01T00:00:00Z" - explicit UTC
/// - "2024-01-01T02:00:00+02:00" / "2024-01-01 02:00:00.000 +02:00" - explicit offset
/// - "2024-01-01 00:00:00.000" - no timezone, assumed UTC
/// - "2024-01-01" - start of day UTC
pub fn parse_timestamp_utc(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(input, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    // Trailing "Z" outside RFC 3339 shape, e.g. "2024-01-01 00:00:00Z"
    let naive_input = input.strip_suffix('Z').unwrap_or(input);
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive_input, format) {
            return Some(dt.and_utc());
        }
    }

    NaiveDate::parse_from_str(naive_input, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Cast one raw cell to a typed value.
///
/// `None` and empty strings become [`Value::Null`]. Returns `None` when the
/// text cannot satisfy the requested type.
pub fn cast_cell(raw: Option<&str>, logical_type: LogicalType) -> Option<Value> {
    let text = match raw {
        None => return Some(Value::Null),
        Some(s) if s.trim().is_empty() && logical_type != LogicalType::Utf8 => {
            return Some(Value::Null)
        }
        Some(s) => s,
    };

    match logical_type {
        LogicalType::Utf8 => Some(Value::Utf8(text.to_string())),
        LogicalType::Int64 => parse_int(text.trim()).map(Value::Int64),
        LogicalType::Float64 => text
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| !v.is_nan())
            .map(Value::Float64),
        LogicalType::TimestampUtc => parse_timestamp_utc(text).map(Value::Timestamp),
    }
}

/// Largest magnitude below which every integer is exactly representable as f64
const MAX_EXACT_FLOAT_INT: f64 = 9_007_199_254_740_992.0;

/// Integers occasionally arrive rendered as floats ("123.0"); accept those
/// only when they are integral and exact.
fn parse_int(text: &str) -> Option<i64> {
    if let Ok(v) = text.parse::<i64>() {
        return Some(v);
    }

    // "123.000": take the integer digits as written
    if let Some((whole, frac)) = text.split_once('.') {
        if frac.bytes().all(|b| b == b'0') {
            if let Ok(v) = whole.parse::<i64>() {
                return Some(v);
            }
        }
    }

    let f = text.parse::<f64>().ok()?;
    if f.fract() == 0.0 && f.abs() <= MAX_EXACT_FLOAT_INT {
        Some(f as i64)
    } else {
        None
    }
}

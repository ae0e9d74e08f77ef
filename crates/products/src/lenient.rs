//! Tolerant decoders for backend payloads.
//!
//! Records arrive from several producers (REST responses, push messages, form
//! posts echoed back) and fields are routinely missing, `null`, or numbers
//! encoded as strings. Every arithmetic field defaults to `0` instead of
//! failing the whole record, so a single bad field never yields `NaN` in an
//! aggregate.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Coerce a JSON value into a finite, non-negative number (`0` otherwise).
pub fn number_from_value(value: &Value) -> f64 {
    let n = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };
    if n.is_finite() && n > 0.0 { n } else { 0.0 }
}

/// Parse an ISO-8601 timestamp, with or without an offset.
///
/// Offset-less values (what the backend's `isoformat()` produces) are read as
/// UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

pub fn number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(number_from_value(&value))
}

pub fn opt_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => None,
        other => Some(number_from_value(&other)),
    })
}

/// Strings that may arrive as `null` or as a bare number (SKUs, units).
pub fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

pub fn opt_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// Timestamps as RFC 3339, naive ISO-8601 or epoch milliseconds.
pub fn timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => parse_timestamp(&s),
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use serde_json::json;

    #[test]
    fn numbers_default_to_zero() {
        assert_eq!(number_from_value(&json!(12.5)), 12.5);
        assert_eq!(number_from_value(&json!("7")), 7.0);
        assert_eq!(number_from_value(&json!(null)), 0.0);
        assert_eq!(number_from_value(&json!("n/a")), 0.0);
        assert_eq!(number_from_value(&json!(-3)), 0.0);
        assert_eq!(number_from_value(&json!({"x": 1})), 0.0);
    }

    #[test]
    fn timestamps_accept_naive_iso() {
        let ts = parse_timestamp("2024-03-01T12:30:05.123456").unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day()), (2024, 3, 1));
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (12, 30, 5));

        let with_offset = parse_timestamp("2024-03-01T14:30:05+02:00").unwrap();
        assert_eq!(with_offset.hour(), 12);

        assert!(parse_timestamp("yesterday").is_none());
    }
}

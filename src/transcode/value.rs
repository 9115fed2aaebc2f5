use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde_json::Value;

use crate::types::{RowValues, STORAGE_DATETIME_FORMAT};

/// Tolerant boolean reading: `true/false`, `1/0`, `'1'/'0'`, `'true'/'false'`.
#[must_use]
pub fn parse_bool(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true"),
        _ => false,
    }
}

#[must_use]
pub fn parse_bool_row(value: &RowValues) -> bool {
    match value {
        RowValues::Bool(flag) => *flag,
        RowValues::Int(i) => *i != 0,
        RowValues::Float(f) => *f != 0.0,
        RowValues::Text(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true"),
        RowValues::Blob(bytes) => bytes.first().is_some_and(|b| *b != 0 && *b != b'0'),
        RowValues::JSON(v) => parse_bool(v),
        RowValues::Timestamp(_) | RowValues::Null => false,
    }
}

/// RFC 3339 / ISO-8601 with offset, e.g. `2024-01-02T03:04:05.000Z`.
#[must_use]
pub fn parse_iso_datetime(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[must_use]
pub fn parse_storage_datetime(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, STORAGE_DATETIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
}

#[must_use]
pub fn format_storage(dt: &DateTime<Utc>) -> String {
    dt.format(STORAGE_DATETIME_FORMAT).to_string()
}

/// Storage datetimes are UTC by convention; render them back as RFC 3339 with second precision.
#[must_use]
pub fn storage_to_iso(naive: &NaiveDateTime) -> String {
    naive
        .and_utc()
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parses strings that hold a JSON object or array, including JSON that was stringified twice.
#[must_use]
pub fn parse_json_text(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    match trimmed.as_bytes().first() {
        Some(b'{' | b'[') => match serde_json::from_str::<Value>(trimmed) {
            Ok(parsed @ (Value::Object(_) | Value::Array(_))) => Some(parsed),
            _ => None,
        },
        Some(b'"') => match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::String(inner)) => parse_json_text(&inner),
            _ => None,
        },
        _ => None,
    }
}

/// Storage value without any column-kind interpretation.
#[must_use]
pub fn plain_param(value: &Value) -> RowValues {
    match value {
        Value::Null => RowValues::Null,
        Value::Bool(flag) => RowValues::Bool(*flag),
        Value::Number(n) => number_param(n),
        Value::String(s) => RowValues::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => RowValues::Text(value.to_string()),
    }
}

pub(crate) fn number_param(n: &serde_json::Number) -> RowValues {
    if let Some(i) = n.as_i64() {
        RowValues::Int(i)
    } else {
        RowValues::Float(n.as_f64().unwrap_or_default())
    }
}

/// Text form of a scalar, as used for LIKE patterns.
#[must_use]
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn json_number(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        Value::from(value as i64)
    } else {
        serde_json::Number::from_f64(value).map_or(Value::Null, Value::Number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tolerant_booleans() {
        for truthy in [json!(true), json!(1), json!("1"), json!("true")] {
            assert!(parse_bool(&truthy), "{truthy}");
        }
        for falsy in [json!(false), json!(0), json!("0"), json!(null), json!("false")] {
            assert!(!parse_bool(&falsy), "{falsy}");
        }
        assert!(parse_bool_row(&RowValues::Int(1)));
        assert!(!parse_bool_row(&RowValues::Text("0".into())));
    }

    #[test]
    fn iso_dates_normalize_to_utc_storage() {
        let dt = parse_iso_datetime("2024-03-10T09:15:30+09:00").unwrap();
        assert_eq!(format_storage(&dt), "2024-03-10 00:15:30");
        let naive = parse_storage_datetime("2024-03-10 00:15:30").unwrap();
        assert_eq!(storage_to_iso(&naive), "2024-03-10T00:15:30Z");
    }

    #[test]
    fn json_text_detection() {
        assert_eq!(parse_json_text(r#"{"x":1}"#), Some(json!({"x": 1})));
        assert_eq!(parse_json_text("[1,2]"), Some(json!([1, 2])));
        assert_eq!(parse_json_text(r#""{\"x\":1}""#), Some(json!({"x": 1})));
        assert_eq!(parse_json_text("plain"), None);
        assert_eq!(parse_json_text("{not json"), None);
        assert_eq!(parse_json_text("\"quoted\""), None);
    }

    #[test]
    fn whole_floats_become_integers() {
        assert_eq!(json_number(3.0), json!(3));
        assert_eq!(json_number(2.5), json!(2.5));
    }
}

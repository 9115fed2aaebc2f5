use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Fixed-width storage format for datetimes (`YYYY-MM-DD HH:MM:SS`).
pub const STORAGE_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Values that can be stored in a database row or used as query parameters.
///
/// Both drivers bind and read through this enum, so the compiler and transcoder never branch on
/// driver types:
/// ```rust
/// use mysql_wizard::prelude::*;
///
/// let params = vec![
///     RowValues::Int(1),
///     RowValues::Text("alice".into()),
///     RowValues::Bool(true),
/// ];
/// # let _ = params;
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let RowValues::Timestamp(value) = self {
            return Some(*value);
        } else if let Some(s) = self.as_text() {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, STORAGE_DATETIME_FORMAT) {
                return Some(dt);
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                return Some(dt);
            }
        }
        None
    }

    /// Numeric view used by aggregate results; integers widen, numeric text parses.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            RowValues::Float(value) => Some(*value),
            #[allow(clippy::cast_precision_loss)]
            RowValues::Int(value) => Some(*value as f64),
            RowValues::Text(text) => text.trim().parse::<f64>().ok(),
            RowValues::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Plain JSON rendering with no column-kind interpretation.
    #[must_use]
    pub fn to_json(&self) -> JsonValue {
        match self {
            RowValues::Int(value) => JsonValue::from(*value),
            RowValues::Float(value) => serde_json::Number::from_f64(*value)
                .map_or(JsonValue::Null, JsonValue::Number),
            RowValues::Text(value) => JsonValue::String(value.clone()),
            RowValues::Bool(value) => JsonValue::Bool(*value),
            RowValues::Timestamp(value) => {
                JsonValue::String(value.format(STORAGE_DATETIME_FORMAT).to_string())
            }
            RowValues::Null => JsonValue::Null,
            RowValues::JSON(value) => value.clone(),
            RowValues::Blob(bytes) => JsonValue::String(String::from_utf8_lossy(bytes).into_owned()),
        }
    }
}

/// SQL flavour the compiler renders for.
///
/// Statement text is shared between engines; only the few spots listed on each method differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    #[serde(alias = "mariadb")]
    MySql,
    Sqlite,
}

impl Dialect {
    #[must_use]
    pub fn begin_statement(self) -> &'static str {
        match self {
            Dialect::MySql => "START TRANSACTION",
            Dialect::Sqlite => "BEGIN",
        }
    }

    /// `LIMIT` value meaning "no limit", needed when only `OFFSET` is requested.
    #[must_use]
    pub fn unbounded_limit(self) -> &'static str {
        match self {
            Dialect::MySql => "18446744073709551615",
            Dialect::Sqlite => "-1",
        }
    }

    /// Whether `DEFAULT` is accepted as a value inside `VALUES (...)`.
    #[must_use]
    pub fn supports_default_values(self) -> bool {
        matches!(self, Dialect::MySql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_views() {
        assert_eq!(RowValues::Int(3).as_float(), Some(3.0));
        assert_eq!(RowValues::Text("2.5".into()).as_float(), Some(2.5));
        assert_eq!(RowValues::Null.as_float(), None);
    }

    #[test]
    fn storage_text_reads_as_timestamp() {
        let value = RowValues::Text("2024-03-01 10:20:30".into());
        let ts = value.as_timestamp().unwrap();
        assert_eq!(ts.to_string(), "2024-03-01 10:20:30");
    }

    #[test]
    fn dialect_parses_from_config_strings() {
        let d: Dialect = serde_json::from_str("\"sqlite\"").unwrap();
        assert_eq!(d, Dialect::Sqlite);
        let d: Dialect = serde_json::from_str("\"mariadb\"").unwrap();
        assert_eq!(d, Dialect::MySql);
    }
}

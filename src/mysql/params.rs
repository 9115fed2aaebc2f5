use chrono::NaiveDate;
use mysql_async::Value;
use mysql_async::consts::ColumnType;

use crate::types::{RowValues, STORAGE_DATETIME_FORMAT};

/// Charset id MySQL reports for binary (non-text) columns.
const BINARY_CHARSET: u16 = 63;

/// Result decoding switches taken from the pool configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CastOptions {
    pub cast_boolean: bool,
    pub cast_decimal: bool,
}

/// Convert a `RowValues` into a bound MySQL parameter.
#[must_use]
pub fn row_value_to_mysql_value(value: &RowValues) -> Value {
    match value {
        RowValues::Int(i) => Value::Int(*i),
        RowValues::Float(f) => Value::Double(*f),
        RowValues::Text(s) => Value::Bytes(s.as_bytes().to_vec()),
        RowValues::Bool(b) => Value::Int(i64::from(*b)),
        RowValues::Timestamp(dt) => {
            Value::Bytes(dt.format(STORAGE_DATETIME_FORMAT).to_string().into_bytes())
        }
        RowValues::Null => Value::NULL,
        RowValues::JSON(json) => Value::Bytes(json.to_string().into_bytes()),
        RowValues::Blob(bytes) => Value::Bytes(bytes.clone()),
    }
}

/// Column metadata needed to decode a value.
#[derive(Debug, Clone, Copy)]
pub struct ColumnShape {
    pub column_type: ColumnType,
    pub length: u32,
    pub charset: u16,
}

impl From<&mysql_async::Column> for ColumnShape {
    fn from(column: &mysql_async::Column) -> Self {
        Self {
            column_type: column.column_type(),
            length: column.column_length(),
            charset: column.character_set(),
        }
    }
}

/// Convert one MySQL result value into `RowValues`.
///
/// `TINYINT(1)` reads as a boolean and `DECIMAL` as a float when the matching cast is enabled;
/// zero dates read as NULL.
#[must_use]
pub fn mysql_value_to_row_value(value: Value, column: ColumnShape, cast: CastOptions) -> RowValues {
    match value {
        Value::NULL => RowValues::Null,
        Value::Int(i)
            if cast.cast_boolean
                && column.column_type == ColumnType::MYSQL_TYPE_TINY
                && column.length == 1 =>
        {
            RowValues::Bool(i != 0)
        }
        Value::Int(i) => RowValues::Int(i),
        Value::UInt(u) => i64::try_from(u).map_or_else(|_| RowValues::Text(u.to_string()), RowValues::Int),
        Value::Float(f) => RowValues::Float(f64::from(f)),
        Value::Double(d) => RowValues::Float(d),
        Value::Bytes(bytes) => bytes_to_row_value(bytes, column, cast),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
                .and_then(|date| {
                    date.and_hms_micro_opt(
                        u32::from(hour),
                        u32::from(minute),
                        u32::from(second),
                        micros,
                    )
                })
                .map_or(RowValues::Null, RowValues::Timestamp)
        }
        Value::Time(negative, days, hours, minutes, seconds, _micros) => {
            let total_hours = u64::from(days) * 24 + u64::from(hours);
            let sign = if negative { "-" } else { "" };
            RowValues::Text(format!("{sign}{total_hours:02}:{minutes:02}:{seconds:02}"))
        }
    }
}

fn bytes_to_row_value(bytes: Vec<u8>, column: ColumnShape, cast: CastOptions) -> RowValues {
    match column.column_type {
        ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            if cast.cast_decimal {
                text.parse::<f64>()
                    .map_or(RowValues::Text(text), RowValues::Float)
            } else {
                RowValues::Text(text)
            }
        }
        ColumnType::MYSQL_TYPE_JSON => serde_json::from_slice(&bytes).map_or_else(
            |_| RowValues::Text(String::from_utf8_lossy(&bytes).into_owned()),
            RowValues::JSON,
        ),
        _ if column.charset == BINARY_CHARSET => RowValues::Blob(bytes),
        _ => match String::from_utf8(bytes) {
            Ok(text) => RowValues::Text(text),
            Err(err) => RowValues::Blob(err.into_bytes()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAST: CastOptions = CastOptions {
        cast_boolean: true,
        cast_decimal: true,
    };

    fn shape(column_type: ColumnType, length: u32, charset: u16) -> ColumnShape {
        ColumnShape {
            column_type,
            length,
            charset,
        }
    }

    #[test]
    fn tinyint_one_is_boolean_when_cast() {
        let col = shape(ColumnType::MYSQL_TYPE_TINY, 1, BINARY_CHARSET);
        assert_eq!(mysql_value_to_row_value(Value::Int(1), col, CAST), RowValues::Bool(true));
        let no_cast = CastOptions {
            cast_boolean: false,
            ..CAST
        };
        assert_eq!(mysql_value_to_row_value(Value::Int(1), col, no_cast), RowValues::Int(1));
    }

    #[test]
    fn decimals_follow_cast_switch() {
        let col = shape(ColumnType::MYSQL_TYPE_NEWDECIMAL, 10, BINARY_CHARSET);
        let raw = || Value::Bytes(b"12.50".to_vec());
        assert_eq!(mysql_value_to_row_value(raw(), col, CAST), RowValues::Float(12.5));
        let no_cast = CastOptions {
            cast_decimal: false,
            ..CAST
        };
        assert_eq!(
            mysql_value_to_row_value(raw(), col, no_cast),
            RowValues::Text("12.50".into())
        );
    }

    #[test]
    fn json_and_dates() {
        let json = shape(ColumnType::MYSQL_TYPE_JSON, 0, BINARY_CHARSET);
        assert_eq!(
            mysql_value_to_row_value(Value::Bytes(br#"{"x":1}"#.to_vec()), json, CAST),
            RowValues::JSON(serde_json::json!({"x": 1}))
        );
        let dt = shape(ColumnType::MYSQL_TYPE_DATETIME, 19, BINARY_CHARSET);
        let value = mysql_value_to_row_value(Value::Date(2024, 1, 2, 3, 4, 5, 0), dt, CAST);
        assert_eq!(
            value.as_timestamp().map(|ts| ts.to_string()),
            Some("2024-01-02 03:04:05".to_string())
        );
        assert_eq!(
            mysql_value_to_row_value(Value::Date(0, 0, 0, 0, 0, 0, 0), dt, CAST),
            RowValues::Null
        );
    }

    #[test]
    fn text_and_blob_columns() {
        let text = shape(ColumnType::MYSQL_TYPE_VAR_STRING, 255, 45);
        assert_eq!(
            mysql_value_to_row_value(Value::Bytes(b"hi".to_vec()), text, CAST),
            RowValues::Text("hi".into())
        );
        let blob = shape(ColumnType::MYSQL_TYPE_BLOB, 255, BINARY_CHARSET);
        assert_eq!(
            mysql_value_to_row_value(Value::Bytes(vec![0, 159]), blob, CAST),
            RowValues::Blob(vec![0, 159])
        );
    }

    #[test]
    fn params_bind_booleans_as_integers() {
        assert_eq!(row_value_to_mysql_value(&RowValues::Bool(true)), Value::Int(1));
        assert_eq!(
            row_value_to_mysql_value(&RowValues::Text("a".into())),
            Value::Bytes(b"a".to_vec())
        );
    }
}

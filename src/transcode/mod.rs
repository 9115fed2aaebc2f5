//! Conversion between application objects (camelCase JSON) and storage rows (snake_case columns).
//!
//! Columns may declare a [`ColumnKind`]. Undeclared columns fall back to naming and shape
//! heuristics: an `is_` prefix means boolean, objects and arrays are JSON text, and strings that
//! parse as datetimes are normalized to UTC storage format.

mod case;
mod value;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::results::CustomDbRow;
use crate::types::RowValues;

pub use case::{to_camel_case, to_snake_case};
pub use value::{
    format_storage, parse_bool, parse_bool_row, parse_iso_datetime, parse_json_text,
    parse_storage_datetime, plain_param, scalar_text, storage_to_iso,
};
pub(crate) use value::json_number;

/// Declared storage interpretation of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    /// Use naming and value-shape heuristics.
    #[default]
    Auto,
    Text,
    /// `1`/`0` integers in storage, `true`/`false` in objects.
    Boolean,
    /// JSON text in storage, structured values in objects.
    Json,
    /// `YYYY-MM-DD HH:MM:SS` UTC in storage, RFC 3339 in objects.
    Date,
    Number,
}

impl ColumnKind {
    /// Kind a value is encoded with when the column did not declare one.
    #[must_use]
    pub fn infer(column: &str, value: &Value) -> ColumnKind {
        if is_flag_column(column) {
            return ColumnKind::Boolean;
        }
        match value {
            Value::Object(_) | Value::Array(_) => ColumnKind::Json,
            Value::String(s) if parse_iso_datetime(s).is_some() => ColumnKind::Date,
            _ => ColumnKind::Auto,
        }
    }
}

fn is_flag_column(column: &str) -> bool {
    column
        .rsplit('.')
        .next()
        .is_some_and(|name| name.starts_with("is_"))
}

/// One declared field: its object key, storage column and declared kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub key: String,
    pub column: String,
    pub kind: ColumnKind,
    pub auto_set: bool,
}

/// Row mode for [`Transcoder::to_row`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowMode {
    /// Auto-set columns are left to the database.
    SkipAutoSet,
    /// Every declared key is written, including auto-set ones.
    ForceAutoSet,
}

/// A storage slot produced for one declared key.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Value(RowValues),
    /// The key is absent from the object (`undefined`).
    Absent,
    /// Server-managed column left to its default.
    AutoSet,
}

/// Bidirectional converter bound to a repository's key list.
#[derive(Debug, Clone, Default)]
pub struct Transcoder {
    fields: Vec<FieldSpec>,
    by_key: HashMap<String, usize>,
    by_column: HashMap<String, usize>,
}

impl Transcoder {
    /// `keys` are camelCase field names; `auto_set` may be given in either case.
    #[must_use]
    pub fn new(keys: &[String], auto_set: &[String], kinds: &HashMap<String, ColumnKind>) -> Self {
        let auto_set: HashSet<String> = auto_set.iter().map(|k| to_snake_case(k)).collect();
        let mut fields = Vec::with_capacity(keys.len());
        let mut by_key = HashMap::with_capacity(keys.len());
        let mut by_column = HashMap::with_capacity(keys.len());
        for key in keys {
            let column = to_snake_case(key);
            let kind = kinds
                .get(key)
                .or_else(|| kinds.get(&column))
                .copied()
                .unwrap_or_default();
            by_key.insert(key.clone(), fields.len());
            by_column.insert(column.clone(), fields.len());
            fields.push(FieldSpec {
                key: key.clone(),
                auto_set: auto_set.contains(&column),
                column,
                kind,
            });
        }
        Self {
            fields,
            by_key,
            by_column,
        }
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Looks a field up by object key or by column name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.by_key
            .get(name)
            .or_else(|| self.by_column.get(name))
            .map(|&idx| &self.fields[idx])
    }

    /// Storage column for a field name; undeclared names are converted by case only.
    #[must_use]
    pub fn column_for(&self, name: &str) -> String {
        self.field(name)
            .map_or_else(|| to_snake_case(name), |f| f.column.clone())
    }

    fn declared_kind(&self, name: &str) -> ColumnKind {
        self.field(name).map(|f| f.kind).unwrap_or_default()
    }

    /// Encode one application value for the given field, as a bound parameter.
    #[must_use]
    pub fn encode(&self, name: &str, value: &Value) -> RowValues {
        let column = self.column_for(name);
        let kind = match self.declared_kind(name) {
            ColumnKind::Auto => ColumnKind::infer(&column, value),
            declared => declared,
        };
        encode_with_kind(kind, value)
    }

    /// Decode one storage value for the given column.
    #[must_use]
    pub fn decode(&self, column: &str, value: &RowValues) -> Value {
        decode_with_kind(self.declared_kind(column), column, value)
    }

    /// One slot per declared key, in key order.
    #[must_use]
    pub fn to_row(&self, object: &Map<String, Value>, mode: RowMode) -> Vec<(String, Slot)> {
        self.fields
            .iter()
            .map(|field| {
                let slot = if field.auto_set && mode == RowMode::SkipAutoSet {
                    Slot::AutoSet
                } else {
                    match object.get(&field.key) {
                        Some(value) => Slot::Value(self.encode(&field.key, value)),
                        None if field.auto_set => Slot::AutoSet,
                        None => Slot::Absent,
                    }
                };
                (field.column.clone(), slot)
            })
            .collect()
    }

    /// SET-clause pairs for the present, declared, non-auto-set fields of a partial object.
    #[must_use]
    pub fn to_partial_row(&self, object: &Map<String, Value>) -> Vec<(String, RowValues)> {
        self.fields
            .iter()
            .filter(|field| !field.auto_set)
            .filter_map(|field| {
                object
                    .get(&field.key)
                    .map(|value| (field.column.clone(), self.encode(&field.key, value)))
            })
            .collect()
    }

    /// Inverse of [`Transcoder::to_row`] over a whole result row.
    ///
    /// Columns outside the key list (aggregate aliases, raw select fragments) are kept under their
    /// camelCase name with heuristic decoding.
    #[must_use]
    pub fn to_object(&self, row: &CustomDbRow) -> Map<String, Value> {
        self.object_from_columns(row.iter())
    }

    pub(crate) fn object_from_columns<'a>(
        &self,
        columns: impl Iterator<Item = (&'a str, &'a RowValues)>,
    ) -> Map<String, Value> {
        let mut object = Map::new();
        for (column, value) in columns {
            let (key, decoded) = match self.by_column.get(column) {
                Some(&idx) => {
                    let field = &self.fields[idx];
                    (field.key.clone(), decode_with_kind(field.kind, column, value))
                }
                None => (to_camel_case(column), decode_with_kind(ColumnKind::Auto, column, value)),
            };
            object.entry(key).or_insert(decoded);
        }
        object
    }
}

#[must_use]
pub fn encode_with_kind(kind: ColumnKind, value: &Value) -> RowValues {
    match kind {
        ColumnKind::Boolean => RowValues::Int(i64::from(parse_bool(value))),
        ColumnKind::Json => match value {
            Value::Null => RowValues::Null,
            other => RowValues::Text(other.to_string()),
        },
        ColumnKind::Date => encode_date(value),
        ColumnKind::Number => match value {
            Value::Number(n) => value::number_param(n),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(RowValues::Int)
                .or_else(|_| s.trim().parse::<f64>().map(RowValues::Float))
                .unwrap_or_else(|_| RowValues::Text(s.clone())),
            Value::Bool(flag) => RowValues::Int(i64::from(*flag)),
            other => plain_param(other),
        },
        ColumnKind::Text => match value {
            Value::Null => RowValues::Null,
            other => RowValues::Text(scalar_text(other)),
        },
        ColumnKind::Auto => plain_param(value),
    }
}

fn encode_date(value: &Value) -> RowValues {
    match value {
        Value::String(s) => match parse_iso_datetime(s) {
            Some(dt) => RowValues::Text(format_storage(&dt)),
            None => RowValues::Text(s.clone()),
        },
        Value::Number(n) => n
            .as_i64()
            .and_then(chrono::DateTime::from_timestamp_millis)
            .map_or_else(|| value::number_param(n), |dt| RowValues::Text(format_storage(&dt))),
        other => plain_param(other),
    }
}

#[must_use]
pub fn decode_with_kind(kind: ColumnKind, column: &str, value: &RowValues) -> Value {
    let kind = match kind {
        ColumnKind::Auto if is_flag_column(column) => ColumnKind::Boolean,
        other => other,
    };
    match (kind, value) {
        (ColumnKind::Boolean, value) => Value::Bool(parse_bool_row(value)),
        (_, RowValues::Null) => Value::Null,
        (_, RowValues::Timestamp(ts)) => Value::String(storage_to_iso(ts)),
        (ColumnKind::Json, RowValues::Text(text)) => {
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone()))
        }
        (ColumnKind::Json, RowValues::Blob(bytes)) => serde_json::from_slice(bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned())),
        (ColumnKind::Date | ColumnKind::Auto, RowValues::Text(text)) => {
            if let Some(parsed) = parse_storage_datetime(text) {
                Value::String(storage_to_iso(&parsed))
            } else if kind == ColumnKind::Auto {
                parse_json_text(text).unwrap_or_else(|| Value::String(text.clone()))
            } else {
                Value::String(text.clone())
            }
        }
        (ColumnKind::Number, RowValues::Text(text)) => text
            .trim()
            .parse::<f64>()
            .map_or_else(|_| Value::String(text.clone()), json_number),
        (ColumnKind::Text, RowValues::Text(text)) => Value::String(text.clone()),
        (ColumnKind::Text, other) => Value::String(scalar_text(&other.to_json())),
        (_, other) => other.to_json(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn transcoder() -> Transcoder {
        let keys: Vec<String> = ["id", "name", "isValid", "meta", "createdAt", "score", "tag"]
            .iter()
            .map(ToString::to_string)
            .collect();
        let mut kinds = HashMap::new();
        kinds.insert("tag".to_string(), ColumnKind::Json);
        kinds.insert("score".to_string(), ColumnKind::Number);
        Transcoder::new(&keys, &["id".to_string()], &kinds)
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn to_row_converts_values_and_names() {
        let t = transcoder();
        let row = t.to_row(
            &object(json!({
                "id": 9,
                "name": "a",
                "isValid": true,
                "meta": {"x": 1},
                "createdAt": "2024-05-01T10:20:30.123Z",
            })),
            RowMode::SkipAutoSet,
        );
        assert_eq!(row[0], ("id".into(), Slot::AutoSet));
        assert_eq!(row[1], ("name".into(), Slot::Value(RowValues::Text("a".into()))));
        assert_eq!(row[2], ("is_valid".into(), Slot::Value(RowValues::Int(1))));
        assert_eq!(
            row[3],
            ("meta".into(), Slot::Value(RowValues::Text(r#"{"x":1}"#.into())))
        );
        assert_eq!(
            row[4],
            (
                "created_at".into(),
                Slot::Value(RowValues::Text("2024-05-01 10:20:30".into()))
            )
        );
        assert_eq!(row[5], ("score".into(), Slot::Absent));
    }

    #[test]
    fn forced_auto_set_writes_value() {
        let t = transcoder();
        let row = t.to_row(&object(json!({"id": 9})), RowMode::ForceAutoSet);
        assert_eq!(row[0], ("id".into(), Slot::Value(RowValues::Int(9))));
    }

    #[test]
    fn null_flag_is_written_as_zero() {
        let t = transcoder();
        let set = t.to_partial_row(&object(json!({"isValid": null, "id": 4})));
        assert_eq!(set, vec![("is_valid".to_string(), RowValues::Int(0))]);
    }

    #[test]
    fn to_object_reverses_to_row() {
        let t = transcoder();
        let mut rs = crate::results::ResultSet::with_capacity(1);
        rs.set_column_names(std::sync::Arc::new(
            ["id", "name", "is_valid", "meta", "created_at", "score", "tag", "extra_total"]
                .iter()
                .map(ToString::to_string)
                .collect(),
        ));
        rs.add_row_values(vec![
            RowValues::Int(1),
            RowValues::Text("a".into()),
            RowValues::Text("1".into()),
            RowValues::Text(r#"{"x":1}"#.into()),
            RowValues::Text("2024-05-01 10:20:30".into()),
            RowValues::Text("12.50".into()),
            RowValues::Text("\"plain\"".into()),
            RowValues::Int(3),
        ]);
        let obj = t.to_object(&rs.results[0]);
        assert_eq!(
            Value::Object(obj),
            json!({
                "id": 1,
                "name": "a",
                "isValid": true,
                "meta": {"x": 1},
                "createdAt": "2024-05-01T10:20:30Z",
                "score": 12.5,
                "tag": "plain",
                "extraTotal": 3,
            })
        );
    }

    #[test]
    fn declared_text_is_not_parsed_as_json() {
        let mut kinds = HashMap::new();
        kinds.insert("note".to_string(), ColumnKind::Text);
        let t = Transcoder::new(&["note".to_string()], &[], &kinds);
        assert_eq!(
            t.decode("note", &RowValues::Text("[draft]".into())),
            json!("[draft]")
        );
        assert_eq!(
            t.decode("note", &RowValues::Text("[1,2]".into())),
            json!("[1,2]")
        );
    }
}

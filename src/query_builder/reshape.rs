use std::collections::HashMap;

use serde_json::{Map, Value};

use super::relation::{RELATION_MARKER, Relation, RelationType};
use crate::results::ResultSet;
use crate::transcode::{ColumnKind, Transcoder, decode_with_kind, to_camel_case};

struct RelationSlot<'a> {
    name: &'a str,
    relation_type: RelationType,
    /// `(result column index, storage column name)`
    columns: Vec<(usize, String)>,
}

struct Layout<'a> {
    main: Vec<usize>,
    relations: Vec<RelationSlot<'a>>,
}

/// Attribute every result column to the main entity or one of the requested relations.
///
/// Keyed relations are recognized by their `table__column` alias; keyless ones own every column
/// between their marker column and the next marker.
fn layout<'a>(columns: &[String], requested: &[(&'a str, &'a Relation)]) -> Layout<'a> {
    let mut relations: Vec<RelationSlot<'a>> = requested
        .iter()
        .map(|(name, relation)| RelationSlot {
            name,
            relation_type: relation.relation_type,
            columns: Vec::new(),
        })
        .collect();
    let prefixes: Vec<(usize, String)> = requested
        .iter()
        .enumerate()
        .filter(|(_, (_, relation))| relation.keys.is_some())
        .map(|(idx, (_, relation))| (idx, relation.alias_prefix()))
        .collect();

    let mut main = Vec::new();
    let mut segment: Option<usize> = None;
    for (i, column) in columns.iter().enumerate() {
        if let Some(name) = column.strip_prefix(RELATION_MARKER) {
            segment = requested.iter().position(|(n, _)| *n == name);
            continue;
        }
        let keyed = prefixes.iter().find_map(|(idx, prefix)| {
            column
                .strip_prefix(prefix.as_str())
                .map(|stripped| (*idx, stripped.to_string()))
        });
        match (keyed, segment) {
            (Some((idx, stripped)), _) => relations[idx].columns.push((i, stripped)),
            (None, Some(idx)) => relations[idx].columns.push((i, column.clone())),
            (None, None) => main.push(i),
        }
    }
    Layout { main, relations }
}

/// Turn flat joined rows into main objects with nested relation fields.
///
/// With any `HasMany` relation, rows sharing the same main payload collapse into one object whose
/// has-many field collects the distinct related objects. Otherwise each row maps to one object.
/// A relation with no non-null column in a row is `null` (one) or contributes nothing (many).
#[must_use]
pub fn reshape_rows(
    rows: &ResultSet,
    transcoder: &Transcoder,
    requested: &[(&str, &Relation)],
) -> Vec<Map<String, Value>> {
    let Some(columns) = rows.get_column_names() else {
        return Vec::new();
    };
    let layout = layout(columns, requested);
    let grouped = layout
        .relations
        .iter()
        .any(|slot| slot.relation_type == RelationType::HasMany);

    let mut out: Vec<Map<String, Value>> = Vec::with_capacity(rows.results.len());
    let mut groups: HashMap<String, usize> = HashMap::new();

    for row in &rows.results {
        let main = transcoder.object_from_columns(
            layout
                .main
                .iter()
                .filter_map(|&i| Some((columns.get(i)?.as_str(), row.get_by_index(i)?))),
        );
        let related: Vec<Option<Map<String, Value>>> = layout
            .relations
            .iter()
            .map(|slot| {
                let mut object = Map::new();
                let mut any_value = false;
                for (i, column) in &slot.columns {
                    if let Some(value) = row.get_by_index(*i) {
                        any_value |= !value.is_null();
                        object
                            .entry(to_camel_case(column))
                            .or_insert_with(|| decode_with_kind(ColumnKind::Auto, column, value));
                    }
                }
                any_value.then_some(object)
            })
            .collect();

        if !grouped {
            let mut object = main;
            for (slot, rel) in layout.relations.iter().zip(related) {
                object.insert(slot.name.to_string(), rel.map_or(Value::Null, Value::Object));
            }
            out.push(object);
            continue;
        }

        let key = Value::Object(main.clone()).to_string();
        let idx = *groups.entry(key).or_insert_with(|| {
            let mut object = main;
            for slot in &layout.relations {
                let empty = match slot.relation_type {
                    RelationType::HasMany => Value::Array(Vec::new()),
                    RelationType::HasOne | RelationType::BelongsTo => Value::Null,
                };
                object.insert(slot.name.to_string(), empty);
            }
            out.push(object);
            out.len() - 1
        });

        let target = &mut out[idx];
        for (slot, rel) in layout.relations.iter().zip(related) {
            let Some(rel) = rel else { continue };
            let rel = Value::Object(rel);
            match (slot.relation_type, target.get_mut(slot.name)) {
                (RelationType::HasMany, Some(Value::Array(items))) => {
                    if !items.contains(&rel) {
                        items.push(rel);
                    }
                }
                (_, Some(existing)) if existing.is_null() => *existing = rel,
                _ => {}
            }
        }
    }
    out
}

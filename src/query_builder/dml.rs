use serde_json::{Map, Value};

use super::{Statement, TableContext, quote_identifier};
use crate::condition::{CompareQuery, compile_query};
use crate::error::DbError;
use crate::transcode::{RowMode, Slot};
use crate::types::RowValues;

/// Per-call insert switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOptions {
    /// Write auto-set columns from the payload instead of leaving them to the database.
    pub force_auto_set: bool,
}

/// Multi-row `INSERT` for a batch of objects, or `None` for an empty batch.
///
/// The first row decides which columns are left to their default: auto-set columns and keys the
/// row leaves out. Later rows follow that shape, with a missing value bound as NULL. `DEFAULT`
/// placeholders are only emitted for MySQL; SQLite omits those columns from the column list
/// instead.
///
/// # Errors
///
/// Returns [`DbError::Execution`] when SQLite would need `DEFAULT VALUES` for more than one row.
pub fn insert_statement(
    ctx: &TableContext,
    rows: &[Map<String, Value>],
    options: InsertOptions,
) -> Result<Option<Statement>, DbError> {
    let mode = if options.force_auto_set {
        RowMode::ForceAutoSet
    } else {
        RowMode::SkipAutoSet
    };
    let encoded: Vec<Vec<(String, Slot)>> = rows
        .iter()
        .map(|row| ctx.transcoder.to_row(row, mode))
        .collect();
    let Some(first) = encoded.first() else {
        return Ok(None);
    };

    let inline_defaults = ctx.dialect.supports_default_values();
    // (position in the encoded row, column, left to default)
    let shape: Vec<(usize, &str, bool)> = first
        .iter()
        .enumerate()
        .map(|(i, (column, slot))| {
            (i, column.as_str(), matches!(slot, Slot::AutoSet | Slot::Absent))
        })
        .filter(|(_, _, default)| inline_defaults || !default)
        .collect();

    let table = ctx.quoted_table();
    if shape.is_empty() {
        if inline_defaults {
            let tuples = vec!["()"; encoded.len()].join(", ");
            return Ok(Some(Statement::new(
                format!("INSERT INTO {table} () VALUES {tuples}"),
                Vec::new(),
            )));
        }
        if encoded.len() > 1 {
            return Err(DbError::Execution(format!(
                "cannot insert {} rows into {table} with only default values",
                encoded.len()
            )));
        }
        return Ok(Some(Statement::new(
            format!("INSERT INTO {table} DEFAULT VALUES"),
            Vec::new(),
        )));
    }

    let columns: Vec<String> = shape
        .iter()
        .map(|(_, column, _)| quote_identifier(column))
        .collect();
    let tuple = format!(
        "({})",
        shape
            .iter()
            .map(|(_, _, default)| if *default { "DEFAULT" } else { "?" })
            .collect::<Vec<_>>()
            .join(", ")
    );

    let mut params = Vec::with_capacity(encoded.len() * shape.len());
    for row in &encoded {
        for (i, _, default) in &shape {
            if *default {
                continue;
            }
            params.push(match row.get(*i).map(|(_, slot)| slot) {
                Some(Slot::Value(value)) => value.clone(),
                Some(Slot::Absent | Slot::AutoSet) | None => RowValues::Null,
            });
        }
    }

    Ok(Some(Statement::new(
        format!(
            "INSERT INTO {table} ({}) VALUES {}",
            columns.join(", "),
            vec![tuple.as_str(); encoded.len()].join(", ")
        ),
        params,
    )))
}

/// `UPDATE ... SET ... WHERE ...` for one condition/payload pair, or `None` when the payload has
/// no writable field.
///
/// # Errors
///
/// Returns [`DbError::Execution`] when the condition compiles to nothing, so a filter that lost
/// all its values never rewrites the whole table.
pub fn update_statement(
    ctx: &TableContext,
    condition: &CompareQuery,
    payload: &Map<String, Value>,
) -> Result<Option<Statement>, DbError> {
    let set = ctx.transcoder.to_partial_row(payload);
    if set.is_empty() {
        return Ok(None);
    }
    let filter = compile_query(&ctx.scope(false), condition);
    if filter.is_empty() {
        return Err(DbError::Execution(format!(
            "refusing to update {} without a condition",
            ctx.quoted_table()
        )));
    }

    let assignments: Vec<String> = set
        .iter()
        .map(|(column, _)| format!("{} = ?", quote_identifier(column)))
        .collect();
    let mut params: Vec<RowValues> = set.into_iter().map(|(_, value)| value).collect();
    params.extend(filter.params);
    Ok(Some(Statement::new(
        format!(
            "UPDATE {} SET {} WHERE {}",
            ctx.quoted_table(),
            assignments.join(", "),
            filter.sql
        ),
        params,
    )))
}

/// # Errors
///
/// Returns [`DbError::Execution`] when the condition compiles to nothing.
pub fn delete_statement(ctx: &TableContext, condition: &CompareQuery) -> Result<Statement, DbError> {
    let filter = compile_query(&ctx.scope(false), condition);
    if filter.is_empty() {
        return Err(DbError::Execution(format!(
            "refusing to delete from {} without a condition",
            ctx.quoted_table()
        )));
    }
    Ok(Statement::new(
        format!("DELETE FROM {} WHERE {}", ctx.quoted_table(), filter.sql),
        filter.params,
    ))
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, HashMap};

    use serde_json::json;

    use super::*;
    use crate::transcode::Transcoder;
    use crate::types::Dialect;

    fn ctx(dialect: Dialect) -> TableContext {
        let keys: Vec<String> = ["id", "name", "isValid", "meta", "createdAt"]
            .iter()
            .map(ToString::to_string)
            .collect();
        TableContext {
            table: "items".into(),
            transcoder: Transcoder::new(
                &keys,
                &["id".to_string(), "createdAt".to_string()],
                &HashMap::new(),
            ),
            relations: BTreeMap::new(),
            dialect,
            print_query: false,
        }
    }

    fn rows(values: &[Value]) -> Vec<Map<String, Value>> {
        values
            .iter()
            .filter_map(|v| v.as_object().cloned())
            .collect()
    }

    #[test]
    fn mysql_insert_uses_default_placeholders() {
        let stmt = insert_statement(
            &ctx(Dialect::MySql),
            &rows(&[
                json!({"name": "a", "isValid": true, "meta": {"x": 1}}),
                json!({"name": "b", "isValid": false}),
            ]),
            InsertOptions::default(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO `items` (`id`, `name`, `is_valid`, `meta`, `created_at`) VALUES (DEFAULT, ?, ?, ?, DEFAULT), (DEFAULT, ?, ?, ?, DEFAULT)"
        );
        assert_eq!(
            stmt.params,
            vec![
                RowValues::Text("a".into()),
                RowValues::Int(1),
                RowValues::Text("{\"x\":1}".into()),
                RowValues::Text("b".into()),
                RowValues::Int(0),
                RowValues::Null,
            ]
        );
    }

    #[test]
    fn sqlite_insert_drops_default_columns() {
        let stmt = insert_statement(
            &ctx(Dialect::Sqlite),
            &rows(&[json!({"name": "a"})]),
            InsertOptions::default(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(stmt.sql, "INSERT INTO `items` (`name`) VALUES (?)");
        assert_eq!(stmt.params, vec![RowValues::Text("a".into())]);
    }

    #[test]
    fn keys_missing_from_first_row_use_defaults() {
        let stmt = insert_statement(
            &ctx(Dialect::MySql),
            &rows(&[
                json!({"name": "a", "meta": null}),
                json!({"name": "b", "isValid": true}),
            ]),
            InsertOptions::default(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO `items` (`id`, `name`, `is_valid`, `meta`, `created_at`) VALUES (DEFAULT, ?, DEFAULT, ?, DEFAULT), (DEFAULT, ?, DEFAULT, ?, DEFAULT)"
        );
        assert_eq!(
            stmt.params,
            vec![
                RowValues::Text("a".into()),
                RowValues::Null,
                RowValues::Text("b".into()),
                RowValues::Null,
            ]
        );
    }

    #[test]
    fn forced_auto_set_writes_given_values() {
        let stmt = insert_statement(
            &ctx(Dialect::Sqlite),
            &rows(&[json!({"id": 7, "name": "a", "createdAt": "2024-01-02T03:04:05Z"})]),
            InsertOptions {
                force_auto_set: true,
            },
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO `items` (`id`, `name`, `is_valid`, `meta`, `created_at`) VALUES (?, ?, ?, ?, ?)"
        );
        assert_eq!(stmt.params[0], RowValues::Int(7));
        assert_eq!(stmt.params[4], RowValues::Text("2024-01-02 03:04:05".into()));
    }

    #[test]
    fn empty_batch_is_not_a_statement() {
        assert!(
            insert_statement(&ctx(Dialect::MySql), &[], InsertOptions::default())
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn update_sets_present_fields_only() {
        let stmt = update_statement(
            &ctx(Dialect::MySql),
            &CompareQuery::new().eq("id", 5),
            &rows(&[json!({"name": "z", "id": 9, "unknown": 1})])[0],
        )
        .unwrap()
        .unwrap();
        assert_eq!(stmt.sql, "UPDATE `items` SET `name` = ? WHERE `id` = ?");
        assert_eq!(stmt.params, vec![RowValues::Text("z".into()), RowValues::Int(5)]);
    }

    #[test]
    fn update_without_writable_fields_is_skipped() {
        let stmt = update_statement(
            &ctx(Dialect::MySql),
            &CompareQuery::new().eq("id", 5),
            &Map::new(),
        )
        .unwrap();
        assert!(stmt.is_none());
    }

    #[test]
    fn unfiltered_writes_are_refused() {
        let absent = CompareQuery::new().eq("id", None::<i64>);
        assert!(update_statement(&ctx(Dialect::MySql), &absent, &rows(&[json!({"name": "z"})])[0]).is_err());
        assert!(delete_statement(&ctx(Dialect::MySql), &absent).is_err());
    }

    #[test]
    fn delete_compiles_condition() {
        let stmt = delete_statement(
            &ctx(Dialect::MySql),
            &CompareQuery::new().is_in("id", [1, 2]),
        )
        .unwrap();
        assert_eq!(stmt.sql, "DELETE FROM `items` WHERE `id` IN (?, ?)");
    }
}

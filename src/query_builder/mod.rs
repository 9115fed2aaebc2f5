//! Statement construction: clauses, relation joins, aggregates and the select/write builders.
//!
//! Everything here is pure string and parameter assembly over a [`TableContext`]; execution
//! happens through [`crate::repository::Repository`].

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::condition::CompileScope;
use crate::transcode::{Transcoder, to_snake_case};
use crate::types::{Dialect, RowValues};

mod aggregate;
mod clause;
mod dml;
mod relation;
mod reshape;
mod select;

pub use aggregate::{Aggregate, AggregateFn, calculate_statement, read_aggregates};
pub use clause::{
    JoinClause, JoinType, OrderBy, SortDirection, is_raw_fragment, join_clause, limit_clause,
    order_by_clause, select_columns,
};
pub use dml::{InsertOptions, delete_statement, insert_statement, update_statement};
pub use relation::{Relation, RelationType, relation_joins, resolve_relations};
pub use reshape::reshape_rows;
pub use select::{SelectBuilder, SelectOneBuilder, SelectOptions, select_statement};

/// A compiled statement ready to bind and run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<RowValues>,
}

impl Statement {
    #[must_use]
    pub fn new(sql: impl Into<String>, params: Vec<RowValues>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Always at `debug`; also at `info` when the repository or pool asks for query printing.
    pub(crate) fn log(&self, ctx: &TableContext) {
        debug!(table = %ctx.table, sql = %self.sql, "compiled statement");
        if ctx.print_query {
            info!(table = %ctx.table, sql = %self.sql, params = ?self.params, "query");
        }
    }
}

impl std::fmt::Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Immutable per-repository data every builder borrows.
#[derive(Debug, Clone)]
pub struct TableContext {
    pub table: String,
    pub transcoder: Transcoder,
    pub relations: BTreeMap<String, Relation>,
    pub dialect: Dialect,
    pub print_query: bool,
}

impl TableContext {
    #[must_use]
    pub fn scope(&self, qualify: bool) -> CompileScope<'_> {
        let scope = CompileScope::new(&self.transcoder);
        if qualify {
            scope.qualified(&self.table)
        } else {
            scope
        }
    }

    #[must_use]
    pub fn quoted_table(&self) -> String {
        quote_identifier(&self.table)
    }
}

/// Backtick-quote one identifier segment.
#[must_use]
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Quote a column reference, converting the column part to snake_case.
///
/// `table.column` quotes both segments; `table.*` keeps the star bare.
#[must_use]
pub fn quote_column(reference: &str) -> String {
    match reference.split_once('.') {
        Some((table, "*")) => format!("{}.*", quote_identifier(table)),
        Some((table, column)) => format!(
            "{}.{}",
            quote_identifier(table),
            quote_identifier(&to_snake_case(column))
        ),
        None => quote_identifier(&to_snake_case(reference)),
    }
}

/// `n` comma-separated `?` placeholders.
#[must_use]
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting() {
        assert_eq!(quote_identifier("users"), "`users`");
        assert_eq!(quote_identifier("we`ird"), "`we``ird`");
        assert_eq!(quote_column("createdAt"), "`created_at`");
        assert_eq!(quote_column("posts.authorId"), "`posts`.`author_id`");
        assert_eq!(quote_column("posts.*"), "`posts`.*");
    }

    #[test]
    fn placeholder_lists() {
        assert_eq!(placeholders(3), "?, ?, ?");
        assert_eq!(placeholders(0), "");
    }
}

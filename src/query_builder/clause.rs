use super::{quote_column, quote_identifier};
use crate::types::Dialect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: SortDirection,
}

impl OrderBy {
    #[must_use]
    pub fn new(column: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            column: column.into(),
            direction,
        }
    }

    #[must_use]
    pub fn asc(column: impl Into<String>) -> Self {
        Self::new(column, SortDirection::Asc)
    }

    #[must_use]
    pub fn desc(column: impl Into<String>) -> Self {
        Self::new(column, SortDirection::Desc)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    Full,
}

impl JoinType {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            JoinType::Inner => "INNER",
            JoinType::Left => "LEFT",
            JoinType::Right => "RIGHT",
            JoinType::Full => "FULL",
        }
    }
}

/// `<TYPE> JOIN table ON left = right`; columns accept the `table.column` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinClause {
    pub table: String,
    pub left_column: String,
    pub right_column: String,
    pub join_type: JoinType,
}

impl JoinClause {
    #[must_use]
    pub fn new(
        table: impl Into<String>,
        left_column: impl Into<String>,
        right_column: impl Into<String>,
        join_type: JoinType,
    ) -> Self {
        Self {
            table: table.into(),
            left_column: left_column.into(),
            right_column: right_column.into(),
            join_type,
        }
    }
}

/// ` ORDER BY ...`, or nothing for an empty list.
///
/// When `qualifier` is set, bare columns that `is_table_column` accepts get the table prefix.
/// Anything else (select aliases, dotted names) is only quoted.
#[must_use]
pub fn order_by_clause(
    items: &[OrderBy],
    qualifier: Option<&str>,
    is_table_column: impl Fn(&str) -> bool,
) -> String {
    if items.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = items
        .iter()
        .map(|item| {
            let column = match qualifier {
                Some(table) if !item.column.contains('.') && is_table_column(&item.column) => {
                    quote_column(&format!("{table}.{}", item.column))
                }
                _ => quote_column(&item.column),
            };
            format!("{column} {}", item.direction.as_sql())
        })
        .collect();
    format!(" ORDER BY {}", parts.join(", "))
}

/// ` LIMIT n` and/or ` OFFSET m`. Nothing is limited unless asked for.
#[must_use]
pub fn limit_clause(limit: Option<u64>, offset: Option<u64>, dialect: Dialect) -> String {
    match (limit, offset) {
        (None, None) => String::new(),
        (Some(limit), None) => format!(" LIMIT {limit}"),
        (Some(limit), Some(offset)) => format!(" LIMIT {limit} OFFSET {offset}"),
        (None, Some(offset)) => format!(" LIMIT {} OFFSET {offset}", dialect.unbounded_limit()),
    }
}

#[must_use]
pub fn join_clause(joins: &[JoinClause]) -> String {
    joins
        .iter()
        .map(|join| {
            format!(
                " {} JOIN {} ON {} = {}",
                join.join_type.as_sql(),
                quote_identifier(&join.table),
                quote_column(&join.left_column),
                quote_column(&join.right_column)
            )
        })
        .collect()
}

/// Raw SQL fragments (`*`, function calls, aliases) are passed through unquoted.
#[must_use]
pub fn is_raw_fragment(column: &str) -> bool {
    column.contains('*') || column.contains('(') || column.to_uppercase().contains(" AS ")
}

/// Explicit select list; plain and dotted names are quoted and snake_cased.
#[must_use]
pub fn select_columns(columns: &[String]) -> String {
    columns
        .iter()
        .map(|column| {
            if is_raw_fragment(column) && !column.ends_with(".*") {
                column.clone()
            } else {
                quote_column(column)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

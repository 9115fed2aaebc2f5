use std::collections::BTreeMap;

use serde_json::Value;

use super::clause::join_clause;
use super::relation::relation_joins;
use super::select::SelectOptions;
use super::{Statement, TableContext, quote_identifier};
use crate::condition::{CompareQuery, compile_query, compile_where};
use crate::error::DbError;
use crate::results::ResultSet;
use crate::transcode::plain_param;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFn {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateFn {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            AggregateFn::Count => "COUNT",
            AggregateFn::Sum => "SUM",
            AggregateFn::Avg => "AVG",
            AggregateFn::Min => "MIN",
            AggregateFn::Max => "MAX",
        }
    }
}

/// One aggregate expression in a `calculate` call, read back under `alias`.
///
/// With a [`when`](Aggregate::when) condition the aggregated expression becomes
/// `CASE WHEN <cond> THEN <then> ELSE <otherwise> END` (`COUNT` counts matching rows instead).
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub function: AggregateFn,
    pub alias: String,
    /// `None` means `*` for `COUNT`.
    pub column: Option<String>,
    pub when: Option<CompareQuery>,
    pub then: Value,
    pub otherwise: Value,
    /// Wrap the column in `COALESCE(col, 0)` when no `when` is given.
    pub coalesce: bool,
}

impl Aggregate {
    #[must_use]
    pub fn new(function: AggregateFn, alias: impl Into<String>, column: Option<String>) -> Self {
        Self {
            function,
            alias: alias.into(),
            column,
            when: None,
            then: Value::from(1),
            otherwise: Value::from(0),
            coalesce: matches!(function, AggregateFn::Sum | AggregateFn::Avg),
        }
    }

    /// `COUNT(*)`.
    #[must_use]
    pub fn count(alias: impl Into<String>) -> Self {
        Self::new(AggregateFn::Count, alias, None)
    }

    /// `COUNT(column)`, which skips NULLs.
    #[must_use]
    pub fn count_column(alias: impl Into<String>, column: impl Into<String>) -> Self {
        Self::new(AggregateFn::Count, alias, Some(column.into()))
    }

    #[must_use]
    pub fn sum(alias: impl Into<String>, column: impl Into<String>) -> Self {
        Self::new(AggregateFn::Sum, alias, Some(column.into()))
    }

    #[must_use]
    pub fn avg(alias: impl Into<String>, column: impl Into<String>) -> Self {
        Self::new(AggregateFn::Avg, alias, Some(column.into()))
    }

    #[must_use]
    pub fn min(alias: impl Into<String>, column: impl Into<String>) -> Self {
        Self::new(AggregateFn::Min, alias, Some(column.into()))
    }

    #[must_use]
    pub fn max(alias: impl Into<String>, column: impl Into<String>) -> Self {
        Self::new(AggregateFn::Max, alias, Some(column.into()))
    }

    #[must_use]
    pub fn when(mut self, condition: CompareQuery) -> Self {
        self.when = Some(condition);
        self
    }

    #[must_use]
    pub fn then(mut self, value: impl Into<Value>) -> Self {
        self.then = value.into();
        self
    }

    #[must_use]
    pub fn otherwise(mut self, value: impl Into<Value>) -> Self {
        self.otherwise = value.into();
        self
    }

    #[must_use]
    pub fn coalesce(mut self, coalesce: bool) -> Self {
        self.coalesce = coalesce;
        self
    }

    fn compile(&self, ctx: &TableContext, qualify: bool) -> (String, Vec<crate::types::RowValues>) {
        let scope = ctx.scope(qualify);
        let function = self.function.as_sql();
        let alias = quote_identifier(&self.alias);
        let column = match self.column.as_deref() {
            None | Some("*") => None,
            Some(column) => Some(scope.column(column)),
        };

        let condition = self
            .when
            .as_ref()
            .map(|when| compile_query(&scope, when))
            .filter(|fragment| !fragment.is_empty());

        match (self.function, condition, column) {
            (AggregateFn::Count, Some(cond), _) => (
                format!("COUNT(CASE WHEN {} THEN 1 END) AS {alias}", cond.sql),
                cond.params,
            ),
            (_, Some(cond), _) => {
                let mut params = cond.params;
                params.push(plain_param(&self.then));
                params.push(plain_param(&self.otherwise));
                (
                    format!("{function}(CASE WHEN {} THEN ? ELSE ? END) AS {alias}", cond.sql),
                    params,
                )
            }
            (AggregateFn::Count, None, None) => (format!("COUNT(*) AS {alias}"), Vec::new()),
            (_, None, None) => (format!("{function}(*) AS {alias}"), Vec::new()),
            (_, None, Some(column)) if self.coalesce => (
                format!("{function}(COALESCE({column}, 0)) AS {alias}"),
                Vec::new(),
            ),
            (_, None, Some(column)) => (format!("{function}({column}) AS {alias}"), Vec::new()),
        }
    }
}

/// One SELECT carrying every aggregate, filtered by the builder's condition, OR-groups and joins.
///
/// Aggregate parameters precede WHERE parameters. ORDER BY and LIMIT do not apply.
///
/// # Errors
///
/// Returns [`DbError::Execution`] for an empty aggregate list and
/// [`DbError::UnknownRelation`] for an unregistered relation.
pub fn calculate_statement(
    ctx: &TableContext,
    options: &SelectOptions,
    aggregates: &[Aggregate],
) -> Result<Statement, DbError> {
    if aggregates.is_empty() {
        return Err(DbError::Execution(
            "calculate requires at least one aggregate".to_string(),
        ));
    }
    let qualify = options.is_joined();
    let mut select = Vec::with_capacity(aggregates.len());
    let mut params = Vec::new();
    for aggregate in aggregates {
        let (sql, values) = aggregate.compile(ctx, qualify);
        select.push(sql);
        params.extend(values);
    }

    let mut joins = relation_joins(&options.relations, &ctx.relations, &ctx.table)?;
    joins.extend(options.joins.iter().cloned());

    let mut sql = format!(
        "SELECT {} FROM {}{}",
        select.join(", "),
        ctx.quoted_table(),
        join_clause(&joins)
    );
    let filter = compile_where(
        &ctx.scope(qualify),
        options.condition.as_ref(),
        &options.or_groups,
    );
    if !filter.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&filter.sql);
        params.extend(filter.params);
    }
    Ok(Statement::new(sql, params))
}

/// Alias to number for the first result row. Missing, NULL and non-numeric values read as 0.
#[must_use]
pub fn read_aggregates(aggregates: &[Aggregate], rows: &ResultSet) -> BTreeMap<String, f64> {
    let row = rows.results.first();
    aggregates
        .iter()
        .map(|aggregate| {
            let value = row
                .and_then(|row| row.get(&aggregate.alias))
                .and_then(crate::types::RowValues::as_float)
                .filter(|v| v.is_finite())
                .unwrap_or(0.0);
            (aggregate.alias.clone(), value)
        })
        .collect()
}

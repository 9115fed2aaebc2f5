use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use super::aggregate::{Aggregate, calculate_statement, read_aggregates};
use super::clause::{
    JoinClause, JoinType, OrderBy, join_clause, limit_clause, order_by_clause, select_columns,
};
use super::relation::{RelationType, relation_joins, resolve_relations};
use super::reshape::reshape_rows;
use super::{Statement, TableContext, quote_column};
use crate::condition::{CompareQuery, compile_where};
use crate::error::DbError;
use crate::executor::fetch;
use crate::pool::{ConnectionPool, DbConnection};

/// Everything a select accumulates before it is compiled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectOptions {
    pub condition: Option<CompareQuery>,
    pub or_groups: Vec<CompareQuery>,
    /// Explicit select list; empty selects every declared key.
    pub columns: Vec<String>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub joins: Vec<JoinClause>,
    /// Registered relation names requested with `with`.
    pub relations: Vec<String>,
}

impl SelectOptions {
    /// Bare field names need the table prefix once any other table takes part.
    #[must_use]
    pub fn is_joined(&self) -> bool {
        !self.joins.is_empty() || !self.relations.is_empty()
    }
}

/// Compile a SELECT: columns, relation joins then explicit joins, WHERE (omitted when empty),
/// ORDER BY, LIMIT/OFFSET.
///
/// # Errors
///
/// Returns [`DbError::UnknownRelation`] for a requested relation that is not registered.
pub fn select_statement(ctx: &TableContext, options: &SelectOptions) -> Result<Statement, DbError> {
    let requested = resolve_relations(&options.relations, &ctx.relations)?;
    let qualify = options.is_joined();

    let mut columns: Vec<String> = if !options.columns.is_empty() {
        vec![select_columns(&options.columns)]
    } else if ctx.transcoder.fields().is_empty() {
        vec![format!("{}.*", ctx.quoted_table())]
    } else {
        ctx.transcoder
            .fields()
            .iter()
            .map(|field| {
                if qualify {
                    quote_column(&format!("{}.{}", ctx.table, field.column))
                } else {
                    quote_column(&field.column)
                }
            })
            .collect()
    };
    // Keyed relations are found by alias anywhere; keyless ones own everything after their marker.
    for (name, relation) in requested.iter().filter(|(_, r)| r.keys.is_some()) {
        columns.extend(relation.select_columns(name));
    }
    for (name, relation) in requested.iter().filter(|(_, r)| r.keys.is_none()) {
        columns.extend(relation.select_columns(name));
    }

    let mut joins = relation_joins(&options.relations, &ctx.relations, &ctx.table)?;
    joins.extend(options.joins.iter().cloned());

    let mut sql = format!(
        "SELECT {} FROM {}{}",
        columns.join(", "),
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
    }
    sql.push_str(&order_by_clause(
        &options.order_by,
        qualify.then_some(ctx.table.as_str()),
        |column| ctx.transcoder.field(column).is_some(),
    ));
    sql.push_str(&limit_clause(options.limit, options.offset, ctx.dialect));
    Ok(Statement::new(sql, filter.params))
}

/// Fluent multi-row select. Modifiers consume and return the builder; execution borrows it, so a
/// builder can run any number of times with the same result.
pub struct SelectBuilder<T> {
    ctx: Arc<TableContext>,
    pool: ConnectionPool,
    options: SelectOptions,
    _entity: PhantomData<fn() -> T>,
}

impl<T> Clone for SelectBuilder<T> {
    fn clone(&self) -> Self {
        Self {
            ctx: Arc::clone(&self.ctx),
            pool: self.pool.clone(),
            options: self.options.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for SelectBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectBuilder")
            .field("table", &self.ctx.table)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<T> SelectBuilder<T> {
    pub(crate) fn new(
        ctx: Arc<TableContext>,
        pool: ConnectionPool,
        condition: Option<CompareQuery>,
    ) -> Self {
        Self {
            ctx,
            pool,
            options: SelectOptions {
                condition,
                ..SelectOptions::default()
            },
            _entity: PhantomData,
        }
    }

    #[must_use]
    pub fn order_by(mut self, items: impl IntoIterator<Item = OrderBy>) -> Self {
        self.options.order_by.extend(items);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.options.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.options.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn join(
        mut self,
        table: impl Into<String>,
        left_column: impl Into<String>,
        right_column: impl Into<String>,
        join_type: JoinType,
    ) -> Self {
        self.options
            .joins
            .push(JoinClause::new(table, left_column, right_column, join_type));
        self
    }

    #[must_use]
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Join and nest a relation registered on the repository.
    #[must_use]
    pub fn with(mut self, relation: impl Into<String>) -> Self {
        let relation = relation.into();
        if !self.options.relations.contains(&relation) {
            self.options.relations.push(relation);
        }
        self
    }

    /// Add one OR-group; the groups are OR-ed together and AND-ed with the main condition.
    #[must_use]
    pub fn or(mut self, group: CompareQuery) -> Self {
        self.options.or_groups.push(group);
        self
    }

    #[must_use]
    pub fn or_any(mut self, groups: impl IntoIterator<Item = CompareQuery>) -> Self {
        self.options.or_groups.extend(groups);
        self
    }

    #[must_use]
    pub fn options(&self) -> &SelectOptions {
        &self.options
    }

    /// The compiled statement, without running it.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::UnknownRelation`] for an unregistered relation.
    pub fn to_statement(&self) -> Result<Statement, DbError> {
        select_statement(&self.ctx, &self.options)
    }

    /// Run the select and return mapped objects, with relations nested.
    ///
    /// # Errors
    ///
    /// Returns an error if compilation, acquisition or the query fails.
    pub async fn execute_json(
        &self,
        conn: Option<&mut DbConnection>,
    ) -> Result<Vec<Map<String, Value>>, DbError> {
        run_select(&self.ctx, &self.pool, &self.options, conn).await
    }

    /// Run a single aggregate SELECT sharing this builder's condition, OR-groups and joins.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty aggregate list, or if acquisition or the query fails.
    pub async fn calculate(
        &self,
        aggregates: &[Aggregate],
        conn: Option<&mut DbConnection>,
    ) -> Result<BTreeMap<String, f64>, DbError> {
        let statement = calculate_statement(&self.ctx, &self.options, aggregates)?;
        statement.log(&self.ctx);
        let rows = fetch(&self.pool, conn, statement).await?;
        Ok(read_aggregates(aggregates, &rows))
    }

    /// [`calculate`](Self::calculate) deserialized into a caller struct keyed by alias.
    ///
    /// # Errors
    ///
    /// As [`calculate`](Self::calculate), plus [`DbError::Serialization`] when the values do not
    /// fit `C`.
    pub async fn calculate_into<C: DeserializeOwned>(
        &self,
        aggregates: &[Aggregate],
        conn: Option<&mut DbConnection>,
    ) -> Result<C, DbError> {
        let values = self.calculate(aggregates, conn).await?;
        let object: Map<String, Value> = values
            .into_iter()
            .map(|(alias, value)| (alias, crate::transcode::json_number(value)))
            .collect();
        Ok(serde_json::from_value(Value::Object(object))?)
    }
}

impl<T: DeserializeOwned> SelectBuilder<T> {
    /// Run the select and deserialize every mapped object into `T`.
    ///
    /// # Errors
    ///
    /// Returns an error if compilation, acquisition or the query fails, or a row does not
    /// deserialize into `T`.
    pub async fn execute(&self, conn: Option<&mut DbConnection>) -> Result<Vec<T>, DbError> {
        self.execute_json(conn)
            .await?
            .into_iter()
            .map(|object| serde_json::from_value(Value::Object(object)).map_err(DbError::from))
            .collect()
    }
}

/// Select for at most one object.
///
/// Emits `LIMIT 1` unless a has-many relation is requested; then the whole join is read so the
/// first parent carries all of its children.
pub struct SelectOneBuilder<T> {
    inner: SelectBuilder<T>,
    throw_error: bool,
}

impl<T> Clone for SelectOneBuilder<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            throw_error: self.throw_error,
        }
    }
}

impl<T> std::fmt::Debug for SelectOneBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectOneBuilder")
            .field("inner", &self.inner)
            .field("throw_error", &self.throw_error)
            .finish()
    }
}

impl<T> SelectOneBuilder<T> {
    pub(crate) fn new(ctx: Arc<TableContext>, pool: ConnectionPool, condition: CompareQuery) -> Self {
        Self {
            inner: SelectBuilder::new(ctx, pool, Some(condition)),
            throw_error: false,
        }
    }

    #[must_use]
    pub fn order_by(self, items: impl IntoIterator<Item = OrderBy>) -> Self {
        self.map(|inner| inner.order_by(items))
    }

    #[must_use]
    pub fn join(
        self,
        table: impl Into<String>,
        left_column: impl Into<String>,
        right_column: impl Into<String>,
        join_type: JoinType,
    ) -> Self {
        self.map(|inner| inner.join(table, left_column, right_column, join_type))
    }

    #[must_use]
    pub fn select<I, S>(self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.map(|inner| inner.select(columns))
    }

    #[must_use]
    pub fn with(self, relation: impl Into<String>) -> Self {
        self.map(|inner| inner.with(relation))
    }

    #[must_use]
    pub fn or(self, group: CompareQuery) -> Self {
        self.map(|inner| inner.or(group))
    }

    /// Fail with [`DbError::NotFound`] instead of returning `None` when nothing matches.
    #[must_use]
    pub fn throw_error(mut self, throw_error: bool) -> Self {
        self.throw_error = throw_error;
        self
    }

    fn map(mut self, f: impl FnOnce(SelectBuilder<T>) -> SelectBuilder<T>) -> Self {
        self.inner = f(self.inner);
        self
    }

    fn single_options(&self) -> Result<SelectOptions, DbError> {
        let ctx = &self.inner.ctx;
        let mut options = self.inner.options.clone();
        let has_many = resolve_relations(&options.relations, &ctx.relations)?
            .iter()
            .any(|(_, relation)| relation.relation_type == RelationType::HasMany);
        options.limit = (!has_many).then_some(1);
        Ok(options)
    }

    /// The compiled statement: `LIMIT 1`, or no limit at all when a has-many relation is joined.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::UnknownRelation`] for an unregistered relation.
    pub fn to_statement(&self) -> Result<Statement, DbError> {
        select_statement(&self.inner.ctx, &self.single_options()?)
    }

    /// First matching row. With a has-many relation the unlimited join is read and its first
    /// parent returned.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] when nothing matches and `throw_error` is set, or any
    /// compilation, acquisition or query error.
    pub async fn execute_json(
        &self,
        conn: Option<&mut DbConnection>,
    ) -> Result<Option<Map<String, Value>>, DbError> {
        let options = self.single_options()?;
        let first = run_select(&self.inner.ctx, &self.inner.pool, &options, conn)
            .await?
            .into_iter()
            .next();
        match first {
            None if self.throw_error => Err(DbError::NotFound {
                table: self.inner.ctx.table.clone(),
            }),
            other => Ok(other),
        }
    }
}

impl<T: DeserializeOwned> SelectOneBuilder<T> {
    /// # Errors
    ///
    /// As [`execute_json`](Self::execute_json), plus [`DbError::Serialization`] when the row does
    /// not deserialize into `T`.
    pub async fn execute(&self, conn: Option<&mut DbConnection>) -> Result<Option<T>, DbError> {
        self.execute_json(conn)
            .await?
            .map(|object| serde_json::from_value(Value::Object(object)).map_err(DbError::from))
            .transpose()
    }
}

async fn run_select(
    ctx: &TableContext,
    pool: &ConnectionPool,
    options: &SelectOptions,
    conn: Option<&mut DbConnection>,
) -> Result<Vec<Map<String, Value>>, DbError> {
    let requested = resolve_relations(&options.relations, &ctx.relations)?;
    let statement = select_statement(ctx, options)?;
    statement.log(ctx);
    let rows = fetch(pool, conn, statement).await?;
    Ok(reshape_rows(&rows, &ctx.transcoder, &requested))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::query_builder::{Relation, SortDirection};
    use crate::transcode::Transcoder;
    use crate::types::{Dialect, RowValues};

    fn ctx() -> TableContext {
        let keys: Vec<String> = ["id", "name", "teamId"].iter().map(ToString::to_string).collect();
        let mut relations = BTreeMap::new();
        relations.insert("posts".to_string(), Relation::has_many("posts", "id", "userId"));
        relations.insert(
            "team".to_string(),
            Relation::belongs_to("teams", "teamId", "id").keys(["teamName"]),
        );
        TableContext {
            table: "users".into(),
            transcoder: Transcoder::new(&keys, &[], &HashMap::new()),
            relations,
            dialect: Dialect::MySql,
            print_query: false,
        }
    }

    #[test]
    fn plain_select_lists_declared_keys() {
        let options = SelectOptions {
            condition: Some(CompareQuery::new().like("name", "test", crate::condition::LikePattern::Starts)),
            order_by: vec![OrderBy::new("id", SortDirection::Desc)],
            limit: Some(2),
            ..SelectOptions::default()
        };
        let stmt = select_statement(&ctx(), &options).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT `id`, `name`, `team_id` FROM `users` WHERE `name` LIKE ? ORDER BY `id` DESC LIMIT 2"
        );
        assert_eq!(stmt.params, vec![RowValues::Text("test%".into())]);
    }

    #[test]
    fn empty_condition_emits_no_where() {
        let options = SelectOptions {
            condition: Some(CompareQuery::new().eq("name", None::<&str>)),
            offset: Some(5),
            ..SelectOptions::default()
        };
        let stmt = select_statement(&ctx(), &options).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT `id`, `name`, `team_id` FROM `users` LIMIT 18446744073709551615 OFFSET 5"
        );
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn relations_qualify_and_join() {
        let options = SelectOptions {
            condition: Some(CompareQuery::new().eq("id", 1)),
            or_groups: vec![
                CompareQuery::new().eq("name", "a"),
                CompareQuery::new().eq("name", "b"),
            ],
            relations: vec!["posts".into(), "team".into()],
            ..SelectOptions::default()
        };
        let stmt = select_statement(&ctx(), &options).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT `users`.`id`, `users`.`name`, `users`.`team_id`, `teams`.`team_name` AS `teams__team_name`, NULL AS `__rel__posts`, `posts`.* FROM `users` LEFT JOIN `posts` ON `users`.`id` = `posts`.`user_id` INNER JOIN `teams` ON `users`.`team_id` = `teams`.`id` WHERE (`users`.`id` = ?) AND ((`users`.`name` = ?) OR (`users`.`name` = ?))"
        );
        assert_eq!(stmt.params.len(), 3);
    }

    #[test]
    fn explicit_columns_pass_through() {
        let options = SelectOptions {
            columns: vec!["id".into(), "COUNT(*) AS total".into()],
            ..SelectOptions::default()
        };
        let stmt = select_statement(&ctx(), &options).unwrap();
        assert_eq!(stmt.sql, "SELECT `id`, COUNT(*) AS total FROM `users`");
    }

    #[test]
    fn joined_order_by_keeps_aliases_bare() {
        let options = SelectOptions {
            columns: vec!["users.name".into(), "COUNT(*) AS total".into()],
            joins: vec![JoinClause::new("teams", "users.teamId", "teams.id", JoinType::Inner)],
            order_by: vec![OrderBy::desc("total"), OrderBy::asc("name")],
            ..SelectOptions::default()
        };
        let stmt = select_statement(&ctx(), &options).unwrap();
        assert_eq!(
            stmt.sql,
            "SELECT `users`.`name`, COUNT(*) AS total FROM `users` INNER JOIN `teams` ON `users`.`team_id` = `teams`.`id` ORDER BY `total` DESC, `users`.`name` ASC"
        );
    }

    #[test]
    fn unknown_relation_fails_compilation() {
        let options = SelectOptions {
            relations: vec!["comments".into()],
            ..SelectOptions::default()
        };
        assert!(matches!(
            select_statement(&ctx(), &options),
            Err(DbError::UnknownRelation(name)) if name == "comments"
        ));
    }
}

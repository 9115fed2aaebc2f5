use std::collections::BTreeMap;

use super::clause::{JoinClause, JoinType};
use super::{quote_column, quote_identifier};
use crate::error::DbError;
use crate::transcode::to_snake_case;

/// Prefix of the marker column emitted before a keyless relation's `table.*` columns.
pub(crate) const RELATION_MARKER: &str = "__rel__";
/// Separator between table and column in aliased relation columns (`posts__title`).
pub(crate) const RELATION_ALIAS_SEPARATOR: &str = "__";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationType {
    HasOne,
    HasMany,
    BelongsTo,
}

/// A named join target registered on a repository and requested per query with `.with(name)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub table: String,
    /// Field on the main table.
    pub local_key: String,
    /// Field on the related table.
    pub foreign_key: String,
    pub relation_type: RelationType,
    /// Defaults to LEFT for `HasMany`, INNER otherwise.
    pub join_type: Option<JoinType>,
    /// Related columns to select; `None` selects `table.*`.
    pub keys: Option<Vec<String>>,
}

impl Relation {
    #[must_use]
    pub fn new(
        relation_type: RelationType,
        table: impl Into<String>,
        local_key: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            local_key: local_key.into(),
            foreign_key: foreign_key.into(),
            relation_type,
            join_type: None,
            keys: None,
        }
    }

    #[must_use]
    pub fn has_one(
        table: impl Into<String>,
        local_key: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::new(RelationType::HasOne, table, local_key, foreign_key)
    }

    #[must_use]
    pub fn has_many(
        table: impl Into<String>,
        local_key: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::new(RelationType::HasMany, table, local_key, foreign_key)
    }

    #[must_use]
    pub fn belongs_to(
        table: impl Into<String>,
        local_key: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        Self::new(RelationType::BelongsTo, table, local_key, foreign_key)
    }

    #[must_use]
    pub fn join_type(mut self, join_type: JoinType) -> Self {
        self.join_type = Some(join_type);
        self
    }

    #[must_use]
    pub fn keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn effective_join_type(&self) -> JoinType {
        self.join_type.unwrap_or(match self.relation_type {
            RelationType::HasMany => JoinType::Left,
            RelationType::HasOne | RelationType::BelongsTo => JoinType::Inner,
        })
    }

    pub(crate) fn alias_prefix(&self) -> String {
        format!("{}{RELATION_ALIAS_SEPARATOR}", self.table)
    }

    /// Select-list entries for this relation.
    pub(crate) fn select_columns(&self, name: &str) -> Vec<String> {
        match &self.keys {
            Some(keys) => keys
                .iter()
                .map(|key| {
                    let column = to_snake_case(key);
                    format!(
                        "{} AS {}",
                        quote_column(&format!("{}.{column}", self.table)),
                        quote_identifier(&format!("{}{column}", self.alias_prefix()))
                    )
                })
                .collect(),
            None => vec![
                format!(
                    "NULL AS {}",
                    quote_identifier(&format!("{RELATION_MARKER}{name}"))
                ),
                format!("{}.*", quote_identifier(&self.table)),
            ],
        }
    }
}

/// Resolve requested relation names against the registry.
///
/// # Errors
///
/// Returns [`DbError::UnknownRelation`] for a name that is not registered.
pub fn resolve_relations<'a>(
    requested: &[String],
    relations: &'a BTreeMap<String, Relation>,
) -> Result<Vec<(&'a str, &'a Relation)>, DbError> {
    requested
        .iter()
        .map(|name| {
            relations
                .get_key_value(name)
                .map(|(key, relation)| (key.as_str(), relation))
                .ok_or_else(|| DbError::UnknownRelation(name.clone()))
        })
        .collect()
}

/// One join per requested relation, from `main.local_key` to `related.foreign_key`.
///
/// # Errors
///
/// Returns [`DbError::UnknownRelation`] for a name that is not registered.
pub fn relation_joins(
    requested: &[String],
    relations: &BTreeMap<String, Relation>,
    main_table: &str,
) -> Result<Vec<JoinClause>, DbError> {
    Ok(resolve_relations(requested, relations)?
        .into_iter()
        .map(|(_, relation)| JoinClause {
            table: relation.table.clone(),
            left_column: format!("{main_table}.{}", to_snake_case(&relation.local_key)),
            right_column: format!("{}.{}", relation.table, to_snake_case(&relation.foreign_key)),
            join_type: relation.effective_join_type(),
        })
        .collect())
}

use serde_json::Value;

use super::{CompareOperator, CompareQuery, CompareValue, LikePattern};
use crate::query_builder::{placeholders, quote_column};
use crate::transcode::{Transcoder, plain_param, scalar_text};
use crate::types::RowValues;

/// Names and encodings available while compiling a condition.
#[derive(Debug, Clone, Copy)]
pub struct CompileScope<'a> {
    pub transcoder: &'a Transcoder,
    /// Main table used to qualify bare field names when other tables are joined.
    pub qualifier: Option<&'a str>,
}

impl<'a> CompileScope<'a> {
    #[must_use]
    pub fn new(transcoder: &'a Transcoder) -> Self {
        Self {
            transcoder,
            qualifier: None,
        }
    }

    #[must_use]
    pub fn qualified(mut self, table: &'a str) -> Self {
        self.qualifier = Some(table);
        self
    }

    pub(crate) fn column(&self, field: &str) -> String {
        if field.contains('.') {
            return quote_column(field);
        }
        let column = self.transcoder.column_for(field);
        match self.qualifier {
            Some(table) => quote_column(&format!("{table}.{column}")),
            None => quote_column(&column),
        }
    }

    fn encode(&self, field: &str, value: &Value) -> RowValues {
        let name = field.rsplit('.').next().unwrap_or(field);
        self.transcoder.encode(name, value)
    }
}

/// SQL text plus its positional parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    pub sql: String,
    pub params: Vec<RowValues>,
}

impl Fragment {
    fn new(sql: impl Into<String>, params: Vec<RowValues>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}

/// Compile one condition object into AND-joined predicates.
///
/// Entries whose value is absent are dropped entirely. An empty fragment means "no condition".
#[must_use]
pub fn compile_query(scope: &CompileScope<'_>, query: &CompareQuery) -> Fragment {
    let mut parts = Vec::new();
    let mut params = Vec::new();
    for (field, value) in query.entries() {
        let Some(value) = value else { continue };
        if let Some(fragment) = compile_entry(scope, field, value) {
            parts.push(fragment.sql);
            params.extend(fragment.params);
        }
    }
    Fragment::new(parts.join(" AND "), params)
}

/// Main condition AND-ed with the OR-combination of `or_groups`.
///
/// Groups that compile to nothing are skipped. The result is empty when neither side has a
/// predicate, in which case no WHERE clause should be emitted.
#[must_use]
pub fn compile_where(
    scope: &CompileScope<'_>,
    main: Option<&CompareQuery>,
    or_groups: &[CompareQuery],
) -> Fragment {
    let main = main.map(|q| compile_query(scope, q)).unwrap_or_default();

    let mut or_parts = Vec::new();
    let mut or_params = Vec::new();
    for group in or_groups {
        let fragment = compile_query(scope, group);
        if !fragment.is_empty() {
            or_parts.push(format!("({})", fragment.sql));
            or_params.extend(fragment.params);
        }
    }

    match (main.is_empty(), or_parts.is_empty()) {
        (true, true) => Fragment::default(),
        (false, true) => main,
        (true, false) => Fragment::new(or_parts.join(" OR "), or_params),
        (false, false) => {
            let mut params = main.params;
            params.extend(or_params);
            Fragment::new(
                format!("({}) AND ({})", main.sql, or_parts.join(" OR ")),
                params,
            )
        }
    }
}

fn compile_entry(scope: &CompileScope<'_>, field: &str, value: &CompareValue) -> Option<Fragment> {
    let column = scope.column(field);
    match value {
        CompareValue::Literal(Value::Null) => Some(Fragment::new(format!("{column} IS NULL"), vec![])),
        CompareValue::Literal(Value::Array(values)) => Some(in_list(scope, field, &column, values)),
        CompareValue::Literal(literal) => Some(Fragment::new(
            format!("{column} = ?"),
            vec![scope.encode(field, literal)],
        )),
        CompareValue::Compare { value: None, .. }
        | CompareValue::In(None)
        | CompareValue::InJson(None)
        | CompareValue::Like { value: None, .. } => None,
        CompareValue::Compare {
            operator,
            value: Some(Value::Null),
        } => match operator {
            CompareOperator::Eq => Some(Fragment::new(format!("{column} IS NULL"), vec![])),
            CompareOperator::Ne => Some(Fragment::new(format!("{column} IS NOT NULL"), vec![])),
            _ => None,
        },
        CompareValue::Compare {
            operator,
            value: Some(operand),
        } => Some(Fragment::new(
            format!("{column} {} ?", operator.as_sql()),
            vec![scope.encode(field, operand)],
        )),
        CompareValue::In(Some(values)) => Some(in_list(scope, field, &column, values)),
        CompareValue::Like {
            value: Some(operand),
            pattern,
        } => like(&column, operand, *pattern),
        CompareValue::InJson(Some(values)) => Some(in_json(&column, values)),
    }
}

fn in_list(scope: &CompileScope<'_>, field: &str, column: &str, values: &[Value]) -> Fragment {
    if values.is_empty() {
        return Fragment::new("1 = 0", vec![]);
    }
    Fragment::new(
        format!("{column} IN ({})", placeholders(values.len())),
        values.iter().map(|v| scope.encode(field, v)).collect(),
    )
}

fn like(column: &str, operand: &Value, pattern: LikePattern) -> Option<Fragment> {
    match operand {
        Value::Null => None,
        Value::String(text) if text.is_empty() => None,
        Value::Object(paths) => {
            let mut parts = Vec::new();
            let mut params = Vec::new();
            for (path, value) in paths {
                let text = match value {
                    Value::Null => continue,
                    other => scalar_text(other),
                };
                if text.is_empty() {
                    continue;
                }
                parts.push(format!(
                    "CAST(JSON_UNQUOTE(JSON_EXTRACT({column}, ?)) AS CHAR) LIKE ?"
                ));
                params.push(RowValues::Text(format!("$.{path}")));
                params.push(RowValues::Text(pattern.wrap(&text)));
            }
            if parts.is_empty() {
                None
            } else {
                Some(Fragment::new(format!("({})", parts.join(" OR ")), params))
            }
        }
        scalar => Some(Fragment::new(
            format!("{column} LIKE ?"),
            vec![RowValues::Text(pattern.wrap(&scalar_text(scalar)))],
        )),
    }
}

fn in_json(column: &str, values: &[Value]) -> Fragment {
    if values.is_empty() {
        return Fragment::new("1 = 0", vec![]);
    }

    if values.iter().all(Value::is_array) {
        let mut parts = Vec::with_capacity(values.len());
        let mut params = Vec::new();
        for set in values.iter().filter_map(Value::as_array) {
            parts.push(format!(
                "JSON_CONTAINS({column}, JSON_ARRAY({}))",
                placeholders(set.len())
            ));
            params.extend(set.iter().map(plain_param));
        }
        let sql = if parts.len() == 1 {
            parts.remove(0)
        } else {
            format!("({})", parts.join(" OR "))
        };
        return Fragment::new(sql, params);
    }

    let flat: Vec<&Value> = values
        .iter()
        .flat_map(|v| match v {
            Value::Array(inner) => inner.iter().collect::<Vec<_>>(),
            other => vec![other],
        })
        .collect();
    Fragment::new(
        format!(
            "JSON_OVERLAPS({column}, JSON_ARRAY({}))",
            placeholders(flat.len())
        ),
        flat.into_iter().map(plain_param).collect(),
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;

    fn transcoder() -> Transcoder {
        let keys: Vec<String> = ["id", "name", "isValid", "tags", "meta", "createdAt", "count"]
            .iter()
            .map(ToString::to_string)
            .collect();
        Transcoder::new(&keys, &["id".to_string()], &HashMap::new())
    }

    fn compile(query: &CompareQuery) -> Fragment {
        let t = transcoder();
        compile_query(&CompileScope::new(&t), query)
    }

    #[test]
    fn equality_and_operators() {
        let f = compile(&CompareQuery::new().eq("name", "bob").gte("count", 3));
        assert_eq!(f.sql, "`name` = ? AND `count` >= ?");
        assert_eq!(f.params, vec![RowValues::Text("bob".into()), RowValues::Int(3)]);
    }

    #[test]
    fn absent_values_never_reach_sql() {
        let none: Option<&str> = None;
        let with_absent = CompareQuery::new()
            .eq("name", none)
            .gt("count", Option::<i64>::None)
            .like("meta", none, LikePattern::Contains)
            .is_in_opt("id", Option::<Vec<i64>>::None)
            .eq("isValid", true);
        let without = CompareQuery::new().eq("isValid", true);
        assert_eq!(compile(&with_absent), compile(&without));
        assert_eq!(compile(&without).sql, "`is_valid` = ?");
        assert_eq!(compile(&without).params, vec![RowValues::Int(1)]);
    }

    #[test]
    fn null_semantics() {
        assert_eq!(compile(&CompareQuery::new().is_null("name")).sql, "`name` IS NULL");
        assert_eq!(
            compile(&CompareQuery::new().eq("name", Value::Null)).sql,
            "`name` IS NULL"
        );
        assert_eq!(
            compile(&CompareQuery::new().ne("name", Value::Null)).sql,
            "`name` IS NOT NULL"
        );
        let dropped = compile(&CompareQuery::new().gt("count", Value::Null));
        assert!(dropped.is_empty());
        assert!(dropped.params.is_empty());
    }

    #[test]
    fn arrays_compile_to_in() {
        let f = compile(&CompareQuery::new().eq("id", json!([1, 2, 3])));
        assert_eq!(f.sql, "`id` IN (?, ?, ?)");
        assert_eq!(f.params.len(), 3);
        let f = compile(&CompareQuery::new().is_in("name", ["a", "b"]));
        assert_eq!(f.sql, "`name` IN (?, ?)");
        let f = compile(&CompareQuery::new().is_in("id", Vec::<i64>::new()));
        assert_eq!(f.sql, "1 = 0");
    }

    #[test]
    fn like_patterns() {
        for (pattern, expected) in [
            (LikePattern::Starts, "ab%"),
            (LikePattern::Ends, "%ab"),
            (LikePattern::Contains, "%ab%"),
            (LikePattern::Exact, "ab"),
        ] {
            let f = compile(&CompareQuery::new().like("name", "ab", pattern));
            assert_eq!(f.sql, "`name` LIKE ?");
            assert_eq!(f.params, vec![RowValues::Text(expected.into())]);
        }
        assert!(compile(&CompareQuery::new().like("name", "", LikePattern::Starts)).is_empty());
    }

    #[test]
    fn like_on_json_paths() {
        let f = compile(&CompareQuery::new().like(
            "meta",
            json!({"city": "Seo", "zip": "", "note": null}),
            LikePattern::Starts,
        ));
        assert_eq!(
            f.sql,
            "(CAST(JSON_UNQUOTE(JSON_EXTRACT(`meta`, ?)) AS CHAR) LIKE ?)"
        );
        assert_eq!(
            f.params,
            vec![RowValues::Text("$.city".into()), RowValues::Text("Seo%".into())]
        );
    }

    #[test]
    fn in_json_containment_and_overlap() {
        let f = compile(&CompareQuery::new().in_json("tags", [json!(["a", "b"]), json!(["c"])]));
        assert_eq!(
            f.sql,
            "(JSON_CONTAINS(`tags`, JSON_ARRAY(?, ?)) OR JSON_CONTAINS(`tags`, JSON_ARRAY(?)))"
        );
        assert_eq!(f.params.len(), 3);

        let f = compile(&CompareQuery::new().in_json("tags", [json!("a"), json!(["b", "c"])]));
        assert_eq!(f.sql, "JSON_OVERLAPS(`tags`, JSON_ARRAY(?, ?, ?))");
        assert_eq!(
            f.params,
            vec![
                RowValues::Text("a".into()),
                RowValues::Text("b".into()),
                RowValues::Text("c".into())
            ]
        );
    }

    #[test]
    fn or_groups_combine_with_main() {
        let t = transcoder();
        let scope = CompileScope::new(&t);
        let main = CompareQuery::new().eq("id", 1);
        let groups = [CompareQuery::new().eq("name", "b"), CompareQuery::new().eq("count", 3)];
        let f = compile_where(&scope, Some(&main), &groups);
        assert_eq!(f.sql, "(`id` = ?) AND ((`name` = ?) OR (`count` = ?))");
        assert_eq!(
            f.params,
            vec![RowValues::Int(1), RowValues::Text("b".into()), RowValues::Int(3)]
        );

        let only_or = compile_where(&scope, None, &groups);
        assert_eq!(only_or.sql, "(`name` = ?) OR (`count` = ?)");

        let empty_group = [CompareQuery::new().eq("name", Option::<String>::None)];
        let f = compile_where(&scope, Some(&main), &empty_group);
        assert_eq!(f.sql, "`id` = ?");
        assert!(compile_where(&scope, None, &[]).is_empty());
    }

    #[test]
    fn qualified_and_dotted_columns() {
        let t = transcoder();
        let scope = CompileScope::new(&t).qualified("users");
        let q = CompareQuery::new().eq("createdAt", "2024-01-01T00:00:00Z").eq("posts.authorId", 2);
        let f = compile_query(&scope, &q);
        assert_eq!(f.sql, "`users`.`created_at` = ? AND `posts`.`author_id` = ?");
        assert_eq!(f.params[0], RowValues::Text("2024-01-01 00:00:00".into()));
    }
}

// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Lowers a read query into a [`Select`]: the select list, joins, predicate,
//! grouping, ordering, paging, set operations, and the `json`-mode
//! aggregation wrap.

use indexmap::IndexSet;

use crate::query::join::{unique_alias, JoinKind, JoinTarget, Selectables};
use crate::query::query_data::{
    OrderItem, QueryData, ReturnMode, SelectExpr, SelectItem, WithItem,
};
use crate::query::shape::{ColumnShape, Shape};
use crate::query_error::QueryError;
use crate::sql::column::Column;
use crate::sql::column_type::ColumnType;
use crate::sql::cte::{CteExpression, WithQuery};
use crate::sql::database::Database;
use crate::sql::group_by::GroupBy;
use crate::sql::join::Join;
use crate::sql::limit::Limit;
use crate::sql::offset::Offset;
use crate::sql::order::{OrderBy, OrderByElement, Ordering};
use crate::sql::predicate::ConcretePredicate;
use crate::sql::select::{Select, SetOp};
use crate::sql::sql_operation::SQLOperation;
use crate::sql::table::Table;
use crate::sql::window::{Window, Windows};

use super::predicate_transformer;

/// The alias of the derived table inside an aggregation wrap.
const WRAP_ALIAS: &str = "t";

/// The complete statement for a read query, including any attached CTEs.
pub(crate) fn statement(data: &QueryData, database: &Database) -> Result<SQLOperation, QueryError> {
    if let Some(err) = &data.deferred_err {
        return Err(err.replay());
    }
    let select = mode_select(data, database)?;
    if data.with.is_empty() {
        Ok(SQLOperation::Select(select))
    } else {
        Ok(SQLOperation::WithQuery(WithQuery {
            expressions: cte_expressions(&data.with, database)?,
            select,
        }))
    }
}

pub(crate) fn cte_expressions(
    items: &[WithItem],
    database: &Database,
) -> Result<Vec<CteExpression>, QueryError> {
    items
        .iter()
        .map(|item| {
            Ok(CteExpression {
                name: item.name.clone(),
                operation: SQLOperation::Select(to_select(&item.query, database)?),
            })
        })
        .collect()
}

/// A query rendered as a nested select: an `IN` sub-query, a derived table, a
/// set-operation member, a CTE body.
pub(crate) fn to_select(data: &QueryData, database: &Database) -> Result<Select, QueryError> {
    nested_guard(data)?;
    mode_select(data, database)
}

fn nested_guard(data: &QueryData) -> Result<(), QueryError> {
    if let Some(err) = &data.deferred_err {
        return Err(err.replay());
    }
    if !data.with.is_empty() {
        return Err(QueryError::Validation(
            "with() applies to the outermost query; attach CTEs there".to_string(),
        ));
    }
    Ok(())
}

fn mode_select(data: &QueryData, database: &Database) -> Result<Select, QueryError> {
    match data.return_mode {
        ReturnMode::Json => json_select(data, database, None),
        _ => select_core(data, database, false),
    }
}

/// The `json`-mode wrap: the query becomes a derived table and the statement
/// aggregates it into one JSON array,
/// `SELECT COALESCE(json_agg(row_to_json("t".*)), '[]') FROM (...) AS "t"`.
///
/// Inside the derived table every output carries its record key as the column
/// alias (that is what `row_to_json` keys the object by), numerics are cast
/// to text, and byteas are base64-encoded, so the JSON built in SQL matches
/// the records the row parser builds.
pub(crate) fn json_select(
    data: &QueryData,
    database: &Database,
    column_alias: Option<&str>,
) -> Result<Select, QueryError> {
    let inner = select_core(data, database, true)?;
    let aggregate = Column::JsonAgg(Box::new(Column::row_to_json(WRAP_ALIAS)));
    Ok(wrap_derived(inner, aggregate, column_alias))
}

/// `SELECT <column> FROM (<inner>) AS "t"`.
fn wrap_derived(inner: Select, column: Column, column_alias: Option<&str>) -> Select {
    Select {
        columns: vec![(column, column_alias.map(str::to_string))],
        ..Select::new(
            Table::SubSelect {
                select: Box::new(inner),
                alias: WRAP_ALIAS.to_string(),
            },
            vec![],
        )
    }
}

/// Claims output keys in select-list order, suffixing duplicates the same way
/// [`QueryData::output_shape`] does, so the rendered columns and the parsed
/// shape always line up.
struct KeyClaims(IndexSet<String>);

impl KeyClaims {
    fn new() -> Self {
        KeyClaims(IndexSet::new())
    }

    fn claim(&mut self, requested: &str) -> String {
        let key = unique_alias(requested, |candidate| self.0.contains(candidate));
        self.0.insert(key.clone());
        key
    }
}

fn select_core(
    data: &QueryData,
    database: &Database,
    normalize_json: bool,
) -> Result<Select, QueryError> {
    let selectables = Selectables::new(data, database);

    let table = match &data.from_cte {
        Some(name) => Table::Named(name.clone()),
        None => Table::physical(data.table_id, data.alias.clone()),
    };

    let columns = select_columns(data, database, &selectables, normalize_json)?;
    let joins = join_clauses(data, database, &selectables)?;
    let predicate = predicate_transformer::where_predicate(data, database)?;

    let group_by = if data.group.is_empty() {
        None
    } else {
        let mut group_columns = Vec::with_capacity(data.group.len());
        for name in &data.group {
            group_columns.push(selectables.resolve(name)?.column);
        }
        Some(GroupBy(group_columns))
    };

    let having = if data.having.is_empty() {
        None
    } else {
        Some(predicate_transformer::having_conjunction(
            &data.having,
            &selectables,
            database,
        )?)
    };

    let windows = window_clause(data, &selectables)?;
    let order_by = order_clause(data, &selectables)?;

    let set_ops = data
        .unions
        .iter()
        .map(|item| {
            Ok(SetOp {
                kind: item.kind,
                select: Box::new(to_select(&item.query, database)?),
            })
        })
        .collect::<Result<Vec<_>, QueryError>>()?;

    // Single-record and single-value reads fetch no more than one row; `find`
    // leaves the limit alone so an unexpectedly wide match stays detectable.
    let limit = match data.return_mode {
        ReturnMode::One { .. } | ReturnMode::Value { .. } if !data.require_one_row => Some(1),
        _ => data.limit,
    };

    Ok(Select {
        table: Some(table),
        columns,
        joins,
        predicate,
        group_by,
        having,
        windows,
        set_ops,
        order_by,
        limit: limit.map(Limit),
        offset: data.offset.map(Offset),
        lock: data.lock,
    })
}

fn select_columns(
    data: &QueryData,
    database: &Database,
    selectables: &Selectables<'_>,
    normalize_json: bool,
) -> Result<Vec<(Column, Option<String>)>, QueryError> {
    let mut columns: Vec<(Column, Option<String>)> = Vec::new();
    let mut keys = KeyClaims::new();

    if data.select.is_empty() {
        match (data.from_cte.as_deref(), selectables.cte_shape()) {
            (Some(name), Some(shape)) => {
                spread_cte(name, shape, database, normalize_json, &mut columns, &mut keys);
            }
            _ => spread_base(
                data,
                database,
                selectables,
                normalize_json,
                &mut columns,
                &mut keys,
            ),
        }
        return Ok(columns);
    }

    for item in &data.select {
        match item {
            SelectItem::Ref(name) => {
                if let Some(alias) = name.strip_suffix(".*") {
                    star_item(
                        data,
                        database,
                        selectables,
                        alias,
                        normalize_json,
                        &mut columns,
                        &mut keys,
                    )?;
                    continue;
                }
                let resolved = selectables.resolve(name)?;
                let key = keys.claim(&resolved.key);
                let column = normalized(resolved.column, &resolved.typ, normalize_json);
                let alias = output_alias(&column, &key, database);
                columns.push((column, alias));
            }
            SelectItem::Expr { alias, expr } => {
                let key = keys.claim(alias);
                let column = expr_column(expr, data, selectables)?;
                columns.push((column, Some(key)));
            }
            SelectItem::Subquery { alias, query } => {
                let key = keys.claim(alias);
                columns.push((subquery_column(query, database)?, Some(key)));
            }
        }
    }
    Ok(columns)
}

/// One `alias.*` select item: the base table's (or source CTE's) own star
/// spreads flat, a joined alias becomes a single nested field.
fn star_item(
    data: &QueryData,
    database: &Database,
    selectables: &Selectables<'_>,
    alias: &str,
    normalize_json: bool,
    columns: &mut Vec<(Column, Option<String>)>,
    keys: &mut KeyClaims,
) -> Result<(), QueryError> {
    match selectables.cte_shape() {
        Some(shape) if data.from_cte.as_deref() == Some(alias) => {
            spread_cte(alias, shape, database, normalize_json, columns, keys);
            return Ok(());
        }
        None if alias == selectables.qualifier() => {
            spread_base(data, database, selectables, normalize_json, columns, keys);
            return Ok(());
        }
        _ => {}
    }

    match selectables.joined_shape(alias) {
        Some(joined) => {
            let key = keys.claim(alias);
            if joined.json_aggregate(alias).is_some() {
                // A lateral in json mode already aggregated itself into one
                // column named after the alias
                let column = Column::Reference {
                    table_alias: Some(alias.to_string()),
                    name: alias.to_string(),
                };
                let out_alias = output_alias(&column, &key, database);
                columns.push((column, out_alias));
            } else {
                columns.push((Column::row_to_json(alias), Some(key)));
            }
            Ok(())
        }
        None => Err(QueryError::UnknownSelectable(format!("{alias}.*"))),
    }
}

/// Spread every column of the base table, one output field per column. The
/// enumerated form is only needed when fields must be individually aliased or
/// cast; a bare `"table".*` covers the rest.
fn spread_base(
    data: &QueryData,
    database: &Database,
    selectables: &Selectables<'_>,
    enumerate: bool,
    columns: &mut Vec<(Column, Option<String>)>,
    keys: &mut KeyClaims,
) {
    if !enumerate {
        for column_id in database.get_column_ids(data.table_id) {
            keys.claim(column_id.get_column(database).record_key());
        }
        columns.push((Column::Star(Some(selectables.qualifier().to_string())), None));
        return;
    }
    for column_id in database.get_column_ids(data.table_id) {
        let physical = column_id.get_column(database);
        let key = keys.claim(physical.record_key());
        let typ = Some(physical.typ.clone());
        let column = normalized(
            Column::Physical {
                column_id,
                table_alias: data.alias.clone(),
            },
            &typ,
            true,
        );
        let alias = output_alias(&column, &key, database);
        columns.push((column, alias));
    }
}

/// Spread every output of the CTE the query selects from.
fn spread_cte(
    cte_name: &str,
    shape: &Shape,
    database: &Database,
    normalize_json: bool,
    columns: &mut Vec<(Column, Option<String>)>,
    keys: &mut KeyClaims,
) {
    if !normalize_json {
        for key in shape.keys() {
            keys.claim(key);
        }
        columns.push((Column::Star(Some(cte_name.to_string())), None));
        return;
    }
    for (key, entry) in shape.iter() {
        let key = keys.claim(key);
        let column = Column::Reference {
            table_alias: Some(cte_name.to_string()),
            name: key.clone(),
        };
        let typ = match entry {
            ColumnShape::Scalar(typ) => Some(typ.clone()),
            _ => None,
        };
        let column = normalized(column, &typ, true);
        let alias = output_alias(&column, &key, database);
        columns.push((column, alias));
    }
}

fn expr_column(
    expr: &SelectExpr,
    data: &QueryData,
    selectables: &Selectables<'_>,
) -> Result<Column, QueryError> {
    match expr {
        SelectExpr::Aggregate { function, column } => {
            let args = match column {
                Some(name) => vec![selectables.resolve(name)?.column],
                None => vec![Column::Star(None)],
            };
            Ok(Column::function(function.clone(), args))
        }
        SelectExpr::Raw(fragment) => Ok(Column::Raw(fragment.clone())),
        SelectExpr::Headline { column } => {
            let config = data.search.as_ref().ok_or_else(|| {
                QueryError::Validation("headline requires an earlier search call".to_string())
            })?;
            let document = selectables.resolve(column)?.column;
            Ok(predicate_transformer::search_headline(config, document))
        }
    }
}

/// A sub-query as one output field. Only a single-value sub-query is legal as
/// a bare scalar sub-select; everything else folds its rows into JSON so the
/// sub-select stays one column wide.
fn subquery_column(query: &QueryData, database: &Database) -> Result<Column, QueryError> {
    nested_guard(query)?;
    let select = match query.return_mode {
        ReturnMode::Value { .. } => select_core(query, database, false)?,
        ReturnMode::One { .. } => {
            let inner = select_core(query, database, true)?;
            wrap_derived(inner, Column::row_to_json(WRAP_ALIAS), None)
        }
        ReturnMode::Pluck => {
            let key = query
                .output_shape(database)
                .keys()
                .next()
                .cloned()
                .ok_or_else(|| {
                    QueryError::Validation("a pluck sub-query needs a selected column".to_string())
                })?;
            let inner = select_core(query, database, false)?;
            let aggregate = Column::JsonAgg(Box::new(Column::Reference {
                table_alias: Some(WRAP_ALIAS.to_string()),
                name: key,
            }));
            wrap_derived(inner, aggregate, None)
        }
        _ => json_select(query, database, None)?,
    };
    Ok(Column::SubSelect(Box::new(select)))
}

/// Casts applied inside a JSON wrap so SQL-built JSON matches parsed records:
/// numerics as text (exact), byteas as base64.
fn normalized(column: Column, typ: &Option<ColumnType>, normalize_json: bool) -> Column {
    if !normalize_json {
        return column;
    }
    match typ {
        Some(ColumnType::Numeric { .. }) => Column::Cast {
            column: Box::new(column),
            typ: "text".to_string(),
        },
        Some(ColumnType::Blob) => Column::BlobBase64(Box::new(column)),
        _ => column,
    }
}

/// Alias a column whenever its natural SQL name differs from its record key,
/// so `row_to_json`, CTE reuse, and set-operation output names all carry the
/// key.
fn output_alias(column: &Column, key: &str, database: &Database) -> Option<String> {
    let natural = match column {
        Column::Physical { column_id, .. } => Some(column_id.get_column(database).name.as_str()),
        Column::Reference { name, .. } => Some(name.as_str()),
        _ => None,
    };
    if natural == Some(key) {
        None
    } else {
        Some(key.to_string())
    }
}

fn join_clauses(
    data: &QueryData,
    database: &Database,
    selectables: &Selectables<'_>,
) -> Result<Vec<Join>, QueryError> {
    let mut joins = Vec::with_capacity(data.joins.len());
    for item in &data.joins {
        let table = match &item.target {
            JoinTarget::Table(table_id) => Table::physical(*table_id, Some(item.alias.clone())),
            JoinTarget::Cte(name) => Table::Named(name.clone()),
            JoinTarget::Subquery(sub) => {
                let select = if item.kind == JoinKind::Lateral && is_json_lateral(data, &item.alias)
                {
                    nested_guard(sub)?;
                    json_select(sub, database, Some(&item.alias))?
                } else {
                    to_select(sub, database)?
                };
                Table::SubSelect {
                    select: Box::new(select),
                    alias: item.alias.clone(),
                }
            }
        };

        let mut predicate = ConcretePredicate::True;
        for cond in &item.on {
            let left = selectables.resolve(&cond.left)?.column;
            let right = selectables.resolve(&cond.right)?.column;
            predicate = ConcretePredicate::and(
                predicate,
                predicate_transformer::sql_comparison(left, &cond.op, right)?,
            );
        }

        joins.push(Join::new(item.kind, table, predicate));
    }
    Ok(joins)
}

fn is_json_lateral(data: &QueryData, alias: &str) -> bool {
    data.joined
        .get(alias)
        .map(|joined| joined.json_aggregate(alias).is_some())
        .unwrap_or(false)
}

fn window_clause(
    data: &QueryData,
    selectables: &Selectables<'_>,
) -> Result<Option<Windows>, QueryError> {
    if data.windows.is_empty() {
        return Ok(None);
    }
    let mut definitions = Vec::with_capacity(data.windows.len());
    for item in &data.windows {
        let mut partition_by = Vec::with_capacity(item.partition_by.len());
        for name in &item.partition_by {
            partition_by.push(selectables.resolve(name)?.column);
        }
        let order_by = if item.order.is_empty() {
            None
        } else {
            let mut elements = Vec::with_capacity(item.order.len());
            for (name, ordering) in &item.order {
                elements.push(OrderByElement::new(
                    selectables.resolve(name)?.column,
                    *ordering,
                    None,
                ));
            }
            Some(OrderBy(elements))
        };
        definitions.push(Window {
            name: item.name.clone(),
            partition_by,
            order_by,
        });
    }
    Ok(Some(Windows(definitions)))
}

fn order_clause(
    data: &QueryData,
    selectables: &Selectables<'_>,
) -> Result<Option<OrderBy>, QueryError> {
    if data.order.is_empty() {
        return Ok(None);
    }
    let mut elements = Vec::with_capacity(data.order.len());
    for item in &data.order {
        match item {
            OrderItem::Column {
                column,
                ordering,
                nulls,
            } => {
                // A set-operation ORDER BY applies to the combined output, so
                // it must reference bare output names
                let rendered = if data.unions.is_empty() {
                    selectables.resolve(column)?.column
                } else {
                    let name = match selectables.resolve(column) {
                        Ok(resolved) => resolved.key,
                        Err(_) => column
                            .rsplit('.')
                            .next()
                            .unwrap_or(column.as_str())
                            .to_string(),
                    };
                    Column::Reference {
                        table_alias: None,
                        name,
                    }
                };
                elements.push(OrderByElement::new(rendered, *ordering, *nulls));
            }
            OrderItem::Raw(fragment) => {
                elements.push(OrderByElement::raw(Column::Raw(fragment.clone())));
            }
            OrderItem::SearchRank => {
                let config = data.search.as_ref().ok_or_else(|| {
                    QueryError::Validation(
                        "ordering by search rank requires an earlier search call".to_string(),
                    )
                })?;
                let rank = predicate_transformer::search_rank(config, selectables)?;
                elements.push(OrderByElement::new(rank, Ordering::Desc, None));
            }
        }
    }
    Ok(Some(OrderBy(elements)))
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::query::DEFAULT_SCOPE;
    use crate::sql::pg_value::PgValue;
    use crate::transform::test_util::TestSetup;

    #[test]
    fn bare_query_selects_the_table_star() {
        TestSetup::with_setup(|s| {
            let compiled = s.users().to_sql().unwrap();
            assert_binding!(
                (compiled.sql, compiled.params),
                r#"SELECT "users".* FROM "users""#
            );
        });
    }

    #[test]
    fn empty_select_resets_and_empty_or_lists_are_no_ops() {
        TestSetup::with_setup(|s| {
            let compiled = s
                .users()
                .select(&["id"])
                .select(&[])
                .or_where(vec![])
                .to_sql()
                .unwrap();
            assert_binding!(
                (compiled.sql, compiled.params),
                r#"SELECT "users".* FROM "users""#
            );
        });
    }

    #[test]
    fn filtered_select_with_ordering_and_paging() {
        TestSetup::with_setup(|s| {
            let compiled = s
                .users()
                .select(&["id", "name"])
                .filter(json!({"age": {"gte": 21}}))
                .order("name")
                .limit(10)
                .offset(20)
                .to_sql()
                .unwrap();

            assert_binding!(
                (compiled.sql, compiled.params),
                r#"SELECT "users"."id", "users"."name" FROM "users" WHERE "users"."age" >= $1 ORDER BY "users"."name" ASC LIMIT $2 OFFSET $3"#,
                PgValue::Int4(21),
                PgValue::Int8(10),
                PgValue::Int8(20)
            );
        });
    }

    #[test]
    fn renamed_columns_select_and_filter_under_their_record_key() {
        TestSetup::with_setup(|s| {
            let compiled = s
                .posts()
                .select(&["id", "authorId"])
                .filter(json!({"authorId": 12}))
                .to_sql()
                .unwrap();

            assert_binding!(
                (compiled.sql, compiled.params),
                r#"SELECT "posts"."id", "posts"."author_id" AS "authorId" FROM "posts" WHERE "posts"."author_id" = $1"#,
                PgValue::Int8(12)
            );
        });
    }

    #[test]
    fn successive_filters_merge_into_one_conjunction() {
        TestSetup::with_setup(|s| {
            let chained = s
                .users()
                .filter(json!({"age": {"gte": 21}}))
                .filter(json!({"name": {"startsWith": "A"}}))
                .to_sql()
                .unwrap();
            let merged = s
                .users()
                .filter(json!({"age": {"gte": 21}, "name": {"startsWith": "A"}}))
                .to_sql()
                .unwrap();
            assert_eq!(chained.sql, merged.sql);
        });
    }

    #[test]
    fn or_groups_disjoin_against_the_conjoined_filters() {
        TestSetup::with_setup(|s| {
            let compiled = s
                .users()
                .filter(json!({"age": {"gte": 18}}))
                .or_where(vec![
                    json!({"status": "active"}),
                    json!({"email": {"endsWith": "@example.com"}}),
                ])
                .to_sql()
                .unwrap();

            assert_binding!(
                (compiled.sql, compiled.params),
                r#"SELECT "users".* FROM "users" WHERE ("users"."age" >= $1 AND ("users"."status" = $2::user_status OR "users"."email" LIKE '%' || $3))"#,
                PgValue::Int4(18),
                PgValue::Text("active".to_string()),
                PgValue::Text("@example.com".to_string())
            );
        });
    }

    #[test]
    fn in_lists_bind_one_parameter_per_value() {
        TestSetup::with_setup(|s| {
            let compiled = s.users().where_in(&["id"], json!([1, 2])).to_sql().unwrap();
            assert_binding!(
                (compiled.sql, compiled.params),
                r#"SELECT "users".* FROM "users" WHERE "users"."id" IN ($1, $2)"#,
                PgValue::Int8(1),
                PgValue::Int8(2)
            );
        });
    }

    #[test]
    fn empty_in_lists_match_nothing() {
        TestSetup::with_setup(|s| {
            let compiled = s.users().where_in(&["id"], json!([])).to_sql().unwrap();
            assert_binding!(
                (compiled.sql, compiled.params),
                r#"SELECT "users".* FROM "users" WHERE FALSE"#
            );
        });
    }

    #[test]
    fn tuple_in_renders_row_value_syntax() {
        TestSetup::with_setup(|s| {
            let compiled = s
                .users()
                .where_in(&["name", "age"], json!([["Ada", 36], ["Sam", 41]]))
                .to_sql()
                .unwrap();

            assert_binding!(
                (compiled.sql, compiled.params),
                r#"SELECT "users".* FROM "users" WHERE ("users"."name", "users"."age") IN (($1, $2), ($3, $4))"#,
                PgValue::Text("Ada".to_string()),
                PgValue::Int4(36),
                PgValue::Text("Sam".to_string()),
                PgValue::Int4(41)
            );
        });
    }

    #[test]
    fn unknown_bare_names_stay_lenient_and_render_qualified() {
        TestSetup::with_setup(|s| {
            let compiled = s
                .users()
                .filter(json!({"favorite_color": "teal"}))
                .to_sql()
                .unwrap();

            assert_binding!(
                (compiled.sql, compiled.params),
                r#"SELECT "users".* FROM "users" WHERE "users"."favorite_color" = $1"#,
                PgValue::Text("teal".to_string())
            );
        });
    }

    #[test]
    fn unknown_qualified_selectables_surface_at_compile() {
        TestSetup::with_setup(|s| {
            let err = s
                .users()
                .select(&["posts.title"])
                .filter(json!({"age": {"gte": 21}}))
                .to_sql()
                .unwrap_err();
            assert!(matches!(err, QueryError::UnknownSelectable(name) if name == "posts.title"));
        });
    }

    #[test]
    fn operators_are_checked_against_the_column_kind() {
        TestSetup::with_setup(|s| {
            let err = s
                .users()
                .filter(json!({"age": {"startsWith": "2"}}))
                .to_sql()
                .unwrap_err();
            assert!(matches!(
                err,
                QueryError::InvalidOperator { column, operator, .. }
                    if column == "age" && operator == "startsWith"
            ));
        });
    }

    #[test]
    fn inner_join_on_a_column_pair() {
        TestSetup::with_setup(|s| {
            let compiled = s
                .users()
                .join("profiles", "profiles.user_id", "=", "users.id")
                .select(&["name", "profiles.city"])
                .to_sql()
                .unwrap();

            assert_binding!(
                (compiled.sql, compiled.params),
                r#"SELECT "users"."name", "profiles"."city" FROM "users" JOIN "profiles" ON "profiles"."user_id" = "users"."id""#
            );
        });
    }

    #[test]
    fn self_joins_suffix_the_joined_alias() {
        TestSetup::with_setup(|s| {
            let compiled = s
                .users()
                .join("users", "users2.id", "=", "users.id")
                .select(&["id", "users2.name"])
                .to_sql()
                .unwrap();

            assert_binding!(
                (compiled.sql, compiled.params),
                r#"SELECT "users"."id", "users2"."name" FROM "users" JOIN "users" AS "users2" ON "users2"."id" = "users"."id""#
            );
        });
    }

    #[test]
    fn lateral_json_join_aggregates_the_related_rows() {
        TestSetup::with_setup(|s| {
            let compiled = s
                .users()
                .join_lateral(s.posts(), "posts", |posts| {
                    posts
                        .select(&["id", "title"])
                        .where_on("posts.authorId", "=", "users.id")
                        .with_return_mode(ReturnMode::Json)
                })
                .select(&["name", "posts.*"])
                .to_sql()
                .unwrap();

            assert_binding!(
                (compiled.sql, compiled.params),
                r#"SELECT "users"."name", "posts"."posts" FROM "users" LEFT JOIN LATERAL (SELECT COALESCE(json_agg(row_to_json("t".*)), '[]') AS "posts" FROM (SELECT "posts"."id", "posts"."title" FROM "posts" WHERE "posts"."author_id" = "users"."id") AS "t") AS "posts" ON TRUE"#
            );
        });
    }

    #[test]
    fn attached_ctes_render_in_front_and_join_by_output_key() {
        TestSetup::with_setup(|s| {
            let recent = s
                .posts()
                .select(&["id", "title", "authorId"])
                .filter(json!({"published": true}));
            let compiled = s
                .users()
                .with("recent", recent)
                .join_cte("recent", "recent.authorId", "=", "users.id")
                .select(&["name", "recent.title"])
                .to_sql()
                .unwrap();

            assert_binding!(
                (compiled.sql, compiled.params),
                r#"WITH "recent" AS (SELECT "posts"."id", "posts"."title", "posts"."author_id" AS "authorId" FROM "posts" WHERE "posts"."published" = $1) SELECT "users"."name", "recent"."title" FROM "users" JOIN "recent" ON "recent"."authorId" = "users"."id""#,
                PgValue::Bool(true)
            );
        });
    }

    #[test]
    fn from_with_reads_the_cte_instead_of_the_table() {
        TestSetup::with_setup(|s| {
            let adults = s
                .users()
                .select(&["id", "name"])
                .filter(json!({"age": {"gte": 18}}));
            let compiled = s
                .users()
                .with("adults", adults)
                .from_with("adults")
                .order("name")
                .to_sql()
                .unwrap();

            assert_binding!(
                (compiled.sql, compiled.params),
                r#"WITH "adults" AS (SELECT "users"."id", "users"."name" FROM "users" WHERE "users"."age" >= $1) SELECT "adults".* FROM "adults" ORDER BY "adults"."name" ASC"#,
                PgValue::Int4(18)
            );
        });
    }

    #[test]
    fn cte_joins_refuse_colliding_names() {
        TestSetup::with_setup(|s| {
            let helper = s.profiles().select(&["id", "user_id"]);
            let err = s
                .users()
                .with("profiles", helper)
                .join("profiles", "profiles.user_id", "=", "users.id")
                .join_cte("profiles", "profiles.id", "=", "users.id")
                .to_sql()
                .unwrap_err();
            assert!(matches!(err, QueryError::Validation(msg) if msg.contains("collides")));
        });
    }

    #[test]
    fn nested_queries_cannot_carry_their_own_ctes() {
        TestSetup::with_setup(|s| {
            let helper = s.users().select(&["id"]);
            let inner = s.users().with("helper", helper).select(&["id"]);
            let err = s.users().union_all(inner).to_sql().unwrap_err();
            assert!(matches!(err, QueryError::Validation(msg) if msg.contains("outermost")));
        });
    }

    #[test]
    fn set_operations_order_by_bare_output_names() {
        TestSetup::with_setup(|s| {
            let active = s
                .users()
                .select(&["id", "name"])
                .filter(json!({"status": "active"}));
            let dormant = s
                .users()
                .select(&["id", "name"])
                .filter(json!({"status": "dormant"}));
            let compiled = active
                .union_all(dormant)
                .order("name")
                .limit(10)
                .to_sql()
                .unwrap();

            assert_binding!(
                (compiled.sql, compiled.params),
                r#"(SELECT "users"."id", "users"."name" FROM "users" WHERE "users"."status" = $1::user_status) UNION ALL (SELECT "users"."id", "users"."name" FROM "users" WHERE "users"."status" = $2::user_status) ORDER BY "name" ASC LIMIT $3"#,
                PgValue::Text("active".to_string()),
                PgValue::Text("dormant".to_string()),
                PgValue::Int8(10)
            );
        });
    }

    #[test]
    fn json_mode_wraps_and_normalizes_sql_built_values() {
        TestSetup::with_setup(|s| {
            let compiled = s
                .users()
                .select(&["id", "salary", "avatar"])
                .with_return_mode(ReturnMode::Json)
                .to_sql()
                .unwrap();

            assert_binding!(
                (compiled.sql, compiled.params),
                r#"SELECT COALESCE(json_agg(row_to_json("t".*)), '[]') FROM (SELECT "users"."id", "users"."salary"::text AS "salary", translate(encode("users"."avatar", 'base64'), E'\n', '') AS "avatar" FROM "users") AS "t""#
            );
        });
    }

    #[test]
    fn single_record_reads_fetch_at_most_one_row() {
        TestSetup::with_setup(|s| {
            let compiled = s
                .users()
                .filter(json!({"email": "ada@example.com"}))
                .with_return_mode(ReturnMode::One { required: true })
                .to_sql()
                .unwrap();

            assert_binding!(
                (compiled.sql, compiled.params),
                r#"SELECT "users".* FROM "users" WHERE "users"."email" = $1 LIMIT $2"#,
                PgValue::Text("ada@example.com".to_string()),
                PgValue::Int8(1)
            );
        });
    }

    #[test]
    fn find_keeps_the_limit_off_to_detect_wide_matches() {
        TestSetup::with_setup(|s| {
            let compiled = s
                .users()
                .find(json!(7))
                .with_return_mode(ReturnMode::One { required: true })
                .to_sql()
                .unwrap();

            assert_binding!(
                (compiled.sql, compiled.params),
                r#"SELECT "users".* FROM "users" WHERE "users"."id" = $1"#,
                PgValue::Int8(7)
            );
        });
    }

    #[test]
    fn subquery_select_items_shape_by_their_return_mode() {
        TestSetup::with_setup(|s| {
            let city = s
                .profiles()
                .select(&["city"])
                .where_raw(r#""profiles"."user_id" = "users"."id""#, vec![])
                .with_return_mode(ReturnMode::Value { required: false });
            let compiled = s
                .users()
                .select(&["id"])
                .select_subquery("city", city)
                .to_sql()
                .unwrap();

            assert_binding!(
                (compiled.sql, compiled.params),
                r#"SELECT "users"."id", (SELECT "profiles"."city" FROM "profiles" WHERE "profiles"."user_id" = "users"."id" LIMIT $1) AS "city" FROM "users""#,
                PgValue::Int8(1)
            );

            let titles = s
                .posts()
                .select(&["title"])
                .where_raw(r#""posts"."author_id" = "users"."id""#, vec![])
                .with_return_mode(ReturnMode::Pluck);
            let compiled = s
                .users()
                .select(&["id"])
                .select_subquery("titles", titles)
                .to_sql()
                .unwrap();

            assert_binding!(
                (compiled.sql, compiled.params),
                r#"SELECT "users"."id", (SELECT COALESCE(json_agg("t"."title"), '[]') FROM (SELECT "posts"."title" FROM "posts" WHERE "posts"."author_id" = "users"."id") AS "t") AS "titles" FROM "users""#
            );
        });
    }

    #[test]
    fn correlated_exists_probes_with_a_constant_select() {
        TestSetup::with_setup(|s| {
            let compiled = s
                .users()
                .where_exists("posts", "posts.authorId", "=", "users.id")
                .to_sql()
                .unwrap();
            assert_binding!(
                (compiled.sql, compiled.params),
                r#"SELECT "users".* FROM "users" WHERE EXISTS (SELECT 1 FROM "posts" WHERE "posts"."author_id" = "users"."id")"#
            );

            let compiled = s
                .users()
                .where_not_exists("posts", "posts.authorId", "=", "users.id")
                .to_sql()
                .unwrap();
            assert_binding!(
                (compiled.sql, compiled.params),
                r#"SELECT "users".* FROM "users" WHERE NOT EXISTS (SELECT 1 FROM "posts" WHERE "posts"."author_id" = "users"."id")"#
            );
        });
    }

    #[test]
    fn grouping_with_aggregates_and_having_over_output_aliases() {
        TestSetup::with_setup(|s| {
            let compiled = s
                .posts()
                .select(&["authorId"])
                .aggregate("post_count", "count", None)
                .group(&["authorId"])
                .having(json!({"post_count": {"gt": 5}}))
                .to_sql()
                .unwrap();

            assert_binding!(
                (compiled.sql, compiled.params),
                r#"SELECT "posts"."author_id" AS "authorId", count(*) AS "post_count" FROM "posts" GROUP BY "posts"."author_id" HAVING "post_count" > $1"#,
                PgValue::Int8(5)
            );
        });
    }

    #[test]
    fn named_windows_render_a_window_clause() {
        TestSetup::with_setup(|s| {
            let compiled = s
                .posts()
                .select(&["id", "title"])
                .select_raw("title_rank", r#"rank() OVER "w""#, vec![])
                .window("w", &["authorId"], &[("views", Ordering::Desc)])
                .to_sql()
                .unwrap();

            assert_binding!(
                (compiled.sql, compiled.params),
                r#"SELECT "posts"."id", "posts"."title", rank() OVER "w" AS "title_rank" FROM "posts" WINDOW "w" AS (PARTITION BY "posts"."author_id" ORDER BY "posts"."views" DESC)"#
            );
        });
    }

    #[test]
    fn lock_clauses_append_after_paging() {
        TestSetup::with_setup(|s| {
            let compiled = s
                .users()
                .filter(json!({"id": 1}))
                .for_update()
                .skip_locked()
                .to_sql()
                .unwrap();
            assert_binding!(
                (compiled.sql, compiled.params),
                r#"SELECT "users".* FROM "users" WHERE "users"."id" = $1 FOR UPDATE SKIP LOCKED"#,
                PgValue::Int8(1)
            );

            let compiled = s.users().nowait().to_sql().unwrap();
            assert_binding!(
                (compiled.sql, compiled.params),
                r#"SELECT "users".* FROM "users" FOR UPDATE NOWAIT"#
            );
        });
    }

    #[test]
    fn search_binds_the_language_and_query_as_parameters() {
        TestSetup::with_setup(|s| {
            let compiled = s
                .posts()
                .select(&["id"])
                .headline("snippet", "body")
                .search(&["title", "body"], "rust async")
                .order_by_search_rank()
                .to_sql()
                .unwrap();

            assert_binding!(
                (compiled.sql, compiled.params),
                r#"SELECT "posts"."id", ts_headline($1::regconfig, "posts"."body", websearch_to_tsquery($2::regconfig, $3)) AS "snippet" FROM "posts" WHERE to_tsvector($4::regconfig, concat_ws(' ', "posts"."title", "posts"."body")) @@ websearch_to_tsquery($5::regconfig, $6) ORDER BY ts_rank(to_tsvector($7::regconfig, concat_ws(' ', "posts"."title", "posts"."body")), websearch_to_tsquery($8::regconfig, $9)) DESC"#,
                PgValue::Text("english".to_string()),
                PgValue::Text("english".to_string()),
                PgValue::Text("rust async".to_string()),
                PgValue::Text("english".to_string()),
                PgValue::Text("english".to_string()),
                PgValue::Text("rust async".to_string()),
                PgValue::Text("english".to_string()),
                PgValue::Text("english".to_string()),
                PgValue::Text("rust async".to_string())
            );
        });
    }

    #[test]
    fn search_language_changes_only_the_bound_parameters() {
        TestSetup::with_setup(|s| {
            let english = s.posts().search(&["body"], "tokio").to_sql().unwrap();
            let german = s
                .posts()
                .search(&["body"], "tokio")
                .search_language("german")
                .to_sql()
                .unwrap();
            assert_eq!(english.sql, german.sql);

            assert_binding!(
                (german.sql, german.params),
                r#"SELECT "posts".* FROM "posts" WHERE to_tsvector($1::regconfig, "posts"."body") @@ websearch_to_tsquery($2::regconfig, $3)"#,
                PgValue::Text("german".to_string()),
                PgValue::Text("german".to_string()),
                PgValue::Text("tokio".to_string())
            );
        });
    }

    #[test]
    fn scopes_conjoin_until_unscoped() {
        TestSetup::with_setup(|mut s| {
            s.db.define_scope("posts", "published", json!({"published": true}))
                .unwrap();

            let scoped = s.posts().scope("published").to_sql().unwrap();
            assert_binding!(
                (scoped.sql, scoped.params),
                r#"SELECT "posts".* FROM "posts" WHERE "posts"."published" = $1"#,
                PgValue::Bool(true)
            );

            let unscoped = s
                .posts()
                .scope("published")
                .unscope("published")
                .to_sql()
                .unwrap();
            assert_binding!(
                (unscoped.sql, unscoped.params),
                r#"SELECT "posts".* FROM "posts""#
            );

            let err = s.posts().scope("missing").to_sql().unwrap_err();
            assert!(matches!(err, QueryError::UnknownScope(name) if name == "missing"));
        });
    }

    #[test]
    fn the_default_scope_applies_at_query_creation() {
        TestSetup::with_setup(|mut s| {
            s.db.define_scope("posts", DEFAULT_SCOPE, json!({"published": true}))
                .unwrap();

            let compiled = s.posts().to_sql().unwrap();
            assert_binding!(
                (compiled.sql, compiled.params),
                r#"SELECT "posts".* FROM "posts" WHERE "posts"."published" = $1"#,
                PgValue::Bool(true)
            );

            let detached = s.posts().unscope(DEFAULT_SCOPE).to_sql().unwrap();
            assert_binding!(
                (detached.sql, detached.params),
                r#"SELECT "posts".* FROM "posts""#
            );
        });
    }

    #[test]
    fn compiling_twice_yields_identical_statements() {
        TestSetup::with_setup(|s| {
            let query = s
                .users()
                .filter(json!({"age": {"gte": 21}}))
                .order("name")
                .limit(5);
            let first = query.to_sql().unwrap();
            let second = query.to_sql().unwrap();
            assert_eq!(first.sql, second.sql);
            assert_eq!(first.params.len(), second.params.len());
        });
    }

    #[test]
    fn cloned_chains_do_not_share_clauses() {
        TestSetup::with_setup(|s| {
            let base = s.users().filter(json!({"age": {"gte": 21}}));
            let narrowed = base.clone().filter(json!({"status": "active"}));

            let base_sql = base.to_sql().unwrap().sql;
            let narrowed_sql = narrowed.to_sql().unwrap().sql;
            assert!(!base_sql.contains("status"));
            assert!(narrowed_sql.contains("status"));
        });
    }
}

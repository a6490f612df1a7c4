// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Lowers a mutation into its statement: a plain `INSERT`/`UPDATE`/`DELETE`
//! where nothing else is asked of it, a CTE-wrapped one when the query also
//! selects, and the multi-CTE race-free forms for `upsert` and `or_create`.

use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::query::query_data::{Mutation, QueryData, ReturnMode};
use crate::query_error::QueryError;
use crate::sql::column::Column;
use crate::sql::column_type::encode::to_param;
use crate::sql::cte::{CteExpression, WithQuery};
use crate::sql::database::Database;
use crate::sql::delete::Delete;
use crate::sql::insert::{Insert, InsertSource};
use crate::sql::physical_column::{ColumnId, PhysicalColumn};
use crate::sql::predicate::ConcretePredicate;
use crate::sql::raw_fragment::RawFragment;
use crate::sql::select::{Select, SetOp, SetOpKind};
use crate::sql::sql_operation::SQLOperation;
use crate::sql::table::Table;
use crate::sql::update::Update;

use super::{predicate_transformer, select_transformer};

/// The CTE holding an upsert's updated rows.
const UPDATED_CTE: &str = "updated";
/// The CTE holding the inserted rows of an upsert or or_create.
const INSERTED_CTE: &str = "inserted";
/// The CTE holding an or_create's matched rows.
const FOUND_CTE: &str = "found";

/// The complete statement for a mutating query.
pub(crate) fn statement(
    data: &QueryData,
    mutation: &Mutation,
    database: &Database,
) -> Result<SQLOperation, QueryError> {
    match mutation {
        Mutation::Insert { records } => {
            let returning = returning_columns(data, mutation);
            let insert = insert_rows(data, records, database, returning)?;
            assemble(data, database, SQLOperation::Insert(insert))
        }
        Mutation::Update { set, raw_sets } => {
            let returning = returning_columns(data, mutation);
            let predicate = predicate_transformer::where_predicate(data, database)?;
            let update = update_operation(data, set, raw_sets, database, predicate, returning)?;
            assemble(data, database, SQLOperation::Update(update))
        }
        Mutation::Delete => {
            let returning = returning_columns(data, mutation);
            let delete = Delete {
                table_id: data.table_id,
                predicate: predicate_transformer::where_predicate(data, database)?,
                returning,
            };
            assemble(data, database, SQLOperation::Delete(delete))
        }
        Mutation::Upsert { update, create } => upsert_statement(data, update, create, database),
        Mutation::OrCreate { create } => or_create_statement(data, create, database),
    }
}

/// Whether the statement must return the affected rows: any row-shaped return
/// mode, or an after-hook that wants to see them.
fn wants_rows(data: &QueryData, mutation: &Mutation) -> bool {
    if !matches!(data.return_mode, ReturnMode::RowCount | ReturnMode::Void) {
        return true;
    }
    let (_, after, commit) = mutation.lifecycle();
    data.hooks.has_any(&[after, commit])
}

fn returning_columns(data: &QueryData, mutation: &Mutation) -> Vec<Column> {
    if wants_rows(data, mutation) {
        vec![Column::Star(None)]
    } else {
        vec![]
    }
}

/// Whether the mutation's rows feed an outer select: an explicit selection, a
/// JSON return, or ordering/paging of the returned rows.
fn wants_outer_select(data: &QueryData) -> bool {
    !data.select.is_empty()
        || data.return_mode == ReturnMode::Json
        || !data.order.is_empty()
        || data.limit.is_some()
        || data.offset.is_some()
}

/// Attached CTEs force the wrap too: the statement has to end in a select for
/// them to hang off of.
fn needs_selection(data: &QueryData) -> bool {
    wants_outer_select(data) || !data.with.is_empty()
}

/// Plain statement, or `WITH <user-ctes>, "<table>" AS (<dml> RETURNING *)
/// <select>` when the rows feed an outer select. The result CTE deliberately
/// carries the table's own name: the outer select keeps rendering
/// catalog-qualified columns, and SQL scoping resolves them to the CTE.
fn assemble(
    data: &QueryData,
    database: &Database,
    operation: SQLOperation,
) -> Result<SQLOperation, QueryError> {
    if !needs_selection(data) {
        return Ok(operation);
    }

    let table_name = database.get_table(data.table_id).name.clone();
    let operation = force_returning(operation);

    let mut expressions = user_ctes(data, database, &[&table_name])?;
    expressions.push(CteExpression {
        name: table_name,
        operation,
    });

    let outer = selection_data(data);
    Ok(SQLOperation::WithQuery(WithQuery {
        expressions,
        select: select_transformer::to_select(&outer, database)?,
    }))
}

/// The outer select needs rows even when the caller asked for a count.
fn force_returning(operation: SQLOperation) -> SQLOperation {
    match operation {
        SQLOperation::Insert(mut insert) => {
            insert.returning = vec![Column::Star(None)];
            SQLOperation::Insert(insert)
        }
        SQLOperation::Update(mut update) => {
            update.returning = vec![Column::Star(None)];
            SQLOperation::Update(update)
        }
        SQLOperation::Delete(mut delete) => {
            delete.returning = vec![Column::Star(None)];
            SQLOperation::Delete(delete)
        }
        other => other,
    }
}

/// The user's `with` CTEs, rejecting names the mutation's own CTEs take.
fn user_ctes(
    data: &QueryData,
    database: &Database,
    reserved: &[&str],
) -> Result<Vec<CteExpression>, QueryError> {
    for item in &data.with {
        if reserved.contains(&item.name.as_str()) {
            return Err(QueryError::Validation(format!(
                "CTE name '{}' collides with the mutation's own result set",
                item.name
            )));
        }
    }
    select_transformer::cte_expressions(&data.with, database)
}

/// The query re-targeted at the mutation's result CTE: the write, its filters,
/// and its CTEs are gone; the selection, joins, ordering, and paging remain.
fn selection_data(data: &QueryData) -> QueryData {
    let mut outer = data.clone();
    outer.mutation = None;
    outer.and = vec![];
    outer.or = vec![];
    outer.active_scopes = Default::default();
    outer.search = None;
    outer.with = vec![];
    outer.lock = None;
    outer
}

fn insert_rows(
    data: &QueryData,
    records: &[JsonMap<String, JsonValue>],
    database: &Database,
    returning: Vec<Column>,
) -> Result<Insert, QueryError> {
    if records.is_empty() {
        return Err(QueryError::Validation(
            "insert needs at least one record".to_string(),
        ));
    }

    // Columns in catalog order: every column any record supplies. A record
    // missing one of them takes DEFAULT in that position.
    let mut columns: Vec<ColumnId> = vec![];
    for column_id in database.get_column_ids(data.table_id) {
        let physical = column_id.get_column(database);
        if records
            .iter()
            .any(|record| record_value(record, physical).is_some())
        {
            columns.push(column_id);
        }
    }

    if columns.is_empty() && records.len() > 1 {
        return Err(QueryError::Validation(
            "a multi-record insert needs at least one column".to_string(),
        ));
    }

    let rows = records
        .iter()
        .map(|record| {
            columns
                .iter()
                .map(|column_id| {
                    let physical = column_id.get_column(database);
                    match record_value(record, physical) {
                        Some(value) => Ok(Column::Param(to_param(&physical.typ, value)?)),
                        None => Ok(Column::Default),
                    }
                })
                .collect::<Result<Vec<_>, QueryError>>()
        })
        .collect::<Result<Vec<_>, QueryError>>()?;

    Ok(Insert {
        table_id: data.table_id,
        columns,
        source: InsertSource::Rows(rows),
        returning,
    })
}

fn update_operation(
    data: &QueryData,
    set: &JsonMap<String, JsonValue>,
    raw_sets: &[RawFragment],
    database: &Database,
    predicate: ConcretePredicate,
    returning: Vec<Column>,
) -> Result<Update, QueryError> {
    let mut column_values = vec![];
    for column_id in database.get_column_ids(data.table_id) {
        let physical = column_id.get_column(database);
        if let Some(value) = record_value(set, physical) {
            column_values.push((column_id, Column::Param(to_param(&physical.typ, value)?)));
        }
    }

    let raw_sets: Vec<Column> = raw_sets
        .iter()
        .map(|fragment| Column::Raw(fragment.clone()))
        .collect();

    if column_values.is_empty() && raw_sets.is_empty() {
        return Err(QueryError::Validation(
            "update needs at least one column to set".to_string(),
        ));
    }

    Ok(Update {
        table_id: data.table_id,
        predicate,
        column_values,
        raw_sets,
        returning,
    })
}

/// A record value under the column's record key, falling back to the column
/// name, mirroring how filter columns resolve.
fn record_value<'v>(
    record: &'v JsonMap<String, JsonValue>,
    physical: &PhysicalColumn,
) -> Option<&'v JsonValue> {
    record
        .get(physical.record_key())
        .or_else(|| record.get(&physical.name))
}

/// `INSERT INTO <table> (<columns>) SELECT $1, ... WHERE NOT EXISTS
/// (SELECT * FROM "<guard>") RETURNING *` - the insert arm of an upsert or
/// or_create, which only fires when the guard CTE came up empty.
fn guarded_insert(
    data: &QueryData,
    create: &JsonMap<String, JsonValue>,
    database: &Database,
    guard_cte: &str,
) -> Result<Insert, QueryError> {
    let mut columns = vec![];
    let mut values = vec![];
    for column_id in database.get_column_ids(data.table_id) {
        let physical = column_id.get_column(database);
        if let Some(value) = record_value(create, physical) {
            columns.push(column_id);
            values.push((Column::Param(to_param(&physical.typ, value)?), None));
        }
    }
    if columns.is_empty() {
        return Err(QueryError::Validation(
            "the create record needs at least one column".to_string(),
        ));
    }

    let guard = Select::new(
        Table::Named(guard_cte.to_string()),
        vec![(Column::Star(None), None)],
    );
    let source = Select {
        table: None,
        predicate: ConcretePredicate::Not(Box::new(ConcretePredicate::Exists(Box::new(guard)))),
        ..Select::new(Table::Named(guard_cte.to_string()), values)
    };

    Ok(Insert {
        table_id: data.table_id,
        columns,
        source: InsertSource::Query(Box::new(source)),
        returning: vec![Column::Star(None)],
    })
}

/// `(SELECT * FROM "<first>") UNION ALL (SELECT * FROM "<second>")` - exactly
/// one arm of an upsert or or_create produced rows.
fn union_of(first: &str, second: &str) -> Select {
    Select {
        set_ops: vec![SetOp {
            kind: SetOpKind::UnionAll,
            select: Box::new(Select::new(
                Table::Named(second.to_string()),
                vec![(Column::Star(None), None)],
            )),
        }],
        ..Select::new(
            Table::Named(first.to_string()),
            vec![(Column::Star(None), None)],
        )
    }
}

/// Close over the two-arm CTEs: plain union when nothing else is selected,
/// otherwise one more CTE under the table's name feeding the outer select.
fn two_arm_statement(
    data: &QueryData,
    database: &Database,
    mut expressions: Vec<CteExpression>,
    union: Select,
) -> Result<SQLOperation, QueryError> {
    if wants_outer_select(data) {
        let table_name = database.get_table(data.table_id).name.clone();
        expressions.push(CteExpression {
            name: table_name,
            operation: SQLOperation::Select(union),
        });
        let outer = selection_data(data);
        return Ok(SQLOperation::WithQuery(WithQuery {
            expressions,
            select: select_transformer::to_select(&outer, database)?,
        }));
    }
    Ok(SQLOperation::WithQuery(WithQuery {
        expressions,
        select: union,
    }))
}

/// ```sql
/// WITH "updated" AS (UPDATE ... RETURNING *),
///      "inserted" AS (INSERT ... SELECT ... WHERE NOT EXISTS
///                     (SELECT * FROM "updated") RETURNING *)
/// (SELECT * FROM "updated") UNION ALL (SELECT * FROM "inserted")
/// ```
///
/// One statement, so no transaction is needed against the lost-update race:
/// the insert arm sees the update arm's row count within the same snapshot.
fn upsert_statement(
    data: &QueryData,
    update: &JsonMap<String, JsonValue>,
    create: &JsonMap<String, JsonValue>,
    database: &Database,
) -> Result<SQLOperation, QueryError> {
    let table_name = database.get_table(data.table_id).name.clone();
    let mut expressions = user_ctes(data, database, &[UPDATED_CTE, INSERTED_CTE, &table_name])?;

    let predicate = predicate_transformer::where_predicate(data, database)?;
    let update_op = update_operation(
        data,
        update,
        &[],
        database,
        predicate,
        vec![Column::Star(None)],
    )?;
    expressions.push(CteExpression {
        name: UPDATED_CTE.to_string(),
        operation: SQLOperation::Update(update_op),
    });

    let insert_op = guarded_insert(data, create, database, UPDATED_CTE)?;
    expressions.push(CteExpression {
        name: INSERTED_CTE.to_string(),
        operation: SQLOperation::Insert(insert_op),
    });

    two_arm_statement(data, database, expressions, union_of(UPDATED_CTE, INSERTED_CTE))
}

/// ```sql
/// WITH "found" AS (SELECT "users".* FROM "users" WHERE ...),
///      "inserted" AS (INSERT ... SELECT ... WHERE NOT EXISTS
///                     (SELECT * FROM "found") RETURNING *)
/// (SELECT * FROM "found") UNION ALL (SELECT * FROM "inserted")
/// ```
fn or_create_statement(
    data: &QueryData,
    create: &JsonMap<String, JsonValue>,
    database: &Database,
) -> Result<SQLOperation, QueryError> {
    let table_name = database.get_table(data.table_id).name.clone();
    let mut expressions = user_ctes(data, database, &[FOUND_CTE, INSERTED_CTE, &table_name])?;

    // The found arm is the query's own read, stripped down to the full row
    let mut found = data.clone();
    found.mutation = None;
    found.select = vec![];
    found.return_mode = ReturnMode::All;
    found.require_one_row = false;
    found.with = vec![];
    found.order = vec![];
    found.limit = None;
    found.offset = None;
    found.lock = None;
    expressions.push(CteExpression {
        name: FOUND_CTE.to_string(),
        operation: select_transformer::statement(&found, database)?,
    });

    let insert_op = guarded_insert(data, create, database, FOUND_CTE)?;
    expressions.push(CteExpression {
        name: INSERTED_CTE.to_string(),
        operation: SQLOperation::Insert(insert_op),
    });

    two_arm_statement(data, database, expressions, union_of(FOUND_CTE, INSERTED_CTE))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::json;

    use crate::execute::HookContext;
    use crate::query::hooks::Hook;
    use crate::sql::pg_value::PgValue;
    use crate::sql::SQLParamContainer;
    use crate::transform::test_util::TestSetup;

    struct NoopHook;

    #[async_trait]
    impl Hook for NoopHook {
        async fn run(
            &self,
            _records: &[JsonValue],
            _ctx: &HookContext<'_>,
        ) -> Result<(), QueryError> {
            Ok(())
        }
    }

    #[test]
    fn create_returns_the_inserted_row() {
        TestSetup::with_setup(|s| {
            let compiled = s
                .users()
                .create(json!({"name": "Ada", "age": 36}))
                .to_sql()
                .unwrap();

            assert_binding!(
                (compiled.sql, compiled.params),
                r#"INSERT INTO "users" ("name", "age") VALUES ($1, $2) RETURNING *"#,
                PgValue::Text("Ada".to_string()),
                PgValue::Int4(36)
            );
        });
    }

    #[test]
    fn create_many_fills_missing_columns_with_defaults() {
        TestSetup::with_setup(|s| {
            let compiled = s
                .users()
                .create_many(vec![
                    json!({"name": "Ada", "age": 36}),
                    json!({"name": "Sam"}),
                ])
                .to_sql()
                .unwrap();

            assert_binding!(
                (compiled.sql, compiled.params),
                r#"INSERT INTO "users" ("name", "age") VALUES ($1, $2), ($3, DEFAULT) RETURNING *"#,
                PgValue::Text("Ada".to_string()),
                PgValue::Int4(36),
                PgValue::Text("Sam".to_string())
            );
        });
    }

    #[test]
    fn empty_single_record_inserts_defaults() {
        TestSetup::with_setup(|s| {
            let compiled = s.users().create(json!({})).to_sql().unwrap();
            assert_binding!(
                (compiled.sql, compiled.params),
                r#"INSERT INTO "users" DEFAULT VALUES RETURNING *"#
            );

            let err = s
                .users()
                .create_many(vec![json!({}), json!({})])
                .to_sql()
                .unwrap_err();
            assert!(matches!(err, QueryError::Validation(msg) if msg.contains("at least one column")));
        });
    }

    #[test]
    fn update_sets_in_catalog_order_and_counts_by_default() {
        TestSetup::with_setup(|s| {
            let compiled = s
                .posts()
                .filter(json!({"id": 5}))
                .update(json!({"title": "Updated"}))
                .set_sql(
                    r#""views" = "views" + $1"#,
                    vec![SQLParamContainer::from(1_i64)],
                )
                .to_sql()
                .unwrap();

            assert_binding!(
                (compiled.sql, compiled.params),
                r#"UPDATE "posts" SET "title" = $1, "views" = "views" + $2 WHERE "posts"."id" = $3"#,
                PgValue::Text("Updated".to_string()),
                PgValue::Int8(1),
                PgValue::Int8(5)
            );
        });
    }

    #[test]
    fn empty_updates_are_rejected() {
        TestSetup::with_setup(|s| {
            let err = s
                .posts()
                .filter(json!({"id": 1}))
                .update(json!({}))
                .to_sql()
                .unwrap_err();
            assert!(matches!(err, QueryError::Validation(msg) if msg.contains("at least one column")));
        });
    }

    #[test]
    fn find_merges_into_the_mutation_filter() {
        TestSetup::with_setup(|s| {
            let compiled = s
                .users()
                .find(json!(7))
                .update(json!({"name": "Grace"}))
                .to_sql()
                .unwrap();

            assert_binding!(
                (compiled.sql, compiled.params),
                r#"UPDATE "users" SET "name" = $1 WHERE "users"."id" = $2"#,
                PgValue::Text("Grace".to_string()),
                PgValue::Int8(7)
            );
        });
    }

    #[test]
    fn deletes_render_bare_without_hooks_or_row_modes() {
        TestSetup::with_setup(|s| {
            let compiled = s
                .posts()
                .filter(json!({"published": false}))
                .delete()
                .to_sql()
                .unwrap();
            assert_binding!(
                (compiled.sql, compiled.params),
                r#"DELETE FROM "posts" WHERE "posts"."published" = $1"#,
                PgValue::Bool(false)
            );

            let compiled = s.posts().all_records().delete().to_sql().unwrap();
            assert_binding!((compiled.sql, compiled.params), r#"DELETE FROM "posts""#);
        });
    }

    #[test]
    fn after_hooks_force_returning_for_counting_mutations() {
        TestSetup::with_setup(|s| {
            let plain = s
                .posts()
                .filter(json!({"id": 5}))
                .update(json!({"views": 0}))
                .to_sql()
                .unwrap();
            assert!(!plain.sql.contains("RETURNING"));

            let hooked = s
                .posts()
                .filter(json!({"id": 5}))
                .update(json!({"views": 0}))
                .after_update(Arc::new(NoopHook))
                .to_sql()
                .unwrap();
            assert!(hooked.sql.ends_with("RETURNING *"));

            let compiled = s
                .posts()
                .filter(json!({"id": 5}))
                .delete()
                .after_delete(Arc::new(NoopHook))
                .to_sql()
                .unwrap();
            assert_binding!(
                (compiled.sql, compiled.params),
                r#"DELETE FROM "posts" WHERE "posts"."id" = $1 RETURNING *"#,
                PgValue::Int8(5)
            );
        });
    }

    #[test]
    fn unfiltered_guarded_mutations_are_refused() {
        TestSetup::with_setup(|s| {
            let err = s.posts().update(json!({"views": 0})).to_sql().unwrap_err();
            assert!(matches!(err, QueryError::UnguardedMutation("update")));

            let err = s.posts().delete().to_sql().unwrap_err();
            assert!(matches!(err, QueryError::UnguardedMutation("delete")));

            let err = s
                .users()
                .upsert(json!({"name": "Ada"}), json!({"name": "Ada"}))
                .to_sql()
                .unwrap_err();
            assert!(matches!(err, QueryError::UnguardedMutation("upsert")));

            let compiled = s
                .posts()
                .all_records()
                .update(json!({"views": 0}))
                .to_sql()
                .unwrap();
            assert_binding!(
                (compiled.sql, compiled.params),
                r#"UPDATE "posts" SET "views" = $1"#,
                PgValue::Int4(0)
            );
        });
    }

    #[test]
    fn record_keys_must_name_table_columns() {
        TestSetup::with_setup(|s| {
            let err = s
                .users()
                .create(json!({"nickname": "Ada"}))
                .to_sql()
                .unwrap_err();
            assert!(matches!(err, QueryError::UnknownSelectable(key) if key == "nickname"));
        });
    }

    #[test]
    fn a_second_mutation_is_refused() {
        TestSetup::with_setup(|s| {
            let err = s
                .posts()
                .filter(json!({"id": 1}))
                .delete()
                .update(json!({"views": 0}))
                .to_sql()
                .unwrap_err();
            assert!(matches!(err, QueryError::Validation(msg) if msg.contains("already attached")));

            let err = s
                .posts()
                .filter(json!({"id": 1}))
                .delete()
                .set_sql(r#""views" = 0"#, vec![])
                .to_sql()
                .unwrap_err();
            assert!(matches!(err, QueryError::Validation(msg) if msg.contains("requires an update")));
        });
    }

    #[test]
    fn selecting_after_a_mutation_wraps_it_in_a_cte() {
        TestSetup::with_setup(|s| {
            let compiled = s
                .posts()
                .filter(json!({"id": 5}))
                .update(json!({"views": 0}))
                .select(&["id", "title"])
                .to_sql()
                .unwrap();

            assert_binding!(
                (compiled.sql, compiled.params),
                r#"WITH "posts" AS (UPDATE "posts" SET "views" = $1 WHERE "posts"."id" = $2 RETURNING *) SELECT "posts"."id", "posts"."title" FROM "posts""#,
                PgValue::Int4(0),
                PgValue::Int8(5)
            );
        });
    }

    #[test]
    fn create_with_selection_applies_the_single_row_limit() {
        TestSetup::with_setup(|s| {
            let compiled = s
                .users()
                .create(json!({"name": "Ada"}))
                .select(&["id"])
                .to_sql()
                .unwrap();

            assert_binding!(
                (compiled.sql, compiled.params),
                r#"WITH "users" AS (INSERT INTO "users" ("name") VALUES ($1) RETURNING *) SELECT "users"."id" FROM "users" LIMIT $2"#,
                PgValue::Text("Ada".to_string()),
                PgValue::Int8(1)
            );
        });
    }

    #[test]
    fn json_mode_mutations_wrap_the_returned_rows() {
        TestSetup::with_setup(|s| {
            let compiled = s
                .posts()
                .create(json!({"title": "Hello", "authorId": 1}))
                .with_return_mode(ReturnMode::Json)
                .to_sql()
                .unwrap();

            assert_binding!(
                (compiled.sql, compiled.params),
                r#"WITH "posts" AS (INSERT INTO "posts" ("author_id", "title") VALUES ($1, $2) RETURNING *) SELECT COALESCE(json_agg(row_to_json("t".*)), '[]') FROM (SELECT "posts"."id", "posts"."author_id" AS "authorId", "posts"."title", "posts"."body", "posts"."views", "posts"."published" FROM "posts") AS "t""#,
                PgValue::Int8(1),
                PgValue::Text("Hello".to_string())
            );
        });
    }

    #[test]
    fn upsert_compiles_to_one_race_free_statement() {
        TestSetup::with_setup(|s| {
            let compiled = s
                .users()
                .filter(json!({"email": "ada@example.com"}))
                .upsert(
                    json!({"name": "Ada"}),
                    json!({"email": "ada@example.com", "name": "Ada"}),
                )
                .to_sql()
                .unwrap();

            assert_binding!(
                (compiled.sql, compiled.params),
                r#"WITH "updated" AS (UPDATE "users" SET "name" = $1 WHERE "users"."email" = $2 RETURNING *), "inserted" AS (INSERT INTO "users" ("name", "email") SELECT $3, $4 WHERE NOT EXISTS (SELECT * FROM "updated") RETURNING *) (SELECT * FROM "updated") UNION ALL (SELECT * FROM "inserted")"#,
                PgValue::Text("Ada".to_string()),
                PgValue::Text("ada@example.com".to_string()),
                PgValue::Text("Ada".to_string()),
                PgValue::Text("ada@example.com".to_string())
            );
        });
    }

    #[test]
    fn upsert_with_selection_adds_a_third_cte() {
        TestSetup::with_setup(|s| {
            let compiled = s
                .users()
                .filter(json!({"email": "ada@example.com"}))
                .select(&["id"])
                .upsert(
                    json!({"name": "Ada"}),
                    json!({"email": "ada@example.com", "name": "Ada"}),
                )
                .to_sql()
                .unwrap();

            assert_binding!(
                (compiled.sql, compiled.params),
                r#"WITH "updated" AS (UPDATE "users" SET "name" = $1 WHERE "users"."email" = $2 RETURNING *), "inserted" AS (INSERT INTO "users" ("name", "email") SELECT $3, $4 WHERE NOT EXISTS (SELECT * FROM "updated") RETURNING *), "users" AS ((SELECT * FROM "updated") UNION ALL (SELECT * FROM "inserted")) SELECT "users"."id" FROM "users" LIMIT $5"#,
                PgValue::Text("Ada".to_string()),
                PgValue::Text("ada@example.com".to_string()),
                PgValue::Text("Ada".to_string()),
                PgValue::Text("ada@example.com".to_string()),
                PgValue::Int8(1)
            );
        });
    }

    #[test]
    fn or_create_keeps_the_found_arm_filters() {
        TestSetup::with_setup(|s| {
            let compiled = s
                .users()
                .filter(json!({"email": "ada@example.com"}))
                .or_create(json!({"email": "ada@example.com", "name": "Ada"}))
                .to_sql()
                .unwrap();

            assert_binding!(
                (compiled.sql, compiled.params),
                r#"WITH "found" AS (SELECT "users".* FROM "users" WHERE "users"."email" = $1), "inserted" AS (INSERT INTO "users" ("name", "email") SELECT $2, $3 WHERE NOT EXISTS (SELECT * FROM "found") RETURNING *) (SELECT * FROM "found") UNION ALL (SELECT * FROM "inserted")"#,
                PgValue::Text("ada@example.com".to_string()),
                PgValue::Text("Ada".to_string()),
                PgValue::Text("ada@example.com".to_string())
            );
        });
    }

    #[test]
    fn mutation_ctes_reserve_their_result_names() {
        TestSetup::with_setup(|s| {
            let helper = s.profiles().select(&["user_id"]);
            let err = s
                .users()
                .with("users", helper)
                .filter(json!({"id": 1}))
                .update(json!({"name": "x"}))
                .to_sql()
                .unwrap_err();
            assert!(matches!(err, QueryError::Validation(msg) if msg.contains("collides")));

            let helper = s.profiles().select(&["user_id"]);
            let err = s
                .users()
                .with("updated", helper)
                .filter(json!({"email": "e"}))
                .upsert(json!({"name": "n"}), json!({"name": "n"}))
                .to_sql()
                .unwrap_err();
            assert!(matches!(err, QueryError::Validation(msg) if msg.contains("collides")));
        });
    }
}

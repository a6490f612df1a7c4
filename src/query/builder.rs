// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::sync::Arc;

use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::execute::{executor, row_parser, DatabasePool};
use crate::query_error::QueryError;
use crate::sql::column_type::Operator;
use crate::sql::database::Database;
use crate::sql::lock::{Lock, LockStrength, LockWait};
use crate::sql::order::{NullsOrder, Ordering};
use crate::sql::raw_fragment::RawFragment;
use crate::sql::select::SetOpKind;
use crate::sql::SQLParamContainer;
use crate::transform::{compile, CompiledQuery};

use super::filter::{self, Comparison, ExistsTarget, Operand, OnCond, WhereItem};
use super::hooks::{Hook, HookPoint};
use super::join::{unique_alias, JoinItem, JoinKind, JoinTarget, JoinedShape, Selectables};
use super::query_data::{
    Mutation, OrderItem, QueryData, ReturnMode, SearchConfig, SelectExpr, SelectItem, UnionItem,
    WindowItem, WithItem,
};
use super::shape::{table_shape, Cardinality, ColumnShape, Shape};

/// One query under construction. Every builder method consumes the query and
/// returns a new one with a single clause added or changed; clone a query to
/// branch a chain. Nothing touches the database until a terminal method runs.
///
/// Builder methods never fail. A bad argument (unknown column, unsupported
/// operator, malformed condition) is recorded and reported by `to_sql` or the
/// terminal call, so chains stay uninterrupted.
#[derive(Debug, Clone)]
pub struct Query {
    pub(crate) database: Arc<Database>,
    pub(crate) pool: Option<DatabasePool>,
    pub(crate) data: QueryData,
}

impl Query {
    pub(crate) fn new(
        database: Arc<Database>,
        pool: Option<DatabasePool>,
        data: QueryData,
    ) -> Self {
        Query {
            database,
            pool,
            data,
        }
    }

    /// The clause set accumulated so far.
    pub(crate) fn data(&self) -> &QueryData {
        &self.data
    }

    fn defer(mut self, err: QueryError) -> Self {
        // first recorded error wins
        if self.data.deferred_err.is_none() {
            self.data.deferred_err = Some(Arc::new(err));
        }
        self
    }

    fn validated(&self, items: &[WhereItem]) -> Result<(), QueryError> {
        Selectables::new(&self.data, &self.database).validate_items(items)
    }

    fn resolve_check(&self, name: &str) -> Result<(), QueryError> {
        Selectables::new(&self.data, &self.database)
            .resolve(name)
            .map(|_| ())
    }

    /// What qualifies the base table's columns: the alias, else the table
    /// name.
    fn qualifier(&self) -> String {
        self.data
            .alias
            .clone()
            .unwrap_or_else(|| self.database.get_table(self.data.table_id).name.clone())
    }

    // ---------- select ----------

    /// Add columns to the select list. With no columns this resets to
    /// select-all, like [`select_all`](Self::select_all).
    pub fn select(mut self, columns: &[&str]) -> Self {
        if columns.is_empty() {
            self.data.select.clear();
            return self;
        }
        for column in columns {
            if let Some(alias) = column.strip_suffix(".*") {
                let known = alias == self.qualifier()
                    || self.data.joined.contains_key(alias)
                    || self.data.from_cte.as_deref() == Some(alias);
                if !known {
                    return self.defer(QueryError::UnknownSelectable(column.to_string()));
                }
            } else if let Err(err) = self.resolve_check(column) {
                return self.defer(err);
            }
            self.data.select.push(SelectItem::Ref(column.to_string()));
        }
        self
    }

    /// Select every column of the base table (`SELECT "table".*`).
    pub fn select_all(mut self) -> Self {
        self.data.select.clear();
        self
    }

    /// Select an aggregate under an output alias; no column means `*`, as in
    /// `count(*)`.
    pub fn aggregate(mut self, alias: &str, function: &str, column: Option<&str>) -> Self {
        if let Some(column) = column {
            if let Err(err) = self.resolve_check(column) {
                return self.defer(err);
            }
        }
        self.data.select.push(SelectItem::Expr {
            alias: alias.to_string(),
            expr: SelectExpr::Aggregate {
                function: function.to_string(),
                column: column.map(|c| c.to_string()),
            },
        });
        self
    }

    /// Select a verbatim SQL expression under an output alias. `$1..$n` in the
    /// fragment refer to `params`; they are renumbered into the statement's
    /// placeholder sequence at compile time.
    pub fn select_raw(mut self, alias: &str, sql: &str, params: Vec<SQLParamContainer>) -> Self {
        match RawFragment::new(sql, params) {
            Ok(fragment) => {
                self.data.select.push(SelectItem::Expr {
                    alias: alias.to_string(),
                    expr: SelectExpr::Raw(fragment),
                });
                self
            }
            Err(err) => self.defer(err),
        }
    }

    /// Select a sub-query as one output field. The sub-query's return mode
    /// decides the field: `json` an array of records, `value` a scalar,
    /// `pluck` an array of scalars, `take` a single record.
    pub fn select_subquery(mut self, alias: &str, query: Query) -> Self {
        self.data.select.push(SelectItem::Subquery {
            alias: alias.to_string(),
            query: Box::new(query.data),
        });
        self
    }

    /// Select `ts_headline(...)` of a document column against the active
    /// search configuration.
    pub fn headline(mut self, alias: &str, column: &str) -> Self {
        if let Err(err) = self.resolve_check(column) {
            return self.defer(err);
        }
        self.data.select.push(SelectItem::Expr {
            alias: alias.to_string(),
            expr: SelectExpr::Headline {
                column: column.to_string(),
            },
        });
        self
    }

    /// Render the base table under an alias. Last write wins.
    pub fn as_alias(mut self, alias: &str) -> Self {
        self.data.alias = Some(alias.to_string());
        self
    }

    // ---------- filters ----------

    /// Add conditions, conjoined with everything already present. Each map
    /// entry is `column: value` (equality, `null` meaning `IS NULL`) or
    /// `column: {operator: operand, ...}`.
    pub fn filter(mut self, conditions: JsonValue) -> Self {
        let items = match filter::from_condition_map(&conditions) {
            Ok(items) => items,
            Err(err) => return self.defer(err),
        };
        if let Err(err) = self.validated(&items) {
            return self.defer(err);
        }
        self.data.and.extend(items);
        self
    }

    /// Add alternatives: each map is a conjunction, and the groups are OR'd
    /// with each other (and conjoined with the `filter` conditions).
    pub fn or_where(mut self, alternatives: Vec<JsonValue>) -> Self {
        for conditions in alternatives {
            let items = match filter::from_condition_map(&conditions) {
                Ok(items) => items,
                Err(err) => return self.defer(err),
            };
            if let Err(err) = self.validated(&items) {
                return self.defer(err);
            }
            self.data.or.push(items);
        }
        self
    }

    /// Add the negation of a condition map: `NOT (a AND b AND ...)`.
    pub fn not_where(mut self, conditions: JsonValue) -> Self {
        let items = match filter::from_condition_map(&conditions) {
            Ok(items) => items,
            Err(err) => return self.defer(err),
        };
        if let Err(err) = self.validated(&items) {
            return self.defer(err);
        }
        self.data
            .and
            .push(WhereItem::Not(Box::new(WhereItem::Or(vec![items]))));
        self
    }

    /// `(a, b) IN ((...), (...))`. A single column accepts a flat value
    /// array; an empty value list compiles to `FALSE`.
    pub fn where_in(mut self, columns: &[&str], values: JsonValue) -> Self {
        let item = match filter::in_item(columns, &values) {
            Ok(item) => item,
            Err(err) => return self.defer(err),
        };
        if let Err(err) = self.validated(std::slice::from_ref(&item)) {
            return self.defer(err);
        }
        self.data.and.push(item);
        self
    }

    /// `column IN (sub-query)`.
    pub fn where_in_query(mut self, column: &str, query: Query) -> Self {
        let item = WhereItem::Cond {
            column: column.to_string(),
            cmp: Comparison {
                operator: Operator::In,
                operand: Operand::Subquery(Box::new(query.data)),
            },
        };
        if let Err(err) = self.validated(std::slice::from_ref(&item)) {
            return self.defer(err);
        }
        self.data.and.push(item);
        self
    }

    /// A column-vs-column condition such as
    /// `where_on("profile.userId", "=", "user.id")`.
    pub fn where_on(mut self, left: &str, op: &str, right: &str) -> Self {
        let cond = match filter::on_condition(left, op, right) {
            Ok(cond) => cond,
            Err(err) => return self.defer(err),
        };
        let item = WhereItem::On(cond);
        if let Err(err) = self.validated(std::slice::from_ref(&item)) {
            return self.defer(err);
        }
        self.data.and.push(item);
        self
    }

    /// A correlated `EXISTS (SELECT 1 FROM table WHERE left op right)`; the
    /// left side names the probed table, the right side this query.
    pub fn where_exists(self, table: &str, left: &str, op: &str, right: &str) -> Self {
        self.exists_item(table, left, op, right, false)
    }

    /// The negation of [`where_exists`](Self::where_exists).
    pub fn where_not_exists(self, table: &str, left: &str, op: &str, right: &str) -> Self {
        self.exists_item(table, left, op, right, true)
    }

    fn exists_item(mut self, table: &str, left: &str, op: &str, right: &str, not: bool) -> Self {
        let cond = match filter::on_condition(left, op, right) {
            Ok(cond) => cond,
            Err(err) => return self.defer(err),
        };
        let item = WhereItem::Exists {
            target: ExistsTarget::Table(table.to_string()),
            on: vec![cond],
            not,
        };
        if let Err(err) = self.validated(std::slice::from_ref(&item)) {
            return self.defer(err);
        }
        self.data.and.push(item);
        self
    }

    /// `EXISTS (sub-query)`, with the sub-query correlating in its own WHERE.
    pub fn where_exists_query(mut self, query: Query) -> Self {
        self.data.and.push(WhereItem::Exists {
            target: ExistsTarget::Query(Box::new(query.data)),
            on: vec![],
            not: false,
        });
        self
    }

    /// A verbatim SQL condition. `$1..$n` refer to `params` and are
    /// renumbered into the statement's placeholder sequence at compile time.
    pub fn where_raw(mut self, sql: &str, params: Vec<SQLParamContainer>) -> Self {
        match RawFragment::new(sql, params) {
            Ok(fragment) => {
                self.data.and.push(WhereItem::Raw(fragment));
                self
            }
            Err(err) => self.defer(err),
        }
    }

    /// HAVING conditions over grouped rows; bare names that are not catalog
    /// columns refer to output aliases such as aggregates.
    pub fn having(mut self, conditions: JsonValue) -> Self {
        let items = match filter::from_condition_map(&conditions) {
            Ok(items) => items,
            Err(err) => return self.defer(err),
        };
        self.data.having.extend(items);
        self
    }

    /// A verbatim HAVING condition.
    pub fn having_raw(mut self, sql: &str, params: Vec<SQLParamContainer>) -> Self {
        match RawFragment::new(sql, params) {
            Ok(fragment) => {
                self.data.having.push(WhereItem::Raw(fragment));
                self
            }
            Err(err) => self.defer(err),
        }
    }

    // ---------- joins ----------

    /// `JOIN table ON left op right`. The joined table answers to its name
    /// (deterministically suffixed on collision) and its columns become
    /// selectable as `table.column`.
    pub fn join(self, table: &str, left: &str, op: &str, right: &str) -> Self {
        self.join_kind(JoinKind::Inner, table, left, op, right)
    }

    pub fn left_join(self, table: &str, left: &str, op: &str, right: &str) -> Self {
        self.join_kind(JoinKind::Left, table, left, op, right)
    }

    pub fn right_join(self, table: &str, left: &str, op: &str, right: &str) -> Self {
        self.join_kind(JoinKind::Right, table, left, op, right)
    }

    pub fn full_join(self, table: &str, left: &str, op: &str, right: &str) -> Self {
        self.join_kind(JoinKind::Full, table, left, op, right)
    }

    fn join_kind(mut self, kind: JoinKind, table: &str, left: &str, op: &str, right: &str) -> Self {
        let cond = match filter::on_condition(left, op, right) {
            Ok(cond) => cond,
            Err(err) => return self.defer(err),
        };
        let Some(table_id) = self.database.get_table_id(table) else {
            return self.defer(QueryError::UnknownTable(table.to_string()));
        };
        let shape = JoinedShape {
            shape: Arc::new(table_shape(&self.database, table_id)),
            table_id: Some(table_id),
        };
        self.register_join(kind, JoinTarget::Table(table_id), shape, table, vec![cond])
    }

    /// Join a CTE attached by an earlier [`with`](Self::with).
    pub fn join_cte(self, name: &str, left: &str, op: &str, right: &str) -> Self {
        let cond = match filter::on_condition(left, op, right) {
            Ok(cond) => cond,
            Err(err) => return self.defer(err),
        };
        let Some(with_item) = self.data.with.iter().find(|item| item.name == name) else {
            return self.defer(QueryError::UnknownTable(name.to_string()));
        };
        // A CTE joins under its own name; it cannot be re-aliased on collision
        if name == self.qualifier() || self.data.joined.contains_key(name) {
            return self.defer(QueryError::Validation(format!(
                "CTE '{name}' collides with an alias already in the query"
            )));
        }
        let shape = JoinedShape {
            shape: Arc::new(with_item.query.output_shape(&self.database)),
            table_id: None,
        };
        self.register_join(
            JoinKind::Inner,
            JoinTarget::Cte(name.to_string()),
            shape,
            name,
            vec![cond],
        )
    }

    /// Join a sub-query as a derived table. Its selected columns become
    /// referenceable as `alias.column`.
    pub fn join_subquery(self, query: Query, alias: &str, left: &str, op: &str, right: &str) -> Self {
        let cond = match filter::on_condition(left, op, right) {
            Ok(cond) => cond,
            Err(err) => return self.defer(err),
        };
        let shape = JoinedShape {
            shape: Arc::new(query.data.output_shape(&self.database)),
            table_id: None,
        };
        self.register_join(
            JoinKind::Inner,
            JoinTarget::Subquery(Box::new(query.data)),
            shape,
            alias,
            vec![cond],
        )
    }

    /// `LEFT JOIN LATERAL (...) ON TRUE`. The sub-query passed to `configure`
    /// can reference this query's columns (`"users"."id"` and friends);
    /// correlation lives in the sub-query's own WHERE. A `json`-mode
    /// sub-query exposes one field named after the alias, holding the related
    /// records as a JSON array; select it with `alias.*`.
    pub fn join_lateral(
        self,
        target: Query,
        alias: &str,
        configure: impl FnOnce(Query) -> Query,
    ) -> Self {
        let qualifier = self.qualifier();

        // seed the parent's resolvable columns into the sub-query, for
        // correlation only; these entries never render joins of their own
        let mut sub = target;
        sub.data.joined.insert(
            qualifier.clone(),
            JoinedShape {
                shape: Arc::new(table_shape(&self.database, self.data.table_id)),
                table_id: Some(self.data.table_id),
            },
        );
        for (existing, joined) in &self.data.joined {
            sub.data
                .joined
                .entry(existing.clone())
                .or_insert_with(|| joined.clone());
        }
        let sub = configure(sub);

        let final_alias = unique_alias(alias, |name| {
            name == qualifier || self.data.joined.contains_key(name)
        });
        let shape = if sub.data.return_mode == ReturnMode::Json {
            let inner = Arc::new(sub.data.output_shape(&self.database));
            let mut single = Shape::new();
            single.insert(
                final_alias.clone(),
                ColumnShape::Nested(inner, Cardinality::Many),
            );
            Arc::new(single)
        } else {
            Arc::new(sub.data.output_shape(&self.database))
        };
        self.register_join(
            JoinKind::Lateral,
            JoinTarget::Subquery(Box::new(sub.data)),
            JoinedShape {
                shape,
                table_id: None,
            },
            &final_alias,
            vec![],
        )
    }

    fn register_join(
        mut self,
        kind: JoinKind,
        target: JoinTarget,
        shape: JoinedShape,
        requested_alias: &str,
        on: Vec<OnCond>,
    ) -> Self {
        let qualifier = self.qualifier();
        let alias = unique_alias(requested_alias, |name| {
            name == qualifier || self.data.joined.contains_key(name)
        });
        self.data.joined.insert(alias.clone(), shape);
        self.data.joins.push(JoinItem {
            kind,
            target,
            alias,
            on: on.clone(),
        });
        // validated after registration so the new alias resolves
        let on_items: Vec<WhereItem> = on.into_iter().map(WhereItem::On).collect();
        if let Err(err) = self.validated(&on_items) {
            return self.defer(err);
        }
        self
    }

    // ---------- ordering, grouping, paging ----------

    pub fn order(self, column: &str) -> Self {
        self.order_by(column, Ordering::Asc, None)
    }

    pub fn order_desc(self, column: &str) -> Self {
        self.order_by(column, Ordering::Desc, None)
    }

    pub fn order_by(mut self, column: &str, ordering: Ordering, nulls: Option<NullsOrder>) -> Self {
        if let Err(err) = self.resolve_check(column) {
            return self.defer(err);
        }
        self.data.order.push(OrderItem::Column {
            column: column.to_string(),
            ordering,
            nulls,
        });
        self
    }

    /// A verbatim ORDER BY expression.
    pub fn order_raw(mut self, sql: &str, params: Vec<SQLParamContainer>) -> Self {
        match RawFragment::new(sql, params) {
            Ok(fragment) => {
                self.data.order.push(OrderItem::Raw(fragment));
                self
            }
            Err(err) => self.defer(err),
        }
    }

    /// Order by `ts_rank(...)` of the active search configuration, best match
    /// first.
    pub fn order_by_search_rank(mut self) -> Self {
        self.data.order.push(OrderItem::SearchRank);
        self
    }

    pub fn group(mut self, columns: &[&str]) -> Self {
        for column in columns {
            if let Err(err) = self.resolve_check(column) {
                return self.defer(err);
            }
            self.data.group.push(column.to_string());
        }
        self
    }

    /// Define a named window for `OVER` clauses in raw select expressions.
    pub fn window(
        mut self,
        name: &str,
        partition_by: &[&str],
        order: &[(&str, Ordering)],
    ) -> Self {
        for column in partition_by.iter().chain(order.iter().map(|(c, _)| c)) {
            if let Err(err) = self.resolve_check(column) {
                return self.defer(err);
            }
        }
        self.data.windows.push(WindowItem {
            name: name.to_string(),
            partition_by: partition_by.iter().map(|c| c.to_string()).collect(),
            order: order
                .iter()
                .map(|(c, ordering)| (c.to_string(), *ordering))
                .collect(),
        });
        self
    }

    /// Last write wins.
    pub fn limit(mut self, limit: i64) -> Self {
        self.data.limit = Some(limit);
        self
    }

    /// Last write wins.
    pub fn offset(mut self, offset: i64) -> Self {
        self.data.offset = Some(offset);
        self
    }

    // ---------- row locking ----------

    pub fn for_update(self) -> Self {
        self.lock_strength(LockStrength::Update)
    }

    pub fn for_no_key_update(self) -> Self {
        self.lock_strength(LockStrength::NoKeyUpdate)
    }

    pub fn for_share(self) -> Self {
        self.lock_strength(LockStrength::Share)
    }

    pub fn for_key_share(self) -> Self {
        self.lock_strength(LockStrength::KeyShare)
    }

    /// Error out instead of waiting for locked rows. Implies `FOR UPDATE`
    /// when no lock strength was chosen.
    pub fn nowait(self) -> Self {
        self.lock_wait(LockWait::NoWait)
    }

    /// Skip locked rows. Implies `FOR UPDATE` when no lock strength was
    /// chosen.
    pub fn skip_locked(self) -> Self {
        self.lock_wait(LockWait::SkipLocked)
    }

    fn lock_strength(mut self, strength: LockStrength) -> Self {
        let wait = self.data.lock.map(|lock| lock.wait).unwrap_or(LockWait::Wait);
        self.data.lock = Some(Lock { strength, wait });
        self
    }

    fn lock_wait(mut self, wait: LockWait) -> Self {
        let strength = self
            .data
            .lock
            .map(|lock| lock.strength)
            .unwrap_or(LockStrength::Update);
        self.data.lock = Some(Lock { strength, wait });
        self
    }

    // ---------- full-text search ----------

    /// Match `query` against the given document columns
    /// (`websearch_to_tsquery` semantics, English by default). Combines with
    /// [`order_by_search_rank`](Self::order_by_search_rank) and
    /// [`headline`](Self::headline).
    pub fn search(mut self, columns: &[&str], query: &str) -> Self {
        for column in columns {
            if let Err(err) = self.resolve_check(column) {
                return self.defer(err);
            }
        }
        self.data.search = Some(SearchConfig {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            query: query.to_string(),
            language: "english".to_string(),
        });
        self
    }

    /// Change the text-search language of an earlier
    /// [`search`](Self::search).
    pub fn search_language(mut self, language: &str) -> Self {
        match &mut self.data.search {
            Some(config) => {
                config.language = language.to_string();
                self
            }
            None => self.defer(QueryError::Validation(
                "search_language requires an earlier search call".to_string(),
            )),
        }
    }

    // ---------- CTEs and set operations ----------

    /// Attach a named CTE (`WITH name AS (...)`).
    pub fn with(mut self, name: &str, query: Query) -> Self {
        if self.data.with.iter().any(|item| item.name == name) {
            return self.defer(QueryError::Validation(format!(
                "duplicate CTE name '{name}'"
            )));
        }
        self.data.with.push(WithItem {
            name: name.to_string(),
            query: Box::new(query.data),
        });
        self
    }

    /// Select from a CTE attached by an earlier [`with`](Self::with) instead
    /// of the base table.
    pub fn from_with(mut self, name: &str) -> Self {
        if !self.data.with.iter().any(|item| item.name == name) {
            return self.defer(QueryError::UnknownTable(name.to_string()));
        }
        self.data.from_cte = Some(name.to_string());
        self
    }

    pub fn union(self, query: Query) -> Self {
        self.set_op(SetOpKind::Union, query)
    }

    pub fn union_all(self, query: Query) -> Self {
        self.set_op(SetOpKind::UnionAll, query)
    }

    pub fn intersect(self, query: Query) -> Self {
        self.set_op(SetOpKind::Intersect, query)
    }

    pub fn intersect_all(self, query: Query) -> Self {
        self.set_op(SetOpKind::IntersectAll, query)
    }

    pub fn except(self, query: Query) -> Self {
        self.set_op(SetOpKind::Except, query)
    }

    pub fn except_all(self, query: Query) -> Self {
        self.set_op(SetOpKind::ExceptAll, query)
    }

    fn set_op(mut self, kind: SetOpKind, query: Query) -> Self {
        self.data.unions.push(UnionItem {
            kind,
            query: Box::new(query.data),
        });
        self
    }

    // ---------- scopes ----------

    /// Apply a scope defined on this table. The `default` scope is applied
    /// automatically when the query is created.
    pub fn scope(mut self, name: &str) -> Self {
        match self.data.available_scopes.get(name) {
            Some(items) => {
                self.data
                    .active_scopes
                    .insert(name.to_string(), items.clone());
                self
            }
            None => self.defer(QueryError::UnknownScope(name.to_string())),
        }
    }

    /// Detach an applied scope (including `default`).
    pub fn unscope(mut self, name: &str) -> Self {
        if !self.data.available_scopes.contains_key(name) {
            return self.defer(QueryError::UnknownScope(name.to_string()));
        }
        self.data.active_scopes.shift_remove(name);
        self
    }

    // ---------- single-row and mutations ----------

    /// Filter by primary key and require exactly one affected row: zero rows
    /// raise `NotFound`, more than one `MoreThanOneRow`.
    pub fn find(self, pk: JsonValue) -> Self {
        let Some(pk_column) = self.database.get_pk_column_id(self.data.table_id) else {
            return self.defer(QueryError::Validation(
                "find on a table with no primary key".to_string(),
            ));
        };
        let key = pk_column.get_column(&self.database).record_key().to_string();
        let mut map = JsonMap::new();
        map.insert(key, pk);
        let mut query = self.filter(JsonValue::Object(map));
        query.data.require_one_row = true;
        query
    }

    /// Filter by conditions and require exactly one affected row.
    pub fn find_by(self, conditions: JsonValue) -> Self {
        let mut query = self.filter(conditions);
        query.data.require_one_row = true;
        query
    }

    /// Opt in to an update/delete with no filter.
    pub fn all_records(mut self) -> Self {
        self.data.allow_unguarded = true;
        self
    }

    /// Insert one record; the created row comes back from
    /// [`take`](Self::take).
    pub fn create(self, record: JsonValue) -> Self {
        let map = match record {
            JsonValue::Object(map) => map,
            other => {
                return self.defer(QueryError::Validation(format!(
                    "create takes a record map, got {other}"
                )))
            }
        };
        self.insert_records(vec![map], ReturnMode::One { required: true })
    }

    /// Insert several records in one statement. A record that does not supply
    /// a column the others do gets that column's default.
    pub fn create_many(self, records: Vec<JsonValue>) -> Self {
        let mut maps = Vec::with_capacity(records.len());
        for record in records {
            match record {
                JsonValue::Object(map) => maps.push(map),
                other => {
                    return self.defer(QueryError::Validation(format!(
                        "create_many takes record maps, got {other}"
                    )))
                }
            }
        }
        self.insert_records(maps, ReturnMode::All)
    }

    fn insert_records(
        mut self,
        records: Vec<JsonMap<String, JsonValue>>,
        mode: ReturnMode,
    ) -> Self {
        for record in &records {
            if let Err(err) = self.validated_record(record) {
                return self.defer(err);
            }
        }
        if self.data.mutation.is_some() {
            return self.defer(QueryError::Validation(
                "a mutation is already attached to this query".to_string(),
            ));
        }
        self.data.mutation = Some(Mutation::Insert { records });
        self.data.return_mode = mode;
        self
    }

    /// Update the filtered rows. Refuses to run without a filter unless
    /// [`all_records`](Self::all_records) was called. Returns the affected
    /// count from [`exec`](Self::exec); chain `take`/`all` for the rows.
    pub fn update(mut self, set: JsonValue) -> Self {
        let map = match set {
            JsonValue::Object(map) => map,
            other => {
                return self.defer(QueryError::Validation(format!(
                    "update takes a column map, got {other}"
                )))
            }
        };
        if let Err(err) = self.validated_record(&map) {
            return self.defer(err);
        }
        match self.data.mutation.take() {
            None => {
                self.data.mutation = Some(Mutation::Update {
                    set: map,
                    raw_sets: vec![],
                });
                self.data.return_mode = ReturnMode::RowCount;
                self
            }
            Some(Mutation::Update { set: mut existing, raw_sets }) => {
                existing.extend(map);
                self.data.mutation = Some(Mutation::Update {
                    set: existing,
                    raw_sets,
                });
                self
            }
            Some(other) => {
                self.data.mutation = Some(other);
                self.defer(QueryError::Validation(
                    "a mutation is already attached to this query".to_string(),
                ))
            }
        }
    }

    /// Add a verbatim SET expression to an update, such as
    /// `set_sql(r#""views" = "views" + $1"#, vec![...])`.
    pub fn set_sql(mut self, sql: &str, params: Vec<SQLParamContainer>) -> Self {
        let fragment = match RawFragment::new(sql, params) {
            Ok(fragment) => fragment,
            Err(err) => return self.defer(err),
        };
        match self.data.mutation.take() {
            None => {
                self.data.mutation = Some(Mutation::Update {
                    set: JsonMap::new(),
                    raw_sets: vec![fragment],
                });
                self.data.return_mode = ReturnMode::RowCount;
                self
            }
            Some(Mutation::Update { set, mut raw_sets }) => {
                raw_sets.push(fragment);
                self.data.mutation = Some(Mutation::Update { set, raw_sets });
                self
            }
            Some(other) => {
                self.data.mutation = Some(other);
                self.defer(QueryError::Validation(
                    "set_sql requires an update mutation".to_string(),
                ))
            }
        }
    }

    /// Delete the filtered rows. Refuses to run without a filter unless
    /// [`all_records`](Self::all_records) was called.
    pub fn delete(mut self) -> Self {
        if self.data.mutation.is_some() {
            return self.defer(QueryError::Validation(
                "a mutation is already attached to this query".to_string(),
            ));
        }
        self.data.mutation = Some(Mutation::Delete);
        self.data.return_mode = ReturnMode::RowCount;
        self
    }

    /// Update the matched rows, or insert `create` when nothing matched — one
    /// multi-CTE statement, no transaction needed against the race.
    pub fn upsert(mut self, update: JsonValue, create: JsonValue) -> Self {
        let (update, create) = match (update, create) {
            (JsonValue::Object(update), JsonValue::Object(create)) => (update, create),
            _ => {
                return self.defer(QueryError::Validation(
                    "upsert takes two record maps".to_string(),
                ))
            }
        };
        if let Err(err) = self
            .validated_record(&update)
            .and_then(|_| self.validated_record(&create))
        {
            return self.defer(err);
        }
        if self.data.mutation.is_some() {
            return self.defer(QueryError::Validation(
                "a mutation is already attached to this query".to_string(),
            ));
        }
        self.data.mutation = Some(Mutation::Upsert { update, create });
        self.data.return_mode = ReturnMode::One { required: true };
        self
    }

    /// Return the matched rows, or insert `create` when nothing matched — one
    /// multi-CTE statement.
    pub fn or_create(mut self, create: JsonValue) -> Self {
        let map = match create {
            JsonValue::Object(map) => map,
            other => {
                return self.defer(QueryError::Validation(format!(
                    "or_create takes a record map, got {other}"
                )))
            }
        };
        if let Err(err) = self.validated_record(&map) {
            return self.defer(err);
        }
        if self.data.mutation.is_some() {
            return self.defer(QueryError::Validation(
                "a mutation is already attached to this query".to_string(),
            ));
        }
        self.data.mutation = Some(Mutation::OrCreate { create: map });
        self.data.return_mode = ReturnMode::One { required: true };
        self
    }

    fn validated_record(&self, record: &JsonMap<String, JsonValue>) -> Result<(), QueryError> {
        for key in record.keys() {
            if self
                .database
                .get_column_id_by_key(self.data.table_id, key)
                .is_none()
            {
                return Err(QueryError::UnknownSelectable(key.clone()));
            }
        }
        Ok(())
    }

    // ---------- hooks ----------

    pub fn before_create(self, hook: Arc<dyn Hook>) -> Self {
        self.add_hook(HookPoint::BeforeCreate, hook)
    }

    pub fn after_create(self, hook: Arc<dyn Hook>) -> Self {
        self.add_hook(HookPoint::AfterCreate, hook)
    }

    pub fn after_create_commit(self, hook: Arc<dyn Hook>) -> Self {
        self.add_hook(HookPoint::AfterCreateCommit, hook)
    }

    pub fn before_update(self, hook: Arc<dyn Hook>) -> Self {
        self.add_hook(HookPoint::BeforeUpdate, hook)
    }

    pub fn after_update(self, hook: Arc<dyn Hook>) -> Self {
        self.add_hook(HookPoint::AfterUpdate, hook)
    }

    pub fn after_update_commit(self, hook: Arc<dyn Hook>) -> Self {
        self.add_hook(HookPoint::AfterUpdateCommit, hook)
    }

    pub fn before_delete(self, hook: Arc<dyn Hook>) -> Self {
        self.add_hook(HookPoint::BeforeDelete, hook)
    }

    pub fn after_delete(self, hook: Arc<dyn Hook>) -> Self {
        self.add_hook(HookPoint::AfterDelete, hook)
    }

    pub fn after_delete_commit(self, hook: Arc<dyn Hook>) -> Self {
        self.add_hook(HookPoint::AfterDeleteCommit, hook)
    }

    fn add_hook(mut self, point: HookPoint, hook: Arc<dyn Hook>) -> Self {
        self.data.hooks.add(point, hook);
        self
    }

    /// Register a post-parse transform. Each record-returning terminal
    /// (`all`, `take`, `take_opt`) passes every parsed record through the
    /// registered transforms, in registration order.
    pub fn map_records(
        mut self,
        transform: impl Fn(JsonValue) -> JsonValue + Send + Sync + 'static,
    ) -> Self {
        self.data.transforms.push(Arc::new(transform));
        self
    }

    // ---------- compilation and execution ----------

    /// Set the return mode without executing, for compiling mode-dependent
    /// SQL (such as the `json` aggregation wrap) ahead of time.
    pub fn with_return_mode(mut self, mode: ReturnMode) -> Self {
        self.data.return_mode = mode;
        self
    }

    /// Compile to SQL and parameters. Reports the first usage error any
    /// builder call recorded. Compiling the same query twice yields identical
    /// output.
    pub fn to_sql(&self) -> Result<CompiledQuery, QueryError> {
        compile(&self.data, &self.database)
    }

    async fn fetch(
        mut self,
        mode: ReturnMode,
    ) -> Result<(CompiledQuery, Vec<tokio_postgres::Row>, u64), QueryError> {
        self.data.return_mode = mode;
        let compiled = compile(&self.data, &self.database)?;
        let pool = self.pool.clone().ok_or_else(|| {
            QueryError::Config("query executed without a connection pool".to_string())
        })?;
        let (rows, count) = executor::run(&pool, &compiled, &self.data).await?;
        Ok((compiled, rows, count))
    }

    /// Execute and return every record.
    pub async fn all(self) -> Result<Vec<JsonValue>, QueryError> {
        let transforms = self.data.transforms.clone();
        let (compiled, rows, _) = self.fetch(ReturnMode::All).await?;
        let records = row_parser::parse_records(&rows, &compiled.shape)?;
        Ok(records
            .into_iter()
            .map(|record| transforms.apply(record))
            .collect())
    }

    /// Execute and return the first record; `NotFound` when there is none.
    pub async fn take(self) -> Result<JsonValue, QueryError> {
        let transforms = self.data.transforms.clone();
        let (compiled, rows, _) = self.fetch(ReturnMode::One { required: true }).await?;
        let record =
            row_parser::parse_one(&rows, &compiled.shape)?.ok_or(QueryError::NotFound)?;
        Ok(transforms.apply(record))
    }

    /// Execute and return the first record, if any.
    pub async fn take_opt(self) -> Result<Option<JsonValue>, QueryError> {
        let transforms = self.data.transforms.clone();
        let (compiled, rows, _) = self.fetch(ReturnMode::One { required: false }).await?;
        let record = row_parser::parse_one(&rows, &compiled.shape)?;
        Ok(record.map(|record| transforms.apply(record)))
    }

    /// Execute and return the single selected value of the first row;
    /// `NotFound` when there is no row.
    pub async fn value(self) -> Result<JsonValue, QueryError> {
        let (compiled, rows, _) = self.fetch(ReturnMode::Value { required: true }).await?;
        row_parser::parse_value(&rows, &compiled.shape)?.ok_or(QueryError::NotFound)
    }

    /// Execute and return the single selected value of the first row, if any.
    pub async fn value_opt(self) -> Result<Option<JsonValue>, QueryError> {
        let (compiled, rows, _) = self.fetch(ReturnMode::Value { required: false }).await?;
        row_parser::parse_value(&rows, &compiled.shape)
    }

    /// Execute and return one column's values as a flat array.
    pub async fn pluck(mut self, column: &str) -> Result<Vec<JsonValue>, QueryError> {
        self.data.select = vec![SelectItem::Ref(column.to_string())];
        let (compiled, rows, _) = self.fetch(ReturnMode::Pluck).await?;
        row_parser::parse_pluck(&rows, &compiled.shape)
    }

    /// Execute and return rows as positional tuples.
    pub async fn rows(self) -> Result<Vec<Vec<JsonValue>>, QueryError> {
        let (compiled, rows, _) = self.fetch(ReturnMode::Rows).await?;
        row_parser::parse_rows(&rows, &compiled.shape)
    }

    /// Execute with the resultset aggregated into one JSON array in SQL:
    /// the query is wrapped in a derived table and aggregated with
    /// `COALESCE(json_agg(row_to_json(...)), '[]')`.
    pub async fn json(self) -> Result<JsonValue, QueryError> {
        let (_, rows, _) = self.fetch(ReturnMode::Json).await?;
        row_parser::parse_json(&rows)
    }

    /// Execute and return the affected row count.
    pub async fn exec(self) -> Result<u64, QueryError> {
        let (_, _, count) = self.fetch(ReturnMode::RowCount).await?;
        Ok(count)
    }

    /// Execute and discard the result.
    pub async fn run(self) -> Result<(), QueryError> {
        self.fetch(ReturnMode::Void).await?;
        Ok(())
    }

    /// Execute `count(*)` over the filtered rows. Ordering and paging are
    /// dropped, as they cannot apply to the aggregate.
    pub async fn count(mut self) -> Result<i64, QueryError> {
        self.data.select = vec![SelectItem::Expr {
            alias: "count".to_string(),
            expr: SelectExpr::Aggregate {
                function: "count".to_string(),
                column: None,
            },
        }];
        self.data.order.clear();
        self.data.limit = None;
        self.data.offset = None;
        let (compiled, rows, _) = self.fetch(ReturnMode::Value { required: true }).await?;
        let value = row_parser::parse_value(&rows, &compiled.shape)?.ok_or(QueryError::NotFound)?;
        value
            .as_i64()
            .ok_or_else(|| QueryError::Validation(format!("count(*) returned {value}")))
    }
}

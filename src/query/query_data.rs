// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::query_error::QueryError;
use crate::sql::database::{Database, TableId};
use crate::sql::lock::Lock;
use crate::sql::order::{NullsOrder, Ordering};
use crate::sql::raw_fragment::RawFragment;
use crate::sql::select::SetOpKind;

use super::filter::WhereItem;
use super::hooks::{HookPoint, HookSet};
use super::join::{unique_alias, JoinItem, JoinedShape, Selectables};
use super::scope::TableScopes;
use super::shape::{table_shape, Cardinality, ColumnShape, Shape};

/// One select-list entry.
#[derive(Debug, Clone)]
pub enum SelectItem {
    /// `"name"`, `"alias.name"`, or `"alias.*"` (the whole joined row as a
    /// nested record).
    Ref(String),
    /// A computed expression under an output alias.
    Expr { alias: String, expr: SelectExpr },
    /// A sub-query selected as one output field, shaped by its own return
    /// mode.
    Subquery {
        alias: String,
        query: Box<QueryData>,
    },
}

/// A computed select expression.
#[derive(Debug, Clone)]
pub enum SelectExpr {
    /// `count(*)`, `sum("price")`, ...; no column means `*`.
    Aggregate {
        function: String,
        column: Option<String>,
    },
    /// A verbatim SQL fragment with its own parameters.
    Raw(RawFragment),
    /// `ts_headline(...)` over the active search configuration.
    Headline { column: String },
}

/// One ORDER BY entry.
#[derive(Debug, Clone)]
pub enum OrderItem {
    Column {
        column: String,
        ordering: Ordering,
        nulls: Option<NullsOrder>,
    },
    Raw(RawFragment),
    /// `ts_rank(...) DESC` over the active search configuration.
    SearchRank,
}

/// A set-operation member attached after the base select.
#[derive(Debug, Clone)]
pub struct UnionItem {
    pub kind: SetOpKind,
    pub query: Box<QueryData>,
}

/// A named CTE attached by `with`.
#[derive(Debug, Clone)]
pub struct WithItem {
    pub name: String,
    pub query: Box<QueryData>,
}

/// A named window definition for the WINDOW clause.
#[derive(Debug, Clone)]
pub struct WindowItem {
    pub name: String,
    pub partition_by: Vec<String>,
    pub order: Vec<(String, Ordering)>,
}

/// A full-text search attached by `search`: a match predicate, plus rank
/// ordering and headline selection on request.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    pub columns: Vec<String>,
    pub query: String,
    pub language: String,
}

/// How the executed rows wrap into a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnMode {
    /// An array of records.
    All,
    /// A single record; `required` turns zero rows into `NotFound`.
    One { required: bool },
    /// A single scalar from a single row.
    Value { required: bool },
    /// A flat array of one column's values.
    Pluck,
    /// Rows as positional tuples.
    Rows,
    /// The number of affected rows.
    RowCount,
    /// Nothing.
    Void,
    /// The whole resultset as one JSON array, aggregated in SQL.
    Json,
}

/// The write a query performs, if any.
#[derive(Debug, Clone)]
pub enum Mutation {
    Insert {
        records: Vec<JsonMap<String, JsonValue>>,
    },
    Update {
        set: JsonMap<String, JsonValue>,
        raw_sets: Vec<RawFragment>,
    },
    Delete,
    /// Update the matched rows; insert `create` when nothing matched. One
    /// multi-CTE statement, so no transaction is needed against the race.
    Upsert {
        update: JsonMap<String, JsonValue>,
        create: JsonMap<String, JsonValue>,
    },
    /// Return the matched rows; insert `create` when nothing matched.
    OrCreate {
        create: JsonMap<String, JsonValue>,
    },
}

impl Mutation {
    /// The operation name used in guard errors.
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::Insert { .. } => "create",
            Mutation::Update { .. } => "update",
            Mutation::Delete => "delete",
            Mutation::Upsert { .. } => "upsert",
            Mutation::OrCreate { .. } => "or_create",
        }
    }

    /// Whether the mutation refuses to run without a filter.
    pub fn guarded(&self) -> bool {
        !matches!(self, Mutation::Insert { .. })
    }

    /// The (before, after, after-commit) hook points of the mutation's
    /// family. An upsert runs update hooks; an or_create runs create hooks.
    pub fn lifecycle(&self) -> (HookPoint, HookPoint, HookPoint) {
        match self {
            Mutation::Insert { .. } | Mutation::OrCreate { .. } => (
                HookPoint::BeforeCreate,
                HookPoint::AfterCreate,
                HookPoint::AfterCreateCommit,
            ),
            Mutation::Update { .. } | Mutation::Upsert { .. } => (
                HookPoint::BeforeUpdate,
                HookPoint::AfterUpdate,
                HookPoint::AfterUpdateCommit,
            ),
            Mutation::Delete => (
                HookPoint::BeforeDelete,
                HookPoint::AfterDelete,
                HookPoint::AfterDeleteCommit,
            ),
        }
    }
}

/// Post-parse record transforms, applied in registration order by the
/// record-returning terminals.
#[derive(Clone, Default)]
pub struct Transforms(Vec<Arc<dyn Fn(JsonValue) -> JsonValue + Send + Sync>>);

impl Transforms {
    pub fn push(&mut self, transform: Arc<dyn Fn(JsonValue) -> JsonValue + Send + Sync>) {
        self.0.push(transform);
    }

    pub fn apply(&self, record: JsonValue) -> JsonValue {
        self.0.iter().fold(record, |record, transform| transform(record))
    }
}

impl fmt::Debug for Transforms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Transforms").field(&self.0.len()).finish()
    }
}

/// The full clause set of one query. Builder methods clone the whole value and
/// change one clause, so two chains never share mutable state; compilation is
/// a pure read.
#[derive(Debug, Clone)]
pub struct QueryData {
    pub table_id: TableId,
    /// The alias the base table renders under, when set (`as_alias`).
    pub alias: Option<String>,
    pub select: Vec<SelectItem>,
    /// Conjoined WHERE items.
    pub and: Vec<WhereItem>,
    /// Disjoined groups; each group is itself a conjunction.
    pub or: Vec<Vec<WhereItem>>,
    pub having: Vec<WhereItem>,
    /// Joins, in the order they render.
    pub joins: Vec<JoinItem>,
    /// Every alias the query can resolve, including resolution-only entries a
    /// lateral parent seeds into its sub-query.
    pub joined: IndexMap<String, JoinedShape>,
    pub order: Vec<OrderItem>,
    pub group: Vec<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub unions: Vec<UnionItem>,
    pub with: Vec<WithItem>,
    /// Select FROM this CTE instead of the base table.
    pub from_cte: Option<String>,
    pub windows: Vec<WindowItem>,
    pub lock: Option<Lock>,
    pub search: Option<SearchConfig>,
    pub return_mode: ReturnMode,
    pub mutation: Option<Mutation>,
    /// The statement must affect/return exactly one row (`find`, `find_by`).
    pub require_one_row: bool,
    /// Opt-in to an unfiltered update/delete (`all_records`).
    pub allow_unguarded: bool,
    /// Scopes currently applied, in application order.
    pub active_scopes: IndexMap<String, Arc<Vec<WhereItem>>>,
    /// The table's scope definitions, snapshotted when the query was created.
    pub available_scopes: Arc<TableScopes>,
    pub hooks: HookSet,
    pub transforms: Transforms,
    /// The first usage error recorded by a builder call, reported when the
    /// query compiles.
    pub deferred_err: Option<Arc<QueryError>>,
}

impl QueryData {
    pub fn new(table_id: TableId, available_scopes: Arc<TableScopes>) -> Self {
        QueryData {
            table_id,
            alias: None,
            select: vec![],
            and: vec![],
            or: vec![],
            having: vec![],
            joins: vec![],
            joined: IndexMap::new(),
            order: vec![],
            group: vec![],
            limit: None,
            offset: None,
            unions: vec![],
            with: vec![],
            from_cte: None,
            windows: vec![],
            lock: None,
            search: None,
            return_mode: ReturnMode::All,
            mutation: None,
            require_one_row: false,
            allow_unguarded: false,
            active_scopes: IndexMap::new(),
            available_scopes,
            hooks: HookSet::default(),
            transforms: Transforms::default(),
            deferred_err: None,
        }
    }

    /// Whether anything constrains the affected rows: pushed filters or a
    /// non-empty applied scope.
    pub fn has_filters(&self) -> bool {
        !self.and.is_empty()
            || !self.or.is_empty()
            || self.active_scopes.values().any(|items| !items.is_empty())
    }

    /// The ordered output description: one entry per output field. This is
    /// what the row parser walks, and what a joined sub-query exposes to its
    /// parent.
    pub fn output_shape(&self, database: &Database) -> Shape {
        let selectables = Selectables::new(self, database);

        if self.select.is_empty() {
            return match selectables.cte_shape() {
                Some(shape) => shape.clone(),
                None => table_shape(database, self.table_id),
            };
        }

        let mut shape = Shape::new();
        for item in &self.select {
            // The base table's own `alias.*` (or the source CTE's) spreads
            // flat, one field per column; a joined `alias.*` stays one nested
            // field.
            if let SelectItem::Ref(name) = item {
                if let Some(alias) = name.strip_suffix(".*") {
                    let spread = match selectables.cte_shape() {
                        Some(cte) if self.from_cte.as_deref() == Some(alias) => Some(cte.clone()),
                        None if alias == selectables.qualifier() => {
                            Some(table_shape(database, self.table_id))
                        }
                        _ => None,
                    };
                    if let Some(spread_shape) = spread {
                        for (key, entry) in spread_shape {
                            let key = unique_alias(&key, |candidate| shape.contains_key(candidate));
                            shape.insert(key, entry);
                        }
                        continue;
                    }
                }
            }
            let (key, entry) = self.item_shape(item, &selectables, database);
            let key = unique_alias(&key, |candidate| shape.contains_key(candidate));
            shape.insert(key, entry);
        }
        shape
    }

    fn item_shape(
        &self,
        item: &SelectItem,
        selectables: &Selectables<'_>,
        database: &Database,
    ) -> (String, ColumnShape) {
        match item {
            SelectItem::Ref(name) => {
                if let Some(alias) = name.strip_suffix(".*") {
                    let entry = match selectables.joined_shape(alias) {
                        // A json-mode lateral is already one aggregated field;
                        // every other joined alias nests its whole row
                        Some(joined) => match joined.json_aggregate(alias) {
                            Some(entry) => entry.clone(),
                            None => ColumnShape::Nested(joined.shape.clone(), Cardinality::One),
                        },
                        None => ColumnShape::Computed,
                    };
                    return (alias.to_string(), entry);
                }
                match selectables.resolve(name) {
                    Ok(resolved) => {
                        let entry = match resolved.typ {
                            Some(typ) => ColumnShape::Scalar(typ),
                            None => ColumnShape::Computed,
                        };
                        (resolved.key, entry)
                    }
                    // The bad reference was recorded when it was pushed; keep
                    // the shape aligned with the select list regardless.
                    Err(_) => (
                        name.rsplit('.').next().unwrap_or(name).to_string(),
                        ColumnShape::Computed,
                    ),
                }
            }
            SelectItem::Expr { alias, .. } => (alias.clone(), ColumnShape::Computed),
            SelectItem::Subquery { alias, query } => {
                let entry = match query.return_mode {
                    ReturnMode::Value { .. } => ColumnShape::Computed,
                    ReturnMode::Pluck => {
                        let sub_shape = query.output_shape(database);
                        match sub_shape.values().next() {
                            Some(ColumnShape::Scalar(typ)) => {
                                ColumnShape::ScalarList(typ.clone())
                            }
                            _ => ColumnShape::Computed,
                        }
                    }
                    ReturnMode::One { .. } => ColumnShape::Nested(
                        Arc::new(query.output_shape(database)),
                        Cardinality::One,
                    ),
                    _ => ColumnShape::Nested(
                        Arc::new(query.output_shape(database)),
                        Cardinality::Many,
                    ),
                };
                (alias.clone(), entry)
            }
        }
    }
}

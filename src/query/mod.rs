// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The chained query surface: a [`Db`] hands out [`Query`] values, builder
//! calls accumulate clauses into [`QueryData`], and terminals compile and
//! execute against the pool.

mod builder;
pub mod filter;
pub mod hooks;
pub(crate) mod join;
pub mod query_data;
mod scope;
pub mod shape;

use std::sync::Arc;

use serde_json::Value as JsonValue;

pub use builder::Query;
pub use hooks::{Hook, HookPoint};
pub use query_data::{Mutation, QueryData, ReturnMode};
pub use scope::DEFAULT_SCOPE;
pub use shape::{Cardinality, ColumnShape, Shape};

use crate::execute::DatabasePool;
use crate::query_error::QueryError;
use crate::sql::database::Database;

use join::Selectables;
use scope::ScopeRegistry;

/// The entry point: a catalog, the scopes defined against it, and
/// optionally a pool to execute through. Cheap to clone and share across
/// tasks.
#[derive(Debug, Clone)]
pub struct Db {
    database: Arc<Database>,
    scopes: ScopeRegistry,
    pool: Option<DatabasePool>,
}

impl Db {
    /// A handle that can compile queries but not execute them; useful for
    /// SQL generation and tests.
    pub fn new(database: Database) -> Self {
        Db {
            database: Arc::new(database),
            scopes: ScopeRegistry::default(),
            pool: None,
        }
    }

    pub fn with_pool(database: Database, pool: DatabasePool) -> Self {
        Db {
            database: Arc::new(database),
            scopes: ScopeRegistry::default(),
            pool: Some(pool),
        }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn pool(&self) -> Option<&DatabasePool> {
        self.pool.as_ref()
    }

    /// Define a named scope for a table: a condition map merged into every
    /// query that applies the scope. A scope named
    /// [`DEFAULT_SCOPE`](crate::query::DEFAULT_SCOPE) is applied to every
    /// query on the table at creation; `unscope("default")` detaches it.
    pub fn define_scope(
        &mut self,
        table: &str,
        name: &str,
        conditions: JsonValue,
    ) -> Result<(), QueryError> {
        let table_id = self
            .database
            .get_table_id(table)
            .ok_or_else(|| QueryError::UnknownTable(table.to_string()))?;
        let items = filter::from_condition_map(&conditions)?;
        // validate against a bare query on the table, so a scope never
        // smuggles an unknown column or operator into later chains
        let probe = QueryData::new(table_id, self.scopes.for_table(table_id));
        Selectables::new(&probe, &self.database).validate_items(&items)?;
        self.scopes.define(table_id, name, items);
        Ok(())
    }

    /// Start a query on a table. Errors when the table is not in the
    /// catalog; every later mistake is deferred to `to_sql` or the terminal
    /// instead, to keep chains uninterrupted.
    pub fn table(&self, name: &str) -> Result<Query, QueryError> {
        let table_id = self
            .database
            .get_table_id(name)
            .ok_or_else(|| QueryError::UnknownTable(name.to_string()))?;
        let available = self.scopes.for_table(table_id);
        let mut data = QueryData::new(table_id, available.clone());
        if let Some(items) = available.get(DEFAULT_SCOPE) {
            data.active_scopes
                .insert(DEFAULT_SCOPE.to_string(), items.clone());
        }
        Ok(Query::new(self.database.clone(), self.pool.clone(), data))
    }
}

// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The core idea in this library is a [`Query`]: an immutable description of
//! one database operation, assembled by chained builder calls. A builder call
//! never talks to the database and never fails; it clones the description,
//! adds one clause, and hands the result back, so chains can branch and be
//! reused freely. Mistakes (an unknown column, an unsupported operator, a
//! guarded mutation without a filter) are recorded in the description and
//! reported when the query compiles.
//!
//! Compilation ([`Query::to_sql`]) is a pure function from the description and
//! the catalog ([`Database`]) to a [`CompiledQuery`]: one parameterized SQL
//! statement with `$n` placeholders, the positional values to bind, and the
//! shape the returned rows will have. Values reach the statement text only as
//! parameters, and identifiers are always quoted, so no input can splice SQL.
//! Compiling the same description twice yields byte-identical output.
//!
//! The terminal methods ([`Query::all`], [`Query::take`], [`Query::exec`],
//! ...) execute the compiled statement over a pooled connection
//! ([`DatabasePool`]) and parse the raw rows back into [`serde_json::Value`]
//! records, guided by the compiled shape. Mutations run their registered
//! [`Hook`]s around the statement, inside a transaction when an after-hook
//! has to be able to roll the write back.
//!
//! This crate also contains, but doesn't expose, the lower level SQL
//! operation primitives the compiler lowers a query into.

pub mod schema;
#[macro_use]
mod sql;
mod execute;
mod query;
pub mod query_error;
mod transform;

/// Public types at the root level of this crate
pub use query::{
    Cardinality, ColumnShape, Db, Hook, HookPoint, Query, ReturnMode, Shape, DEFAULT_SCOPE,
};

pub use execute::{DatabaseClient, DatabasePool, HookContext, TransactionWrapper};

pub use query_error::{QueryError, WithContext};

pub use transform::CompiledQuery;

pub use sql::{
    column_type::{ColumnType, FloatBits, IntBits},
    database::{Database, TableId},
    order::{NullsOrder, Ordering},
    pg_value::PgValue,
    physical_column::{ColumnId, PhysicalColumn},
    physical_table::PhysicalTable,
    SQLBytes, SQLParam, SQLParamContainer,
};

// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Compilation of an assembled query into one parameterized SQL statement.
//!
//! Compiling is a pure read of the query's clause set: the same query always
//! produces the same SQL text and the same parameter order, so a compiled
//! query is safe to log, cache, and replay.

use std::fmt;
use std::sync::Arc;

use crate::query::query_data::QueryData;
use crate::query::shape::Shape;
use crate::query_error::QueryError;
use crate::sql::database::Database;
use crate::sql::expression_builder::ExpressionBuilder;
use crate::sql::SQLParam;

pub(crate) mod mutation_transformer;
pub(crate) mod predicate_transformer;
pub(crate) mod select_transformer;

#[cfg(test)]
mod test_util;

/// A query lowered to wire form: the SQL text with `$n` placeholders, the
/// parameter values in placeholder order, and the output description the row
/// parser walks.
#[derive(Clone)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<Arc<dyn SQLParam>>,
    pub shape: Arc<Shape>,
}

impl fmt::Debug for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledQuery")
            .field("sql", &self.sql)
            .field("params", &self.params.len())
            .finish()
    }
}

/// Lower a query to its statement. Reports the first usage error recorded by
/// a builder call, refuses an unfiltered guarded mutation, and otherwise
/// renders the SQL and collects the parameters.
pub fn compile(data: &QueryData, database: &Database) -> Result<CompiledQuery, QueryError> {
    if let Some(err) = &data.deferred_err {
        return Err(err.replay());
    }

    let operation = match &data.mutation {
        Some(mutation) => {
            if mutation.guarded() && !data.has_filters() && !data.allow_unguarded {
                return Err(QueryError::UnguardedMutation(mutation.name()));
            }
            mutation_transformer::statement(data, mutation, database)?
        }
        None => select_transformer::statement(data, database)?,
    };

    let (sql, params) = operation.to_sql(database);
    Ok(CompiledQuery {
        sql,
        params,
        shape: Arc::new(data.output_shape(database)),
    })
}

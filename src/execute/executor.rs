// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Runs a [`CompiledQuery`] against the pool: acquires a connection, walks the
//! hook pipeline, and hands the raw rows back for parsing.
//!
//! A mutation that carries after-hooks runs inside a transaction, so a failing
//! hook rolls the write back; after-commit hooks run once the transaction has
//! committed and cannot. Everything else is a single auto-committed statement.

use serde_json::Value as JsonValue;
use tokio_postgres::types::ToSql;
use tracing::{debug, error, instrument};

use crate::execute::pool::{DatabaseClient, DatabasePool, TransactionWrapper};
use crate::execute::row_parser;
use crate::query::query_data::{Mutation, QueryData, ReturnMode};
use crate::query_error::QueryError;
use crate::transform::CompiledQuery;

/// The connection a hook runs against. Statements issued through a
/// [`HookContext::Transaction`] join the mutation's transaction and roll back
/// with it.
pub enum HookContext<'a> {
    Client(&'a DatabaseClient),
    Transaction(&'a TransactionWrapper<'a>),
}

impl HookContext<'_> {
    pub async fn query(
        &self,
        statement: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<tokio_postgres::Row>, QueryError> {
        match self {
            HookContext::Client(client) => Ok(client.query(statement, params).await?),
            HookContext::Transaction(tx) => Ok(tx.query(statement, params).await?),
        }
    }

    pub async fn execute(
        &self,
        statement: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<u64, QueryError> {
        match self {
            HookContext::Client(client) => Ok(client.execute(statement, params).await?),
            HookContext::Transaction(tx) => Ok(tx.execute(statement, params).await?),
        }
    }
}

/// Execute a compiled query and return the raw rows plus the affected count.
#[instrument(name = "executor::run", level = "trace", skip_all, fields(sql = %compiled.sql))]
pub(crate) async fn run(
    pool: &DatabasePool,
    compiled: &CompiledQuery,
    data: &QueryData,
) -> Result<(Vec<tokio_postgres::Row>, u64), QueryError> {
    let params: Vec<&(dyn ToSql + Sync)> = compiled.params.iter().map(|p| p.as_pg()).collect();
    let mut client = pool.get_client().await?;

    let Some(mutation) = &data.mutation else {
        return statement(&HookContext::Client(&client), compiled, &params, data).await;
    };

    let (before, after, after_commit) = mutation.lifecycle();
    let inputs = input_records(mutation);

    if !data.hooks.has_any(&[after, after_commit]) {
        let ctx = HookContext::Client(&client);
        for hook in data.hooks.get(before) {
            hook.run(&inputs, &ctx).await?;
        }
        return statement(&ctx, compiled, &params, data).await;
    }

    let tx = client.transaction().await.map_err(|e| {
        error!("Failed to begin transaction: {e:?}");
        QueryError::Delegate(e).with_context("Failed to begin a transaction".into())
    })?;

    let ctx = HookContext::Transaction(&tx);
    for hook in data.hooks.get(before) {
        hook.run(&inputs, &ctx).await?;
    }
    let (rows, count) = statement(&ctx, compiled, &params, data).await?;
    let records = row_parser::parse_records(&rows, &compiled.shape)?;
    for hook in data.hooks.get(after) {
        hook.run(&records, &ctx).await?;
    }

    tx.commit().await.map_err(|e| {
        error!("Failed to commit transaction: {e:?}");
        QueryError::Delegate(e).with_context("Failed to commit the transaction".into())
    })?;

    let ctx = HookContext::Client(&client);
    for hook in data.hooks.get(after_commit) {
        hook.run(&records, &ctx).await?;
    }

    Ok((rows, count))
}

async fn statement(
    ctx: &HookContext<'_>,
    compiled: &CompiledQuery,
    params: &[&(dyn ToSql + Sync)],
    data: &QueryData,
) -> Result<(Vec<tokio_postgres::Row>, u64), QueryError> {
    debug!("Executing SQL operation: {}", compiled.sql);

    if wants_rows(data) {
        let rows = ctx.query(&compiled.sql, params).await.map_err(|e| {
            error!("Failed to execute query: {e:?}");
            e.with_context("Database operation failed".into())
        })?;
        let count = rows.len() as u64;
        check_row_expectation(data.require_one_row, count)?;
        Ok((rows, count))
    } else {
        let count = ctx.execute(&compiled.sql, params).await.map_err(|e| {
            error!("Failed to execute query: {e:?}");
            e.with_context("Database operation failed".into())
        })?;
        check_row_expectation(data.require_one_row, count)?;
        Ok((vec![], count))
    }
}

/// Whether the statement is run through `query` (rows back) or `execute`
/// (count only). Must agree with the compiler's `RETURNING` policy.
fn wants_rows(data: &QueryData) -> bool {
    if !matches!(data.return_mode, ReturnMode::RowCount | ReturnMode::Void) {
        return true;
    }
    match &data.mutation {
        Some(mutation) => {
            let (_, after, commit) = mutation.lifecycle();
            data.hooks.has_any(&[after, commit])
        }
        None => false,
    }
}

/// The JSON payloads the mutation was built with, in the order given; what
/// before-hooks receive.
fn input_records(mutation: &Mutation) -> Vec<JsonValue> {
    match mutation {
        Mutation::Insert { records } => {
            records.iter().cloned().map(JsonValue::Object).collect()
        }
        Mutation::Update { set, .. } => vec![JsonValue::Object(set.clone())],
        Mutation::Delete => vec![],
        Mutation::Upsert { update, create } => vec![
            JsonValue::Object(update.clone()),
            JsonValue::Object(create.clone()),
        ],
        Mutation::OrCreate { create } => vec![JsonValue::Object(create.clone())],
    }
}

/// A `find`-style query must resolve to exactly one row.
fn check_row_expectation(require_one_row: bool, affected: u64) -> Result<(), QueryError> {
    if !require_one_row {
        return Ok(());
    }
    match affected {
        0 => Err(QueryError::NotFound),
        1 => Ok(()),
        n => Err(QueryError::MoreThanOneRow(n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_expectation_pass_through_without_requirement() {
        assert!(check_row_expectation(false, 0).is_ok());
        assert!(check_row_expectation(false, 5).is_ok());
    }

    #[test]
    fn row_expectation_requires_exactly_one() {
        assert!(matches!(
            check_row_expectation(true, 0),
            Err(QueryError::NotFound)
        ));
        assert!(check_row_expectation(true, 1).is_ok());
        assert!(matches!(
            check_row_expectation(true, 3),
            Err(QueryError::MoreThanOneRow(3))
        ));
    }
}

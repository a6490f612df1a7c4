// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Turns raw rows back into JSON records, guided by the [`Shape`] frozen at
//! compile time.
//!
//! Columns are read positionally: the compiler emits select items in shape
//! order, so the i-th shape entry describes the i-th output column. Catalog
//! columns parse by their declared kind, computed expressions by the wire
//! type, and JSON-built entries (joined rows, lateral aggregates, plucking
//! sub-queries) pass through as the JSON the database already assembled.

use serde_json::{Map as JsonMap, Value as JsonValue};
use tokio_postgres::Row;

use crate::query::shape::{ColumnShape, Shape};
use crate::query_error::QueryError;
use crate::sql::column_type::parse;
use crate::sql::pg_value::PgValue;

/// Every row as a keyed record.
pub(crate) fn parse_records(rows: &[Row], shape: &Shape) -> Result<Vec<JsonValue>, QueryError> {
    rows.iter()
        .map(|row| parse_record(row, shape).map(JsonValue::Object))
        .collect()
}

/// The first row as a keyed record, if any.
pub(crate) fn parse_one(rows: &[Row], shape: &Shape) -> Result<Option<JsonValue>, QueryError> {
    rows.first()
        .map(|row| parse_record(row, shape).map(JsonValue::Object))
        .transpose()
}

/// The single selected value of the first row, if any.
pub(crate) fn parse_value(rows: &[Row], shape: &Shape) -> Result<Option<JsonValue>, QueryError> {
    let Some(row) = rows.first() else {
        return Ok(None);
    };
    let (_, entry) = single_entry(shape)?;
    Ok(Some(parse_entry(row, 0, entry)?))
}

/// One column's values as a flat array.
pub(crate) fn parse_pluck(rows: &[Row], shape: &Shape) -> Result<Vec<JsonValue>, QueryError> {
    let (_, entry) = single_entry(shape)?;
    rows.iter().map(|row| parse_entry(row, 0, entry)).collect()
}

/// Rows as positional tuples, in shape order.
pub(crate) fn parse_rows(rows: &[Row], shape: &Shape) -> Result<Vec<Vec<JsonValue>>, QueryError> {
    rows.iter()
        .map(|row| {
            shape
                .values()
                .enumerate()
                .map(|(index, entry)| parse_entry(row, index, entry))
                .collect()
        })
        .collect()
}

/// The SQL-side aggregated resultset: one row holding one JSON array.
pub(crate) fn parse_json(rows: &[Row]) -> Result<JsonValue, QueryError> {
    match rows.first() {
        Some(row) => json_passthrough(row.try_get(0)?),
        None => Ok(JsonValue::Array(vec![])),
    }
}

fn parse_record(row: &Row, shape: &Shape) -> Result<JsonMap<String, JsonValue>, QueryError> {
    let mut record = JsonMap::with_capacity(shape.len());
    for (index, (key, entry)) in shape.iter().enumerate() {
        record.insert(key.clone(), parse_entry(row, index, entry)?);
    }
    Ok(record)
}

fn parse_entry(row: &Row, index: usize, entry: &ColumnShape) -> Result<JsonValue, QueryError> {
    let raw: PgValue = row.try_get(index)?;
    match entry {
        ColumnShape::Scalar(typ) => parse::to_json(typ, raw),
        ColumnShape::Computed => parse::infer_to_json(raw),
        ColumnShape::Nested(..) | ColumnShape::ScalarList(_) => json_passthrough(raw),
    }
}

/// A JSON-built entry arrives as the `json`/`jsonb` the statement assembled;
/// a left join with no match arrives as SQL NULL.
fn json_passthrough(value: PgValue) -> Result<JsonValue, QueryError> {
    match value {
        PgValue::Json(value) => Ok(value),
        PgValue::Null => Ok(JsonValue::Null),
        other => parse::infer_to_json(other),
    }
}

fn single_entry(shape: &Shape) -> Result<(&String, &ColumnShape), QueryError> {
    shape
        .get_index(0)
        .ok_or_else(|| QueryError::Validation("a value read needs a selected column".to_string()))
}

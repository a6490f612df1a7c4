// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde_json::{Number, Value as JsonValue, json};

use crate::query_error::QueryError;
use crate::sql::pg_value::PgValue;

use super::ColumnType;

/// Parse a wire value of the given kind back into JSON.
///
/// The output is chosen so that encoding it again yields the same wire value:
/// numerics parse to strings (JSON numbers cannot hold every `numeric`),
/// timestamps to RFC 3339, dates to `YYYY-MM-DD`, and binary data to base64.
pub fn to_json(typ: &ColumnType, value: PgValue) -> Result<JsonValue, QueryError> {
    if matches!(value, PgValue::Null) {
        return Ok(JsonValue::Null);
    }

    match (typ, value) {
        (ColumnType::Int { .. }, PgValue::Int2(i)) => Ok(json!(i)),
        (ColumnType::Int { .. }, PgValue::Int4(i)) => Ok(json!(i)),
        (ColumnType::Int { .. }, PgValue::Int8(i)) => Ok(json!(i)),
        (ColumnType::Float { .. }, PgValue::Float4(f)) => float_to_json(f64::from(f)),
        (ColumnType::Float { .. }, PgValue::Float8(f)) => float_to_json(f),
        (ColumnType::Numeric { .. }, PgValue::Numeric(d)) => Ok(json!(d.to_string())),
        (ColumnType::String { .. } | ColumnType::Enum { .. }, PgValue::Text(s)) => Ok(json!(s)),
        (ColumnType::Boolean, PgValue::Bool(b)) => Ok(json!(b)),
        (ColumnType::Timestamp { timezone: true, .. }, PgValue::TimestampTz(dt)) => {
            Ok(json!(dt.to_rfc3339()))
        }
        (ColumnType::Timestamp { timezone: false, .. }, PgValue::Timestamp(dt)) => {
            Ok(json!(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
        }
        (ColumnType::Date, PgValue::Date(d)) => Ok(json!(d.format("%Y-%m-%d").to_string())),
        (ColumnType::Time { .. }, PgValue::Time(t)) => {
            Ok(json!(t.format("%H:%M:%S%.f").to_string()))
        }
        (ColumnType::Json, PgValue::Json(value)) => Ok(value),
        (ColumnType::Blob, PgValue::Bytes(bytes)) => {
            Ok(json!(BASE64_STANDARD.encode(&bytes.0)))
        }
        (ColumnType::Uuid, PgValue::Uuid(uuid)) => Ok(json!(uuid.to_string())),
        (ColumnType::Array { typ: elem_type }, PgValue::Array(array)) => {
            let mut elems = array.iter().cloned();
            unflatten(elem_type, array.dimensions(), &mut elems)
        }
        (typ, value) => Err(QueryError::Validation(format!(
            "Cannot parse {value:?} as {}",
            typ.sql_name()
        ))),
    }
}

/// Parse a wire value whose kind the catalog does not know: a `count(*)`, a
/// raw selectable, a joined subquery output. The variant alone decides the
/// JSON rendering, following the same conventions as [`to_json`].
pub fn infer_to_json(value: PgValue) -> Result<JsonValue, QueryError> {
    match value {
        PgValue::Null => Ok(JsonValue::Null),
        PgValue::Bool(b) => Ok(json!(b)),
        PgValue::Int2(i) => Ok(json!(i)),
        PgValue::Int4(i) => Ok(json!(i)),
        PgValue::Int8(i) => Ok(json!(i)),
        PgValue::Float4(f) => float_to_json(f64::from(f)),
        PgValue::Float8(f) => float_to_json(f),
        PgValue::Numeric(d) => Ok(json!(d.to_string())),
        PgValue::Text(s) => Ok(json!(s)),
        PgValue::Bytes(bytes) => Ok(json!(BASE64_STANDARD.encode(&bytes.0))),
        PgValue::Uuid(uuid) => Ok(json!(uuid.to_string())),
        PgValue::Date(d) => Ok(json!(d.format("%Y-%m-%d").to_string())),
        PgValue::Time(t) => Ok(json!(t.format("%H:%M:%S%.f").to_string())),
        PgValue::Timestamp(dt) => Ok(json!(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
        PgValue::TimestampTz(dt) => Ok(json!(dt.to_rfc3339())),
        PgValue::Json(value) => Ok(value),
        PgValue::Array(array) => array
            .iter()
            .cloned()
            .map(infer_to_json)
            .collect::<Result<Vec<_>, _>>()
            .map(JsonValue::Array),
    }
}

fn float_to_json(f: f64) -> Result<JsonValue, QueryError> {
    Number::from_f64(f)
        .map(JsonValue::Number)
        .ok_or_else(|| QueryError::Validation(format!("{f} is not representable in JSON")))
}

/// Rebuild the nested JSON arrays from the row-major element sequence.
fn unflatten(
    elem_type: &ColumnType,
    dims: &[postgres_array::Dimension],
    elems: &mut impl Iterator<Item = PgValue>,
) -> Result<JsonValue, QueryError> {
    match dims.split_first() {
        None => Ok(JsonValue::Array(vec![])),
        Some((head, [])) => (0..head.len)
            .map(|_| {
                let elem = elems
                    .next()
                    .ok_or_else(|| QueryError::Validation("Array value too short".into()))?;
                to_json(elem_type, elem)
            })
            .collect::<Result<Vec<_>, _>>()
            .map(JsonValue::Array),
        Some((head, rest)) => {
            let inner_type = match elem_type {
                ColumnType::Array { typ } => typ.as_ref(),
                _ => elem_type,
            };
            (0..head.len)
                .map(|_| unflatten(inner_type, rest, elems))
                .collect::<Result<Vec<_>, _>>()
                .map(JsonValue::Array)
        }
    }
}

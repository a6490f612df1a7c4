// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::{HashMap, hash_map::Entry};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use postgres_array::{Array, Dimension};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use crate::query_error::QueryError;
use crate::sql::SQLBytes;
use crate::sql::pg_value::PgValue;
use crate::sql::sql_param_container::SQLParamContainer;

use super::{ColumnType, IntBits};

/// Encode a JSON value as a wire parameter for a column of the given kind.
///
/// `null` encodes as a typed NULL for every kind. Anything the kind cannot
/// represent is a [`QueryError::Validation`].
pub fn to_pg_value(typ: &ColumnType, value: &JsonValue) -> Result<PgValue, QueryError> {
    if value.is_null() {
        return Ok(PgValue::Null);
    }

    match typ {
        ColumnType::Int { bits } => {
            let num = value
                .as_i64()
                .ok_or_else(|| mismatch(typ, value))?;
            Ok(match bits {
                IntBits::_16 => PgValue::Int2(
                    i16::try_from(num).map_err(|_| out_of_range(typ, value))?,
                ),
                IntBits::_32 => PgValue::Int4(
                    i32::try_from(num).map_err(|_| out_of_range(typ, value))?,
                ),
                IntBits::_64 => PgValue::Int8(num),
            })
        }
        ColumnType::Float { bits } => {
            let num = value.as_f64().ok_or_else(|| mismatch(typ, value))?;
            Ok(match bits {
                super::FloatBits::_24 => PgValue::Float4(num as f32),
                super::FloatBits::_53 => PgValue::Float8(num),
            })
        }
        ColumnType::Numeric { .. } => {
            // Accept both a JSON string (exact) and a JSON number
            let decimal = match value {
                JsonValue::String(s) => s.parse::<Decimal>().ok(),
                JsonValue::Number(n) => n.to_string().parse::<Decimal>().ok(),
                _ => None,
            }
            .ok_or_else(|| mismatch(typ, value))?;
            Ok(PgValue::Numeric(decimal))
        }
        ColumnType::String { .. } | ColumnType::Enum { .. } => {
            let s = value.as_str().ok_or_else(|| mismatch(typ, value))?;
            Ok(PgValue::Text(s.to_owned()))
        }
        ColumnType::Boolean => {
            let b = value.as_bool().ok_or_else(|| mismatch(typ, value))?;
            Ok(PgValue::Bool(b))
        }
        ColumnType::Timestamp { timezone, .. } => {
            let s = value.as_str().ok_or_else(|| mismatch(typ, value))?;
            if *timezone {
                let dt = DateTime::parse_from_rfc3339(s).map_err(|_| mismatch(typ, value))?;
                Ok(PgValue::TimestampTz(dt.into()))
            } else {
                let dt = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                    .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
                    .map_err(|_| mismatch(typ, value))?;
                Ok(PgValue::Timestamp(dt))
            }
        }
        ColumnType::Date => {
            let s = value.as_str().ok_or_else(|| mismatch(typ, value))?;
            let date =
                NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| mismatch(typ, value))?;
            Ok(PgValue::Date(date))
        }
        ColumnType::Time { .. } => {
            let s = value.as_str().ok_or_else(|| mismatch(typ, value))?;
            let time =
                NaiveTime::parse_from_str(s, "%H:%M:%S%.f").map_err(|_| mismatch(typ, value))?;
            Ok(PgValue::Time(time))
        }
        ColumnType::Json => Ok(PgValue::Json(value.clone())),
        ColumnType::Blob => {
            let s = value.as_str().ok_or_else(|| mismatch(typ, value))?;
            let bytes = BASE64_STANDARD
                .decode(s)
                .map_err(|_| mismatch(typ, value))?;
            Ok(PgValue::Bytes(SQLBytes::new(bytes)))
        }
        ColumnType::Uuid => {
            let s = value.as_str().ok_or_else(|| mismatch(typ, value))?;
            let uuid = uuid::Uuid::parse_str(s).map_err(|_| mismatch(typ, value))?;
            Ok(PgValue::Uuid(uuid))
        }
        ColumnType::Array { typ: elem_type } => {
            let elems = value.as_array().ok_or_else(|| mismatch(typ, value))?;
            Ok(PgValue::Array(to_pg_array(elem_type, elems)?))
        }
    }
}

/// Encode a JSON value as a ready-to-bind parameter for a column of the given kind.
pub fn to_param(typ: &ColumnType, value: &JsonValue) -> Result<SQLParamContainer, QueryError> {
    to_pg_value(typ, value).map(SQLParamContainer::new)
}

/// Encode a value whose column kind is unknown (raw selectables, joined
/// subquery outputs). The parameter type is inferred from the JSON shape.
pub fn infer_param(value: &JsonValue) -> SQLParamContainer {
    let pg_value = match value {
        JsonValue::Null => PgValue::Null,
        JsonValue::Bool(b) => PgValue::Bool(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => PgValue::Int8(i),
            None => PgValue::Float8(n.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(s) => PgValue::Text(s.clone()),
        value @ (JsonValue::Array(_) | JsonValue::Object(_)) => PgValue::Json(value.clone()),
    };
    SQLParamContainer::new(pg_value)
}

/// Convert a (possibly nested) JSON array into a Postgres array value.
///
/// Postgres's multi-dimensional arrays are a single flat sequence of elements
/// in row-major order plus a list of dimensions. Each depth records its length
/// on first visit; a later visit with a different length is a ragged array,
/// which Postgres does not support.
fn to_pg_array(elem_type: &ColumnType, elems: &[JsonValue]) -> Result<Array<PgValue>, QueryError> {
    let mut result = (Vec::new(), HashMap::new());
    process_array(elem_type, elems, &mut result, 0)?;

    let mut dimension_lens = result.1.iter().collect::<Vec<_>>();
    dimension_lens.sort_by_key(|(key, _)| **key);
    let dimensions = dimension_lens
        .into_iter()
        .map(|(_, v)| Dimension {
            len: *v,
            lower_bound: 0,
        })
        .collect::<Vec<_>>();

    Ok(Array::from_parts(result.0, dimensions))
}

fn process_array(
    elem_type: &ColumnType,
    elems: &[JsonValue],
    result: &mut (Vec<PgValue>, HashMap<usize, i32>),
    depth: usize,
) -> Result<(), QueryError> {
    let mut len = 0;

    for elem in elems {
        len += 1;
        match (elem_type, elem) {
            (ColumnType::Array { typ }, JsonValue::Array(inner)) => {
                process_array(typ, inner, result, depth + 1)?;
            }
            (ColumnType::Array { .. }, _) => {
                return Err(mismatch(elem_type, elem));
            }
            _ => {
                result.0.push(to_pg_value(elem_type, elem)?);
            }
        }
    }

    // Update the dimension if this is the first time we are at this depth.
    // If this is a repeated visit at a depth, check if the length is the same
    // (we do not support entries in the array of different lengths)
    match result.1.entry(depth) {
        Entry::Vacant(entry) => {
            entry.insert(len);
        }
        Entry::Occupied(entry) => {
            if *entry.get() != len {
                return Err(QueryError::Validation(format!(
                    "Array dimensions do not match in dimension {}. Expected {}, got {}",
                    depth,
                    *entry.get(),
                    len
                )));
            }
        }
    }

    Ok(())
}

fn mismatch(typ: &ColumnType, value: &JsonValue) -> QueryError {
    QueryError::Validation(format!(
        "Cannot encode {value} as {}",
        typ.sql_name()
    ))
}

fn out_of_range(typ: &ColumnType, value: &JsonValue) -> QueryError {
    QueryError::Validation(format!("{value} is out of range for {}", typ.sql_name()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::sql::column_type::FloatBits;

    #[test]
    fn encodes_scalars_by_kind() {
        assert_eq!(
            to_pg_value(&ColumnType::Int { bits: IntBits::_64 }, &json!(42)).unwrap(),
            PgValue::Int8(42)
        );
        assert_eq!(
            to_pg_value(&ColumnType::Int { bits: IntBits::_16 }, &json!(7)).unwrap(),
            PgValue::Int2(7)
        );
        assert_eq!(
            to_pg_value(
                &ColumnType::Float {
                    bits: FloatBits::_53
                },
                &json!(1.5)
            )
            .unwrap(),
            PgValue::Float8(1.5)
        );
        assert_eq!(
            to_pg_value(&ColumnType::String { max_length: None }, &json!("hi")).unwrap(),
            PgValue::Text("hi".to_owned())
        );
        assert_eq!(
            to_pg_value(&ColumnType::Boolean, &json!(true)).unwrap(),
            PgValue::Bool(true)
        );
    }

    #[test]
    fn null_encodes_as_null_for_every_kind() {
        assert_eq!(
            to_pg_value(&ColumnType::Uuid, &JsonValue::Null).unwrap(),
            PgValue::Null
        );
        assert_eq!(
            to_pg_value(&ColumnType::Json, &JsonValue::Null).unwrap(),
            PgValue::Null
        );
    }

    #[test]
    fn numeric_accepts_string_and_number() {
        let typ = ColumnType::Numeric {
            precision: Some(10),
            scale: Some(2),
        };
        assert_eq!(
            to_pg_value(&typ, &json!("12.34")).unwrap(),
            PgValue::Numeric("12.34".parse().unwrap())
        );
        assert_eq!(
            to_pg_value(&typ, &json!(12.34)).unwrap(),
            PgValue::Numeric("12.34".parse().unwrap())
        );
    }

    #[test]
    fn timestamps_parse_by_zone_flag() {
        let with_tz = ColumnType::Timestamp {
            timezone: true,
            precision: None,
        };
        let PgValue::TimestampTz(dt) =
            to_pg_value(&with_tz, &json!("2024-03-05T10:15:00+02:00")).unwrap()
        else {
            panic!("expected a timestamptz value")
        };
        assert_eq!(dt.timestamp(), 1709626500);

        let without_tz = ColumnType::Timestamp {
            timezone: false,
            precision: None,
        };
        assert!(matches!(
            to_pg_value(&without_tz, &json!("2024-03-05T10:15:00")).unwrap(),
            PgValue::Timestamp(_)
        ));
    }

    #[test]
    fn blob_decodes_base64() {
        let PgValue::Bytes(bytes) = to_pg_value(&ColumnType::Blob, &json!("aGVsbG8=")).unwrap()
        else {
            panic!("expected a bytea value")
        };
        assert_eq!(&bytes.0[..], b"hello");

        assert!(matches!(
            to_pg_value(&ColumnType::Blob, &json!("not base64!!!")),
            Err(QueryError::Validation(_))
        ));
    }

    #[test]
    fn arrays_flatten_in_row_major_order() {
        let typ = ColumnType::Array {
            typ: Box::new(ColumnType::Int { bits: IntBits::_32 }),
        };
        let PgValue::Array(array) = to_pg_value(&typ, &json!([1, 2, 3])).unwrap() else {
            panic!("expected an array value")
        };
        assert_eq!(
            array.dimensions(),
            [Dimension {
                len: 3,
                lower_bound: 0
            }]
        );

        let nested = ColumnType::Array {
            typ: Box::new(ColumnType::Array {
                typ: Box::new(ColumnType::Int { bits: IntBits::_32 }),
            }),
        };
        let PgValue::Array(array) = to_pg_value(&nested, &json!([[1, 2, 3], [4, 5, 6]])).unwrap()
        else {
            panic!("expected an array value")
        };
        assert_eq!(
            array.dimensions(),
            [
                Dimension {
                    len: 2,
                    lower_bound: 0
                },
                Dimension {
                    len: 3,
                    lower_bound: 0
                }
            ]
        );
        assert_eq!(
            array.iter().cloned().collect::<Vec<_>>(),
            vec![
                PgValue::Int4(1),
                PgValue::Int4(2),
                PgValue::Int4(3),
                PgValue::Int4(4),
                PgValue::Int4(5),
                PgValue::Int4(6)
            ]
        );
    }

    #[test]
    fn ragged_arrays_are_rejected() {
        let nested = ColumnType::Array {
            typ: Box::new(ColumnType::Array {
                typ: Box::new(ColumnType::Int { bits: IntBits::_32 }),
            }),
        };
        assert!(matches!(
            to_pg_value(&nested, &json!([[1, 2, 3], [4]])),
            Err(QueryError::Validation(_))
        ));
    }

    #[test]
    fn type_mismatches_are_validation_errors() {
        assert!(matches!(
            to_pg_value(&ColumnType::Int { bits: IntBits::_32 }, &json!("five")),
            Err(QueryError::Validation(_))
        ));
        assert!(matches!(
            to_pg_value(&ColumnType::Int { bits: IntBits::_16 }, &json!(100_000)),
            Err(QueryError::Validation(_))
        ));
        assert!(matches!(
            to_pg_value(&ColumnType::Date, &json!("03/05/2024")),
            Err(QueryError::Validation(_))
        ));
    }
}

// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use postgres_array::Array;
use rust_decimal::Decimal;
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, Kind, ToSql, Type};

use super::SQLBytes;

/// A typed wire value: the single currency between the JSON-facing encode/parse
/// functions and the driver. Encoding a JSON value against a column kind
/// produces a `PgValue`; reading a row field produces one before it is turned
/// back into JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum PgValue {
    Null,
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    Numeric(Decimal),
    Text(String),
    Bytes(SQLBytes),
    Uuid(uuid::Uuid),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<FixedOffset>),
    Json(serde_json::Value),
    Array(Array<PgValue>),
}

impl ToSql for PgValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            PgValue::Null => Ok(IsNull::Yes),
            PgValue::Bool(v) => v.to_sql_checked(ty, out),
            PgValue::Int2(v) => v.to_sql_checked(ty, out),
            PgValue::Int4(v) => v.to_sql_checked(ty, out),
            PgValue::Int8(v) => v.to_sql_checked(ty, out),
            PgValue::Float4(v) => v.to_sql_checked(ty, out),
            PgValue::Float8(v) => v.to_sql_checked(ty, out),
            PgValue::Numeric(v) => v.to_sql_checked(ty, out),
            PgValue::Text(v) => v.to_sql_checked(ty, out),
            PgValue::Bytes(v) => v.to_sql_checked(ty, out),
            PgValue::Uuid(v) => v.to_sql_checked(ty, out),
            PgValue::Date(v) => v.to_sql_checked(ty, out),
            PgValue::Time(v) => v.to_sql_checked(ty, out),
            PgValue::Timestamp(v) => v.to_sql_checked(ty, out),
            PgValue::TimestampTz(v) => v.to_sql_checked(ty, out),
            PgValue::Json(v) => v.to_sql_checked(ty, out),
            PgValue::Array(v) => v.to_sql_checked(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        // The inner value performs the real check when it is serialized; a
        // mismatch surfaces as a clean conversion error rather than a protocol
        // violation.
        true
    }

    to_sql_checked!();
}

impl<'a> FromSql<'a> for PgValue {
    /// Decode a row field into the variant matching its declared type, so a row
    /// can be read without knowing its column types up front.
    fn from_sql(
        ty: &Type,
        raw: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        match *ty {
            Type::BOOL => bool::from_sql(ty, raw).map(PgValue::Bool),
            Type::INT2 => i16::from_sql(ty, raw).map(PgValue::Int2),
            Type::INT4 => i32::from_sql(ty, raw).map(PgValue::Int4),
            Type::INT8 => i64::from_sql(ty, raw).map(PgValue::Int8),
            Type::FLOAT4 => f32::from_sql(ty, raw).map(PgValue::Float4),
            Type::FLOAT8 => f64::from_sql(ty, raw).map(PgValue::Float8),
            Type::NUMERIC => Decimal::from_sql(ty, raw).map(PgValue::Numeric),
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
                String::from_sql(ty, raw).map(PgValue::Text)
            }
            Type::BYTEA => Vec::<u8>::from_sql(ty, raw).map(|v| PgValue::Bytes(SQLBytes::new(v))),
            Type::UUID => uuid::Uuid::from_sql(ty, raw).map(PgValue::Uuid),
            Type::DATE => NaiveDate::from_sql(ty, raw).map(PgValue::Date),
            Type::TIME => NaiveTime::from_sql(ty, raw).map(PgValue::Time),
            Type::TIMESTAMP => NaiveDateTime::from_sql(ty, raw).map(PgValue::Timestamp),
            Type::TIMESTAMPTZ => {
                DateTime::<FixedOffset>::from_sql(ty, raw).map(PgValue::TimestampTz)
            }
            Type::JSON | Type::JSONB => serde_json::Value::from_sql(ty, raw).map(PgValue::Json),
            _ => match ty.kind() {
                Kind::Array(_) => Array::<PgValue>::from_sql(ty, raw).map(PgValue::Array),
                // User-defined enums (and anything else textual) arrive as
                // their label
                _ => String::from_sql(&Type::TEXT, raw).map(PgValue::Text),
            },
        }
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(PgValue::Null)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

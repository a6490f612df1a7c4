// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::{
    any::Any,
    fmt::{Debug, Display},
};

use bytes::Bytes;
use tokio_postgres::types::{to_sql_checked, ToSql, Type};

#[macro_use]
#[cfg(test)]
mod test_util;

pub mod column;
pub mod column_type;
pub(crate) mod cte;
pub mod database;
pub(crate) mod delete;
pub mod expression_builder;
pub(crate) mod group_by;
pub(crate) mod insert;
pub(crate) mod join;
pub(crate) mod limit;
pub(crate) mod lock;
pub(crate) mod offset;
pub mod order;
pub mod pg_value;
pub(crate) mod physical_column;
pub(crate) mod physical_table;
pub mod predicate;
pub mod raw_fragment;
pub(crate) mod select;
pub mod sql_builder;
pub(crate) mod sql_operation;
pub(crate) mod sql_param_container;
pub(crate) mod table;
pub(crate) mod text_search;
pub(crate) mod update;
pub(crate) mod window;

pub use expression_builder::ExpressionBuilder;
pub use sql_builder::SQLBuilder;
pub use sql_param_container::SQLParamContainer;

/// A value that can be bound to a positional placeholder. Combines the driver's
/// `ToSql` with the ability to compare two parameters for equality (used to
/// simplify predicates and to assert on bindings in tests).
pub trait SQLParam: ToSql + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn eq(&self, other: &dyn SQLParam) -> bool;

    fn as_pg(&self) -> &(dyn ToSql + Sync);
}

impl<T: ToSql + Send + Sync + Any + PartialEq> SQLParam for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn eq(&self, other: &dyn SQLParam) -> bool {
        if let Some(other) = other.as_any().downcast_ref::<T>() {
            self == other
        } else {
            false
        }
    }

    fn as_pg(&self) -> &(dyn ToSql + Sync) {
        self
    }
}

impl PartialEq for dyn SQLParam {
    fn eq(&self, other: &Self) -> bool {
        SQLParam::eq(self, other)
    }
}

// Wrapper type for bytes::Bytes for use with BYTEA.
// Bytes does not implement ToSql.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SQLBytes(pub Bytes);

impl SQLBytes {
    pub fn new(vec: Vec<u8>) -> Self {
        Self(Bytes::from(vec))
    }
}

impl ToSql for SQLBytes {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<tokio_postgres::types::IsNull, Box<dyn std::error::Error + Sync + Send>>
    where
        Self: Sized,
    {
        (&self.0[..]).to_sql(ty, out)
    }

    fn accepts(ty: &Type) -> bool
    where
        Self: Sized,
    {
        matches!(*ty, Type::BYTEA)
    }

    to_sql_checked!();
}

impl Display for SQLBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{} bytes>", self.0.len())
    }
}

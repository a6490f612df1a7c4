// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::sql::column_type::ColumnType;
use crate::sql::database::{Database, TableId};

/// How many records a nested entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    One,
    Many,
}

/// How one output field of a query parses back into JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnShape {
    /// A catalog column; its kind drives the parse.
    Scalar(ColumnType),
    /// An expression the catalog knows nothing about (aggregate, raw
    /// selectable); the wire type drives the parse.
    Computed,
    /// A JSON-built record or list of records (joined row, lateral subquery).
    Nested(Arc<Shape>, Cardinality),
    /// A JSON-built list of scalars (a plucking subquery).
    ScalarList(ColumnType),
}

/// The ordered output description of a query: one entry per output field, keyed
/// by the field's record key. Captured at compile time and used to turn rows
/// back into records.
pub type Shape = IndexMap<String, ColumnShape>;

/// The shape of a table's full row, in column order.
pub fn table_shape(database: &Database, table_id: TableId) -> Shape {
    database
        .get_table(table_id)
        .columns
        .iter()
        .map(|column| {
            (
                column.record_key().to_string(),
                ColumnShape::Scalar(column.typ.clone()),
            )
        })
        .collect()
}

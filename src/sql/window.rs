// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::sql::database::Database;

use super::column::Column;
use super::order::OrderBy;
use super::{ExpressionBuilder, SQLBuilder};

/// A named window definition, referenced from selectables with `OVER "<name>"`.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub name: String,
    pub partition_by: Vec<Column>,
    pub order_by: Option<OrderBy>,
}

/// The WINDOW clause: one or more named definitions.
#[derive(Debug, Clone, PartialEq)]
pub struct Windows(pub Vec<Window>);

impl ExpressionBuilder for Window {
    /// Build expression of the form `"<name>" AS (PARTITION BY ... ORDER BY ...)`
    fn build(&self, database: &Database, builder: &mut SQLBuilder) {
        builder.push_identifier(&self.name);
        builder.push_str(" AS (");

        if !self.partition_by.is_empty() {
            builder.push_str("PARTITION BY ");
            builder.push_elems(database, &self.partition_by, ", ");
        }
        if let Some(order_by) = &self.order_by {
            if !self.partition_by.is_empty() {
                builder.push_space();
            }
            order_by.build(database, builder);
        }

        builder.push(')');
    }
}

impl ExpressionBuilder for Windows {
    fn build(&self, database: &Database, builder: &mut SQLBuilder) {
        builder.push_str("WINDOW ");
        builder.push_elems(database, &self.0, ", ");
    }
}

// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::sql::database::Database;

use super::{
    ExpressionBuilder, SQLBuilder, cte::WithQuery, delete::Delete, insert::Insert, select::Select,
    update::Update,
};

/// Any one complete SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum SQLOperation {
    Select(Select),
    Insert(Insert),
    Delete(Delete),
    Update(Update),
    WithQuery(WithQuery),
}

impl ExpressionBuilder for SQLOperation {
    fn build(&self, database: &Database, builder: &mut SQLBuilder) {
        match self {
            SQLOperation::Select(select) => select.build(database, builder),
            SQLOperation::Insert(insert) => insert.build(database, builder),
            SQLOperation::Delete(delete) => delete.build(database, builder),
            SQLOperation::Update(update) => update.build(database, builder),
            SQLOperation::WithQuery(with_query) => with_query.build(database, builder),
        }
    }
}

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
use super::{ExpressionBuilder, SQLBuilder};

#[derive(Debug, Clone, PartialEq)]
pub struct GroupBy(pub Vec<Column>);

impl ExpressionBuilder for GroupBy {
    /// Build expression of the form `GROUP BY <comma-separated-columns>`
    fn build(&self, database: &Database, builder: &mut SQLBuilder) {
        builder.push_str("GROUP BY ");
        builder.push_elems(database, &self.0, ", ");
    }
}

// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::sql::database::{Database, TableId};
use crate::sql::physical_column::ColumnId;
use crate::sql::select::Select;

use super::{ExpressionBuilder, SQLBuilder, column::Column};

/// Where the rows of an insert come from.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertSource {
    /// `VALUES (30, 'John'), (35, 'Jane')`. A row that does not supply one of
    /// the columns carries `Column::Default` in that position.
    Rows(Vec<Vec<Column>>),
    /// `SELECT <values> ...`, used for guarded inserts such as the insert arm
    /// of an upsert (`SELECT $1, $2 WHERE NOT EXISTS (...)`).
    Query(Box<Select>),
}

/// An insert operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    /// The table to insert into.
    pub table_id: TableId,
    /// The columns to insert into such as `(age, name)`
    pub columns: Vec<ColumnId>,
    /// The values to insert, either a literal row list or a select.
    pub source: InsertSource,
    /// The columns to return.
    pub returning: Vec<Column>,
}

impl ExpressionBuilder for Insert {
    /// Build the insert statement for the form `INSERT INTO <table> (<columns>) VALUES (<values>)
    /// RETURNING <returning-columns>`. The `RETURNING` clause is omitted if the list of columns to
    /// return is empty.
    fn build(&self, database: &Database, builder: &mut SQLBuilder) {
        builder.push_str("INSERT INTO ");
        database.get_table(self.table_id).build(database, builder);

        if self.columns.is_empty() {
            // If none of the columns have been provided, we can use DEFAULT VALUES.
            // This can happen if every column of the table has a default value.
            builder.push_str(" DEFAULT VALUES");
        } else {
            builder.push_str(" (");
            builder.without_fully_qualified_column_names(|builder| {
                builder.push_iter(self.columns.iter(), ", ", |builder, column_id| {
                    column_id.get_column(database).build(database, builder);
                });
            });
            builder.push(')');

            match &self.source {
                InsertSource::Rows(values_seq) => {
                    builder.push_str(" VALUES (");
                    builder.push_iter(values_seq.iter(), "), (", |builder, values| {
                        builder.push_elems(database, values, ", ");
                    });
                    builder.push(')');
                }
                InsertSource::Query(select) => {
                    builder.push_space();
                    select.build(database, builder);
                }
            }
        }

        if !self.returning.is_empty() {
            builder.push_str(" RETURNING ");
            builder.push_elems(database, &self.returning, ", ")
        }
    }
}

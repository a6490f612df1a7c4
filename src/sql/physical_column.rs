// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::sql::database::{Database, TableId};

use super::column_type::ColumnType;
use super::{ExpressionBuilder, SQLBuilder};

/// A column in a physical table
#[derive(PartialEq, Eq, Clone)]
pub struct PhysicalColumn {
    /// The table this column belongs to
    pub table_id: TableId,
    /// The name of the column
    pub name: String,
    /// The kind of the column
    pub typ: ColumnType,
    /// Is this column the PK of its table
    pub is_pk: bool,
    /// Does the column accept NULL
    pub is_nullable: bool,
    /// The key under which this column appears in records, when it differs
    /// from the column name
    pub api_name: Option<String>,
}

/// The derived implementation of `Debug` obscures the useful information, so
/// print just the table index and column name.
impl std::fmt::Debug for PhysicalColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format!(
            "Column: {}.{}",
            &self.table_id.arr_idx(),
            &self.name
        ))
    }
}

impl PhysicalColumn {
    pub fn get_table_name(&self, database: &Database) -> String {
        database.get_table(self.table_id).name.clone()
    }

    /// The key under which the column appears in records.
    pub fn record_key(&self) -> &str {
        self.api_name.as_deref().unwrap_or(&self.name)
    }
}

impl ExpressionBuilder for PhysicalColumn {
    fn build(&self, database: &Database, builder: &mut SQLBuilder) {
        builder.push_column(&database.get_table(self.table_id).name, &self.name)
    }
}

/// A stable reference to a column: the table's arena index plus the column's
/// position within the table.
#[derive(Debug, Clone, PartialEq, Eq, Copy, Hash)]
pub struct ColumnId {
    pub table_id: TableId,
    pub column_index: usize,
}

impl ColumnId {
    pub fn new(table_id: TableId, column_index: usize) -> ColumnId {
        ColumnId {
            table_id,
            column_index,
        }
    }

    pub fn get_column<'a>(&self, database: &'a Database) -> &'a PhysicalColumn {
        &database.get_table(self.table_id).columns[self.column_index]
    }
}

impl PartialOrd for ColumnId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ColumnId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        fn tupled(a: &ColumnId) -> (usize, usize) {
            (a.table_id.arr_idx(), a.column_index)
        }
        tupled(self).cmp(&tupled(other))
    }
}

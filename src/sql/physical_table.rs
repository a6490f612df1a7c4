// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::sql::database::Database;

use super::ExpressionBuilder;
use super::physical_column::PhysicalColumn;

/// A physical table in the database such as "users" or "posts".
#[derive(PartialEq, Eq)]
pub struct PhysicalTable {
    /// The name of the table.
    pub name: String,
    /// The columns of the table.
    pub columns: Vec<PhysicalColumn>,
}

/// The derived implementation of `Debug` is quite verbose, so we implement it manually
/// to print the table name only.
impl std::fmt::Debug for PhysicalTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Table: ")?;
        f.write_str(&self.name)
    }
}

impl PhysicalTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Find a column by its record key (the `api_name` when set, the column
    /// name otherwise).
    pub fn column_index_by_key(&self, key: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.record_key() == key)
    }

    pub fn get_pk_column_index(&self) -> Option<usize> {
        self.columns.iter().position(|c| c.is_pk)
    }

    pub fn get_pk_physical_column(&self) -> Option<&PhysicalColumn> {
        self.columns.iter().find(|column| column.is_pk)
    }
}

impl ExpressionBuilder for PhysicalTable {
    /// Build a table reference for the `<table>`.
    fn build(&self, _database: &Database, builder: &mut crate::sql::SQLBuilder) {
        builder.push_identifier(&self.name);
    }
}

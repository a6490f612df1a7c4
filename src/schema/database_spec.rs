// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::sql::database::Database;
use crate::sql::physical_column::PhysicalColumn;
use crate::sql::physical_table::PhysicalTable;

use super::table_spec::TableSpec;

pub struct DatabaseSpec {
    tables: Vec<TableSpec>,
}

impl DatabaseSpec {
    pub fn new(tables: Vec<TableSpec>) -> Self {
        Self { tables }
    }

    pub fn to_database(self) -> Database {
        let mut database = Database::default();

        // Step 1: Create tables (without columns)
        let tables: Vec<_> = self
            .tables
            .into_iter()
            .map(|table| {
                let table_id = database.insert_table(PhysicalTable {
                    name: table.name,
                    columns: vec![],
                });
                (table_id, table.columns)
            })
            .collect();

        // Step 2: Add columns to tables
        for (table_id, column_specs) in tables.into_iter() {
            let columns = column_specs
                .into_iter()
                .map(|column_spec| PhysicalColumn {
                    table_id,
                    name: column_spec.name,
                    typ: column_spec.typ,
                    is_pk: column_spec.is_pk,
                    is_nullable: column_spec.is_nullable,
                    api_name: column_spec.api_name,
                })
                .collect();

            database.get_table_mut(table_id).columns = columns;
        }

        database
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::column_type::{ColumnType, IntBits};

    #[test]
    fn builds_a_catalog_from_specs() {
        let database = DatabaseSpec::new(vec![
            TableSpec::parse(
                "users",
                &[
                    ("id", "bigserial primary key"),
                    ("name", "text not null"),
                    ("age", "int"),
                ],
            )
            .unwrap(),
            TableSpec::parse("posts", &[("id", "bigserial primary key")]).unwrap(),
        ])
        .to_database();

        let users = database.get_table_id("users").unwrap();
        assert_eq!(database.get_table(users).columns.len(), 3);

        let pk = database.get_pk_column_id(users).unwrap();
        assert_eq!(pk.get_column(&database).name, "id");

        let age = database.get_column_id(users, "age").unwrap();
        assert_eq!(
            age.get_column(&database).typ,
            ColumnType::Int { bits: IntBits::_32 }
        );

        assert!(database.get_table_id("missing").is_none());
        assert!(database.get_column_id(users, "missing").is_none());
    }
}

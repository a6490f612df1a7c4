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

use super::{ExpressionBuilder, SQLBuilder, column::Column, predicate::ConcretePredicate};

/// An update operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    /// The table to update.
    pub table_id: TableId,
    /// The predicate to filter rows to update.
    pub predicate: ConcretePredicate,
    /// The columns to update and their values.
    pub column_values: Vec<(ColumnId, Column)>,
    /// Raw SET expressions appended after the column/value pairs, such as
    /// `"views" = "views" + 1`.
    pub raw_sets: Vec<Column>,
    /// The columns to return.
    pub returning: Vec<Column>,
}

impl ExpressionBuilder for Update {
    /// Build the update statement for the form `UPDATE <table> SET <column = value, ...> WHERE
    /// <predicate> RETURNING <returning-columns>`. The `WHERE` is omitted if the predicate is
    /// `True` and `RETURNING` is omitted if the list of columns to return is empty.
    fn build(&self, database: &Database, builder: &mut SQLBuilder) {
        builder.push_str("UPDATE ");
        database.get_table(self.table_id).build(database, builder);

        builder.push_str(" SET ");
        builder.push_iter(
            self.column_values.iter(),
            ", ",
            |builder, (column_id, value)| {
                builder.without_fully_qualified_column_names(|builder| {
                    column_id.get_column(database).build(database, builder);
                });

                builder.push_str(" = ");

                value.build(database, builder);
            },
        );
        if !self.raw_sets.is_empty() {
            if !self.column_values.is_empty() {
                builder.push_str(", ");
            }
            builder.push_elems(database, &self.raw_sets, ", ");
        }

        if self.predicate != ConcretePredicate::True {
            builder.push_str(" WHERE ");
            self.predicate.build(database, builder);
        }

        if !self.returning.is_empty() {
            builder.push_str(" RETURNING ");
            builder.push_elems(database, &self.returning, ", ");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DatabaseSpec, TableSpec};
    use crate::sql::SQLParamContainer;
    use crate::sql::pg_value::PgValue;
    use crate::sql::raw_fragment::RawFragment;

    fn people_database() -> Database {
        DatabaseSpec::new(vec![
            TableSpec::parse(
                "people",
                &[
                    ("id", "bigserial primary key"),
                    ("name", "text"),
                    ("age", "int"),
                ],
            )
            .unwrap(),
        ])
        .to_database()
    }

    #[test]
    fn predicated_update_with_returning() {
        let database = people_database();
        let people = database.get_table_id("people").unwrap();
        let id = database.get_column_id(people, "id").unwrap();
        let age = database.get_column_id(people, "age").unwrap();

        let update = Update {
            table_id: people,
            predicate: ConcretePredicate::Eq(
                Column::physical(id, None),
                Column::Param(SQLParamContainer::from(1_i64)),
            ),
            column_values: vec![(age, Column::Param(SQLParamContainer::from(31_i32)))],
            raw_sets: vec![],
            returning: vec![Column::Star(None)],
        };

        assert_binding!(
            update.to_sql(&database),
            r#"UPDATE "people" SET "age" = $1 WHERE "people"."id" = $2 RETURNING *"#,
            PgValue::Int4(31),
            PgValue::Int8(1)
        );
    }

    #[test]
    fn raw_set_expressions_follow_column_values() {
        let database = people_database();
        let people = database.get_table_id("people").unwrap();
        let id = database.get_column_id(people, "id").unwrap();
        let name = database.get_column_id(people, "name").unwrap();

        let update = Update {
            table_id: people,
            predicate: ConcretePredicate::Eq(
                Column::physical(id, None),
                Column::Param(SQLParamContainer::from(1_i64)),
            ),
            column_values: vec![(name, Column::Param(SQLParamContainer::from("Sam")))],
            raw_sets: vec![Column::Raw(
                RawFragment::new(r#""age" = "age" + $1"#, vec![SQLParamContainer::from(1_i32)])
                    .unwrap(),
            )],
            returning: vec![],
        };

        assert_binding!(
            update.to_sql(&database),
            r#"UPDATE "people" SET "name" = $1, "age" = "age" + $2 WHERE "people"."id" = $3"#,
            PgValue::Text("Sam".to_string()),
            PgValue::Int4(1),
            PgValue::Int8(1)
        );
    }
}

// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::sql::database::{Database, TableId};

use super::{ExpressionBuilder, SQLBuilder, column::Column, predicate::ConcretePredicate};

/// A delete operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    /// The table to delete from.
    pub table_id: TableId,
    /// The predicate to filter rows by.
    pub predicate: ConcretePredicate,
    /// The columns to return.
    pub returning: Vec<Column>,
}

impl ExpressionBuilder for Delete {
    /// Build a delete operation for the `DELETE FROM <table> WHERE <predicate> RETURNING <returning>`.
    /// The `WHERE` clause is omitted if the predicate is `true` and the `RETURNING` clause is omitted
    /// if the list of columns to return is empty.
    fn build(&self, database: &Database, builder: &mut SQLBuilder) {
        builder.push_str("DELETE FROM ");
        database.get_table(self.table_id).build(database, builder);

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

    #[test]
    fn predicated_delete() {
        let database = DatabaseSpec::new(vec![
            TableSpec::parse(
                "people",
                &[("id", "bigserial primary key"), ("name", "text")],
            )
            .unwrap(),
        ])
        .to_database();
        let people = database.get_table_id("people").unwrap();
        let id = database.get_column_id(people, "id").unwrap();

        let delete = Delete {
            table_id: people,
            predicate: ConcretePredicate::Eq(
                Column::physical(id, None),
                Column::Param(SQLParamContainer::from(1_i64)),
            ),
            returning: vec![Column::Star(None)],
        };

        assert_binding!(
            delete.to_sql(&database),
            r#"DELETE FROM "people" WHERE "people"."id" = $1 RETURNING *"#,
            PgValue::Int8(1)
        );
    }
}

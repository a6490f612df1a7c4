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

#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum Ordering {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum NullsOrder {
    First,
    Last,
}

/// One ORDER BY key: the expression, the direction, and an optional NULLS
/// placement. A raw fragment carries no direction of its own; the fragment
/// text supplies it.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByElement(pub Column, pub Option<Ordering>, pub Option<NullsOrder>);

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy(pub Vec<OrderByElement>);

impl OrderByElement {
    pub fn new(column: Column, ordering: Ordering, nulls: Option<NullsOrder>) -> Self {
        Self(column, Some(ordering), nulls)
    }

    /// An element emitted exactly as its expression renders, with no
    /// direction keyword appended.
    pub fn raw(column: Column) -> Self {
        Self(column, None, None)
    }
}

impl ExpressionBuilder for OrderByElement {
    fn build(&self, database: &Database, builder: &mut SQLBuilder) {
        self.0.build(database, builder);

        match self.1 {
            Some(Ordering::Asc) => builder.push_str(" ASC"),
            Some(Ordering::Desc) => builder.push_str(" DESC"),
            None => {}
        }

        match self.2 {
            Some(NullsOrder::First) => builder.push_str(" NULLS FIRST"),
            Some(NullsOrder::Last) => builder.push_str(" NULLS LAST"),
            None => {}
        }
    }
}

impl ExpressionBuilder for OrderBy {
    fn build(&self, database: &Database, builder: &mut SQLBuilder) {
        builder.push_str("ORDER BY ");
        builder.push_elems(database, &self.0, ", ");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DatabaseSpec, TableSpec};

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
    fn single() {
        let database = people_database();
        let table_id = database.get_table_id("people").unwrap();
        let age_col = database.get_column_id(table_id, "age").unwrap();

        let order_by = OrderBy(vec![OrderByElement::new(
            Column::physical(age_col, None),
            Ordering::Desc,
            None,
        )]);

        assert_binding!(
            order_by.to_sql(&database),
            r#"ORDER BY "people"."age" DESC"#
        );
    }

    #[test]
    fn multiple() {
        let database = people_database();
        let table_id = database.get_table_id("people").unwrap();
        let name_col = database.get_column_id(table_id, "name").unwrap();
        let age_col = database.get_column_id(table_id, "age").unwrap();

        {
            let order_by = OrderBy(vec![
                OrderByElement::new(Column::physical(name_col, None), Ordering::Asc, None),
                OrderByElement::new(Column::physical(age_col, None), Ordering::Desc, None),
            ]);

            assert_binding!(
                order_by.to_sql(&database),
                r#"ORDER BY "people"."name" ASC, "people"."age" DESC"#
            );
        }

        // Reverse the order and it should be reflected in the statement
        {
            let order_by = OrderBy(vec![
                OrderByElement::new(Column::physical(age_col, None), Ordering::Desc, None),
                OrderByElement::new(Column::physical(name_col, None), Ordering::Asc, None),
            ]);

            assert_binding!(
                order_by.to_sql(&database),
                r#"ORDER BY "people"."age" DESC, "people"."name" ASC"#
            );
        }
    }

    #[test]
    fn nulls_placement() {
        let database = people_database();
        let table_id = database.get_table_id("people").unwrap();
        let age_col = database.get_column_id(table_id, "age").unwrap();

        let order_by = OrderBy(vec![OrderByElement::new(
            Column::physical(age_col, None),
            Ordering::Asc,
            Some(NullsOrder::Last),
        )]);

        assert_binding!(
            order_by.to_sql(&database),
            r#"ORDER BY "people"."age" ASC NULLS LAST"#
        );
    }
}

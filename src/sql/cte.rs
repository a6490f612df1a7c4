// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::sql::database::Database;

use super::{ExpressionBuilder, SQLBuilder, select::Select, sql_operation::SQLOperation};

/// A query with common table expressions of the form `WITH <expressions> <select>`.
#[derive(Debug, Clone, PartialEq)]
pub struct WithQuery {
    /// The "WITH" expressions
    pub expressions: Vec<CteExpression>,
    /// The select statement
    pub select: Select,
}

/// A common table expression of the form `<name> AS (<operation>)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CteExpression {
    /// The name of the expression
    pub name: String,
    /// The SQL operation to be bound to the name
    pub operation: SQLOperation,
}

impl ExpressionBuilder for WithQuery {
    /// Build a CTE for the `WITH <expressions> <select>` syntax.
    fn build(&self, database: &Database, builder: &mut SQLBuilder) {
        builder.push_str("WITH ");
        builder.push_elems(database, &self.expressions, ", ");
        builder.push_space();
        self.select.build(database, builder);
    }
}

impl ExpressionBuilder for CteExpression {
    /// Build a CTE expression for the `<name> AS (<operation>)` syntax.
    fn build(&self, database: &Database, builder: &mut SQLBuilder) {
        builder.push_identifier(&self.name);
        builder.push_str(" AS (");
        self.operation.build(database, builder);
        builder.push(')');
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DatabaseSpec, TableSpec};
    use crate::sql::SQLParamContainer;
    use crate::sql::column::Column;
    use crate::sql::pg_value::PgValue;
    use crate::sql::predicate::ConcretePredicate;
    use crate::sql::table::Table;

    #[test]
    fn cte_over_a_select() {
        let database = DatabaseSpec::new(vec![
            TableSpec::parse(
                "orders",
                &[("id", "bigserial primary key"), ("total", "int")],
            )
            .unwrap(),
        ])
        .to_database();
        let orders = database.get_table_id("orders").unwrap();
        let total = database.get_column_id(orders, "total").unwrap();

        let big_orders = SQLOperation::Select(Select {
            predicate: ConcretePredicate::Gt(
                Column::physical(total, None),
                Column::Param(SQLParamContainer::from(100_i32)),
            ),
            ..Select::new(
                Table::physical(orders, None),
                vec![(Column::Star(Some("orders".to_string())), None)],
            )
        });

        let with_query = WithQuery {
            expressions: vec![CteExpression {
                name: "big_orders".to_string(),
                operation: big_orders,
            }],
            select: Select::new(
                Table::Named("big_orders".to_string()),
                vec![(Column::Star(None), None)],
            ),
        };

        assert_binding!(
            with_query.to_sql(&database),
            r#"WITH "big_orders" AS (SELECT "orders".* FROM "orders" WHERE "orders"."total" > $1) SELECT * FROM "big_orders""#,
            PgValue::Int4(100)
        );
    }

    #[test]
    fn cte_over_a_delete() {
        let database = DatabaseSpec::new(vec![
            TableSpec::parse(
                "sessions",
                &[("id", "bigserial primary key"), ("expired", "boolean")],
            )
            .unwrap(),
        ])
        .to_database();
        let sessions = database.get_table_id("sessions").unwrap();
        let expired = database.get_column_id(sessions, "expired").unwrap();

        let delete = SQLOperation::Delete(crate::sql::delete::Delete {
            table_id: sessions,
            predicate: ConcretePredicate::Eq(
                Column::physical(expired, None),
                Column::Param(SQLParamContainer::from(true)),
            ),
            returning: vec![Column::Star(None)],
        });

        let with_query = WithQuery {
            expressions: vec![CteExpression {
                name: "sessions".to_string(),
                operation: delete,
            }],
            select: Select::new(
                Table::Named("sessions".to_string()),
                vec![(Column::Star(Some("sessions".to_string())), None)],
            ),
        };

        assert_binding!(
            with_query.to_sql(&database),
            r#"WITH "sessions" AS (DELETE FROM "sessions" WHERE "sessions"."expired" = $1 RETURNING *) SELECT "sessions".* FROM "sessions""#,
            PgValue::Bool(true)
        );
    }
}

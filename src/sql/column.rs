// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::sql::database::Database;
use crate::sql::physical_column::ColumnId;

use super::raw_fragment::RawFragment;
use super::select::Select;
use super::{ExpressionBuilder, SQLBuilder, SQLParamContainer};

/// A column-like concept covering any usage where a database table column could be used. For
/// example, in a predicate you can say `first_name = 'Sam'` or `first_name = last_name`. Here,
/// first_name, last_name, and `'Sam'` all serve as columns from our perspective. The variants
/// encode the exact semantics of each kind.
///
/// Essentially represents `<column>` in a `select <column>, <column> from <table>` or `<column> <>
/// <value>` in a predicate or `<column> = <value>` in an `update <table> set <column> = <value>`,
/// etc.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// An actual physical column in a table. When the table appears under an alias (self joins,
    /// subquery wrapping), the alias qualifies the column instead of the table name.
    Physical {
        column_id: ColumnId,
        table_alias: Option<String>,
    },
    /// A column the catalog does not know: an output of a joined subquery, a raw selectable, or
    /// a bare output key in a set-operation ORDER BY.
    Reference {
        table_alias: Option<String>,
        name: String,
    },
    /// A literal value such as a string or number e.g. 'Sam'. This will be mapped to a placeholder
    /// to avoid SQL injection.
    Param(SQLParamContainer),
    /// A parenthesized list of parameters, one placeholder per element, as the right side of `IN`.
    ParamTuple(Vec<SQLParamContainer>),
    /// A sub-select query.
    SubSelect(Box<Select>),
    /// A constant string as in `select 'Concert', id from "concerts"`. The value is chosen by the
    /// compiler, never taken from user input.
    Constant(String),
    /// All columns of a table. If the table is `None` should translate to `*`, else `"table_name".*`
    Star(Option<String>),
    /// A null value
    Null,
    /// The DEFAULT keyword, filling a column the caller did not provide in a multi-row insert
    Default,
    /// A function applied to columns. For example, `count(*)` or `lower(first_name)`.
    Function {
        function_name: String,
        args: Vec<Column>,
    },
    /// A JSON array aggregate over the inner expression, with `'[]'` standing in when no rows
    /// aggregate: `COALESCE(json_agg(<inner>), '[]')`.
    JsonAgg(Box<Column>),
    /// Base64 text of a bytea column: `translate(encode(<inner>, 'base64'), E'\n', '')`.
    /// `encode` inserts a newline every 76 characters, which `translate` strips back out.
    BlobBase64(Box<Column>),
    /// A cast: `<inner>::<type>`. The type is compiler-chosen (`text`, an enum name, `regconfig`).
    Cast {
        column: Box<Column>,
        typ: String,
    },
    /// A verbatim SQL fragment with its own parameters
    Raw(RawFragment),
}

impl Column {
    pub fn physical(column_id: ColumnId, table_alias: Option<String>) -> Self {
        Self::Physical {
            column_id,
            table_alias,
        }
    }

    pub fn function(function_name: impl Into<String>, args: Vec<Column>) -> Self {
        Self::Function {
            function_name: function_name.into(),
            args,
        }
    }

    /// `count(*)`
    pub fn count_star() -> Self {
        Self::function("count", vec![Column::Star(None)])
    }

    /// `row_to_json("alias".*)`
    pub fn row_to_json(alias: impl Into<String>) -> Self {
        Self::function("row_to_json", vec![Column::Star(Some(alias.into()))])
    }
}

impl ExpressionBuilder for Column {
    fn build(&self, database: &Database, builder: &mut SQLBuilder) {
        match self {
            Column::Physical {
                column_id,
                table_alias,
            } => {
                let column = column_id.get_column(database);
                match table_alias {
                    Some(table_alias) => builder.push_column(table_alias, &column.name),
                    None => column.build(database, builder),
                }
            }
            Column::Reference { table_alias, name } => match table_alias {
                Some(table_alias) => builder.push_column(table_alias, name),
                None => builder.push_identifier(name),
            },
            Column::Param(value) => builder.push_param(value.param()),
            Column::ParamTuple(values) => {
                builder.push('(');
                builder.push_iter(values.iter(), ", ", |builder, value| {
                    builder.push_param(value.param());
                });
                builder.push(')');
            }
            Column::SubSelect(select) => {
                builder.push('(');
                select.build(database, builder);
                builder.push(')');
            }
            Column::Constant(value) => {
                builder.push('\'');
                builder.push_str(value);
                builder.push('\'');
            }
            Column::Star(table_name) => {
                if let Some(table_name) = table_name {
                    builder.push_identifier(table_name);
                    builder.push('.');
                }
                builder.push('*');
            }
            Column::Null => builder.push_str("NULL"),
            Column::Default => builder.push_str("DEFAULT"),
            Column::Function {
                function_name,
                args,
            } => {
                builder.push_str(function_name);
                builder.push('(');
                builder.push_elems(database, args, ", ");
                builder.push(')');
            }
            Column::JsonAgg(inner) => {
                builder.push_str("COALESCE(json_agg(");
                inner.build(database, builder);
                builder.push_str("), '[]')");
            }
            Column::BlobBase64(inner) => {
                builder.push_str("translate(encode(");
                inner.build(database, builder);
                builder.push_str(", 'base64'), E'\\n', '')");
            }
            Column::Cast { column, typ } => {
                column.build(database, builder);
                builder.push_str("::");
                builder.push_str(typ);
            }
            Column::Raw(fragment) => fragment.build(database, builder),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DatabaseSpec, TableSpec};
    use crate::sql::pg_value::PgValue;

    fn users_database() -> (Database, ColumnId) {
        let database = DatabaseSpec::new(vec![
            TableSpec::parse(
                "users",
                &[("id", "bigserial primary key"), ("name", "text not null")],
            )
            .unwrap(),
        ])
        .to_database();
        let users = database.get_table_id("users").unwrap();
        let name = database.get_column_id(users, "name").unwrap();
        (database, name)
    }

    #[test]
    fn physical_columns_qualify_with_alias_or_table() {
        let (database, name) = users_database();

        assert_binding!(
            Column::physical(name, None).to_sql(&database),
            r#""users"."name""#
        );
        assert_binding!(
            Column::physical(name, Some("u2".to_string())).to_sql(&database),
            r#""u2"."name""#
        );
    }

    #[test]
    fn param_tuples_take_one_placeholder_per_element() {
        let (database, _) = users_database();
        let column = Column::ParamTuple(vec![
            SQLParamContainer::from(1_i64),
            SQLParamContainer::from(2_i64),
            SQLParamContainer::from(3_i64),
        ]);
        assert_binding!(
            column.to_sql(&database),
            "($1, $2, $3)",
            PgValue::Int8(1),
            PgValue::Int8(2),
            PgValue::Int8(3)
        );
    }

    #[test]
    fn functions_and_wraps() {
        let (database, name) = users_database();

        assert_binding!(Column::count_star().to_sql(&database), "count(*)");
        assert_binding!(
            Column::function("lower", vec![Column::physical(name, None)]).to_sql(&database),
            r#"lower("users"."name")"#
        );
        assert_binding!(
            Column::JsonAgg(Box::new(Column::row_to_json("t"))).to_sql(&database),
            r#"COALESCE(json_agg(row_to_json("t".*)), '[]')"#
        );
        assert_binding!(
            Column::Cast {
                column: Box::new(Column::physical(name, None)),
                typ: "text".to_string(),
            }
            .to_sql(&database),
            r#""users"."name"::text"#
        );
    }
}

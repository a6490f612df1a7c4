// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::sql::database::{Database, TableId};

use super::select::Select;
use super::{ExpressionBuilder, SQLBuilder};

/// A table-like concept that can be used in place of `SELECT FROM <table-query> ...`.
#[derive(Debug, Clone, PartialEq)]
pub enum Table {
    /// A physical table such as `users`.
    Physical {
        table_id: TableId,
        alias: Option<String>,
    },
    /// A named result set introduced by a WITH clause. The catalog knows nothing about its
    /// columns, so it renders as a bare identifier.
    Named(String),
    /// A sub-select such as `(SELECT * FROM users) AS "u"`.
    SubSelect {
        select: Box<Select>,
        /// The sub-select must be aliased when used in a FROM clause
        alias: String,
    },
}

impl Table {
    pub fn physical(table_id: TableId, alias: Option<String>) -> Self {
        Table::Physical { table_id, alias }
    }
}

impl ExpressionBuilder for Table {
    /// Build the table into a SQL string.
    fn build(&self, database: &Database, builder: &mut SQLBuilder) {
        match self {
            Table::Physical { table_id, alias } => {
                let physical_table = database.get_table(*table_id);
                physical_table.build(database, builder);

                if let Some(alias) = alias {
                    // If the table name is the same as the alias, we don't need to alias it.
                    // This avoids unnecessary aliasing like `SELECT * FROM concerts AS concerts`
                    if &physical_table.name != alias {
                        builder.push_str(" AS ");
                        builder.push_identifier(alias);
                    }
                }
            }
            Table::Named(name) => builder.push_identifier(name),
            Table::SubSelect { select, alias } => {
                builder.push('(');
                select.build(database, builder);
                builder.push(')');
                builder.push_str(" AS ");
                builder.push_identifier(alias);
            }
        }
    }
}

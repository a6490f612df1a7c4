// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::sql::database::Database;

use super::{
    ExpressionBuilder, SQLBuilder, column::Column, group_by::GroupBy, join::Join, limit::Limit,
    lock::Lock, offset::Offset, order::OrderBy, predicate::ConcretePredicate, table::Table,
    window::Windows,
};

/// How one select combines with the next member of a set operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOpKind {
    Union,
    UnionAll,
    Intersect,
    IntersectAll,
    Except,
    ExceptAll,
}

impl SetOpKind {
    fn keyword(&self) -> &'static str {
        match self {
            SetOpKind::Union => "UNION",
            SetOpKind::UnionAll => "UNION ALL",
            SetOpKind::Intersect => "INTERSECT",
            SetOpKind::IntersectAll => "INTERSECT ALL",
            SetOpKind::Except => "EXCEPT",
            SetOpKind::ExceptAll => "EXCEPT ALL",
        }
    }
}

/// An additional member of a set operation, combined with the preceding members
/// by the given kind.
#[derive(Debug, Clone, PartialEq)]
pub struct SetOp {
    pub kind: SetOpKind,
    pub select: Box<Select>,
}

/// A select statement
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    /// The table to select from. `None` skips the FROM clause entirely, as in
    /// `SELECT $1, $2 WHERE NOT EXISTS (...)`.
    pub table: Option<Table>,
    /// The columns to select, each with an optional output alias
    pub columns: Vec<(Column, Option<String>)>,
    /// The joins following the FROM item, in the order they were added
    pub joins: Vec<Join>,
    /// The predicate to filter the rows
    pub predicate: ConcretePredicate,
    /// The group by clause
    pub group_by: Option<GroupBy>,
    /// The predicate over grouped rows
    pub having: Option<ConcretePredicate>,
    /// Named window definitions
    pub windows: Option<Windows>,
    /// Further members of a set operation. When non-empty, every member
    /// (including this select) is parenthesized and the trailing clauses
    /// (order by, limit, offset) apply to the combined result.
    pub set_ops: Vec<SetOp>,
    /// The order by clause
    pub order_by: Option<OrderBy>,
    /// The limit clause
    pub limit: Option<Limit>,
    /// The offset clause
    pub offset: Option<Offset>,
    /// The row-locking clause
    pub lock: Option<Lock>,
}

impl Select {
    /// A bare `SELECT <columns> FROM <table>` to be filled in clause by clause.
    pub fn new(table: Table, columns: Vec<(Column, Option<String>)>) -> Self {
        Select {
            table: Some(table),
            columns,
            joins: vec![],
            predicate: ConcretePredicate::True,
            group_by: None,
            having: None,
            windows: None,
            set_ops: vec![],
            order_by: None,
            limit: None,
            offset: None,
            lock: None,
        }
    }
}

impl ExpressionBuilder for Select {
    fn build(&self, database: &Database, builder: &mut SQLBuilder) {
        // Everything up to (and including) the WINDOW clause belongs to this
        // member alone; the trailing clauses apply to the whole statement.
        let build_member = |builder: &mut SQLBuilder| {
            builder.push_str("SELECT ");
            builder.push_iter(self.columns.iter(), ", ", |builder, (column, alias)| {
                column.build(database, builder);
                if let Some(alias) = alias {
                    builder.push_str(" AS ");
                    builder.push_identifier(alias);
                }
            });

            if let Some(table) = &self.table {
                builder.push_str(" FROM ");
                table.build(database, builder);
            }

            for join in &self.joins {
                builder.push_space();
                join.build(database, builder);
            }

            // Avoid correct, but inelegant "WHERE TRUE" clause
            if self.predicate != ConcretePredicate::True {
                builder.push_str(" WHERE ");
                self.predicate.build(database, builder);
            }
            if let Some(group_by) = &self.group_by {
                builder.push_space();
                group_by.build(database, builder);
            }
            if let Some(having) = &self.having {
                builder.push_str(" HAVING ");
                having.build(database, builder);
            }
            if let Some(windows) = &self.windows {
                builder.push_space();
                windows.build(database, builder);
            }
        };

        if self.set_ops.is_empty() {
            build_member(builder);
        } else {
            // Parenthesize every member so a member's own clauses never leak
            // into the combined statement.
            builder.push('(');
            build_member(builder);
            builder.push(')');
            for set_op in &self.set_ops {
                builder.push_space();
                builder.push_str(set_op.kind.keyword());
                builder.push_str(" (");
                set_op.select.build(database, builder);
                builder.push(')');
            }
        }

        if let Some(order_by) = &self.order_by {
            builder.push_space();
            order_by.build(database, builder);
        }
        if let Some(limit) = &self.limit {
            builder.push_space();
            limit.build(database, builder);
        }
        if let Some(offset) = &self.offset {
            builder.push_space();
            offset.build(database, builder);
        }
        if let Some(lock) = &self.lock {
            builder.push_space();
            lock.build(database, builder);
        }
    }
}

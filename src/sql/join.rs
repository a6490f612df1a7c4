// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::sql::database::Database;

use super::predicate::ConcretePredicate;
use super::table::Table;
use super::{ExpressionBuilder, SQLBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    /// A lateral sub-select join. Always rendered as `LEFT JOIN LATERAL ... ON TRUE`,
    /// so a lateral row that produces nothing does not drop the outer row.
    Lateral,
}

impl JoinKind {
    fn keyword(&self) -> &'static str {
        match self {
            JoinKind::Inner => "JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL JOIN",
            JoinKind::Lateral => "LEFT JOIN LATERAL",
        }
    }
}

/// One join following the FROM item: `<kind> <table> ON <predicate>`. A
/// statement's joins render in the order they were added.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: Table,
    pub predicate: ConcretePredicate,
}

impl Join {
    pub fn new(kind: JoinKind, table: Table, predicate: ConcretePredicate) -> Self {
        Join {
            kind,
            table,
            predicate,
        }
    }
}

impl ExpressionBuilder for Join {
    /// Build expression of the form `<kind> <table> ON <predicate>`.
    fn build(&self, database: &Database, builder: &mut SQLBuilder) {
        builder.push_str(self.kind.keyword());
        builder.push_space();
        self.table.build(database, builder);
        builder.push_str(" ON ");
        self.predicate.build(database, builder);
    }
}

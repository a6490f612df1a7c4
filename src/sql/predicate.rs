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
use super::raw_fragment::RawFragment;
use super::select::Select;
use super::{ExpressionBuilder, SQLBuilder};

/// Case sensitivity for string predicates.
#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum CaseSensitivity {
    Sensitive,
    Insensitive,
}

#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum NumericComparator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl NumericComparator {
    fn op(&self) -> &'static str {
        match self {
            NumericComparator::Eq => "=",
            NumericComparator::Neq => "<>",
            NumericComparator::Lt => "<",
            NumericComparator::Lte => "<=",
            NumericComparator::Gt => ">",
            NumericComparator::Gte => ">=",
        }
    }
}

/// A predicate is a boolean expression that can be used in a WHERE clause.
#[derive(Debug, PartialEq, Clone)]
pub enum Predicate<C>
where
    C: PartialEq + ParamEquality,
{
    True,
    False,
    Eq(C, C),
    Neq(C, C),
    Lt(C, C),
    Lte(C, C),
    Gt(C, C),
    Gte(C, C),
    In(C, C),
    Between(C, C, C),
    /// A row-value membership test: `(a, b) IN ((1, 2), (3, 4))`
    TupleIn(Vec<C>, Vec<Vec<C>>),

    // string predicates
    StringLike(C, C, CaseSensitivity),
    StringContains(C, C, CaseSensitivity),
    StringStartsWith(C, C, CaseSensitivity),
    StringEndsWith(C, C, CaseSensitivity),

    // containment operators, shared by jsonb and arrays
    Contains(C, C),
    ContainedBy(C, C),
    MatchKey(C, C),
    MatchAnyKey(C, C),
    MatchAllKeys(C, C),
    Overlaps(C, C),

    /// A comparison against a value extracted from a json document:
    /// `<column> #>> <path> <op> <value>`
    PathMatch(C, C, NumericComparator, C),

    /// A full-text match: `<tsvector> @@ <tsquery>`
    TextMatch(C, C),

    Exists(Box<Select>),
    Raw(RawFragment),

    // Prefer Predicate::and(), which simplifies the clause
    And(Box<Predicate<C>>, Box<Predicate<C>>),
    // Prefer Predicate::or(), which simplifies the clause
    Or(Box<Predicate<C>>, Box<Predicate<C>>),
    // Prefer Predicate::not(), which simplifies the clause
    Not(Box<Predicate<C>>),
}

pub type ConcretePredicate = Predicate<Column>;

impl<C> Predicate<C>
where
    C: PartialEq + ParamEquality,
{
    /// Compare two columns and reduce to a simpler predicate if possible.
    pub fn eq(lhs: C, rhs: C) -> Predicate<C> {
        if lhs == rhs {
            Predicate::True
        } else {
            // For literal columns, we can check for Predicate::False directly
            match lhs.param_eq(&rhs) {
                Some(false) => Predicate::False, // We don't need to check for `Some(true)`, since the above `lhs == rhs` check would have taken care of that
                _ => Predicate::Eq(lhs, rhs),
            }
        }
    }

    /// Compare two columns and reduce to a simpler predicate if possible
    pub fn neq(lhs: C, rhs: C) -> Predicate<C> {
        !Self::eq(lhs, rhs)
    }

    /// Logical and of two predicates, reducing to a simpler predicate if possible.
    pub fn and(lhs: Predicate<C>, rhs: Predicate<C>) -> Predicate<C> {
        match (lhs, rhs) {
            (Predicate::False, _) | (_, Predicate::False) => Predicate::False,
            (Predicate::True, rhs) => rhs,
            (lhs, Predicate::True) => lhs,
            (lhs, rhs) if lhs == rhs => lhs,
            (lhs, rhs) => Predicate::And(Box::new(lhs), Box::new(rhs)),
        }
    }

    /// Logical or of two predicates, reducing to a simpler predicate if possible.
    pub fn or(lhs: Predicate<C>, rhs: Predicate<C>) -> Predicate<C> {
        match (lhs, rhs) {
            (Predicate::True, _) | (_, Predicate::True) => Predicate::True,
            (Predicate::False, rhs) => rhs,
            (lhs, Predicate::False) => lhs,
            (lhs, rhs) if lhs == rhs => lhs,
            (lhs, rhs) => Predicate::Or(Box::new(lhs), Box::new(rhs)),
        }
    }
}

impl<C> From<bool> for Predicate<C>
where
    C: PartialEq + ParamEquality,
{
    fn from(b: bool) -> Predicate<C> {
        if b { Predicate::True } else { Predicate::False }
    }
}

impl<C> std::ops::Not for Predicate<C>
where
    C: PartialEq + ParamEquality,
{
    type Output = Predicate<C>;

    fn not(self) -> Self::Output {
        match self {
            // Reduced to a simpler form when possible, else fall back to Predicate::Not
            Predicate::True => Predicate::False,
            Predicate::False => Predicate::True,
            Predicate::Eq(lhs, rhs) => Predicate::Neq(lhs, rhs),
            Predicate::Neq(lhs, rhs) => Predicate::Eq(lhs, rhs),
            Predicate::Lt(lhs, rhs) => Predicate::Gte(lhs, rhs),
            Predicate::Lte(lhs, rhs) => Predicate::Gt(lhs, rhs),
            Predicate::Gt(lhs, rhs) => Predicate::Lte(lhs, rhs),
            Predicate::Gte(lhs, rhs) => Predicate::Lt(lhs, rhs),
            predicate => Predicate::Not(Box::new(predicate)),
        }
    }
}

/// Compare two parameters so that we can reduce a predicate to a boolean before passing it to
/// the database. With a simpler form, we may be able to skip passing it to the database completely.
/// For example, `Predicate::Eq(Column::Param(1), Column::Param(1))` can be reduced to true.
pub trait ParamEquality {
    /// Returns `None` if one of the columns is not a parameter, otherwise returns `Some(true)` if
    /// the parameters are equal, and `Some(false)` if they are not.
    fn param_eq(&self, other: &Self) -> Option<bool>;
}

impl ParamEquality for Column {
    fn param_eq(&self, other: &Self) -> Option<bool> {
        match (self, other) {
            (Column::Param(v1), Column::Param(v2)) => Some(v1 == v2),
            _ => None,
        }
    }
}

impl ExpressionBuilder for ConcretePredicate {
    /// Build a predicate into a SQL string.
    fn build(&self, database: &Database, builder: &mut SQLBuilder) {
        match &self {
            ConcretePredicate::True => builder.push_str("TRUE"),
            ConcretePredicate::False => builder.push_str("FALSE"),
            ConcretePredicate::Eq(column1, column2) => {
                if column2 == &Column::Null {
                    column1.build(database, builder);
                    builder.push_str(" IS NULL");
                } else {
                    relational_combine(column1, column2, "=", database, builder)
                }
            }
            ConcretePredicate::Neq(column1, column2) => {
                if column2 == &Column::Null {
                    column1.build(database, builder);
                    builder.push_str(" IS NOT NULL");
                } else {
                    relational_combine(column1, column2, "<>", database, builder)
                }
            }
            ConcretePredicate::Lt(column1, column2) => {
                relational_combine(column1, column2, "<", database, builder)
            }
            ConcretePredicate::Lte(column1, column2) => {
                relational_combine(column1, column2, "<=", database, builder)
            }
            ConcretePredicate::Gt(column1, column2) => {
                relational_combine(column1, column2, ">", database, builder)
            }
            ConcretePredicate::Gte(column1, column2) => {
                relational_combine(column1, column2, ">=", database, builder)
            }
            ConcretePredicate::In(column1, column2) => {
                relational_combine(column1, column2, "IN", database, builder)
            }
            ConcretePredicate::Between(column, low, high) => {
                column.build(database, builder);
                builder.push_str(" BETWEEN ");
                low.build(database, builder);
                builder.push_str(" AND ");
                high.build(database, builder);
            }
            ConcretePredicate::TupleIn(columns, rows) => {
                builder.push('(');
                builder.push_elems(database, columns, ", ");
                builder.push_str(") IN (");
                builder.push_iter(rows.iter(), ", ", |builder, row| {
                    builder.push('(');
                    builder.push_elems(database, row, ", ");
                    builder.push(')');
                });
                builder.push(')');
            }

            ConcretePredicate::StringLike(column1, column2, case_sensitivity) => {
                relational_combine(
                    column1,
                    column2,
                    like_op(*case_sensitivity),
                    database,
                    builder,
                )
            }
            // we use the postgres concat operator (||) in order to handle both literals and column references
            ConcretePredicate::StringContains(column1, column2, case_sensitivity) => {
                column1.build(database, builder);
                builder.push_space();
                builder.push_str(like_op(*case_sensitivity));
                builder.push_str(" '%' || ");
                column2.build(database, builder);
                builder.push_str(" || '%'");
            }
            ConcretePredicate::StringStartsWith(column1, column2, case_sensitivity) => {
                column1.build(database, builder);
                builder.push_space();
                builder.push_str(like_op(*case_sensitivity));
                builder.push_space();
                column2.build(database, builder);
                builder.push_str(" || '%'");
            }
            ConcretePredicate::StringEndsWith(column1, column2, case_sensitivity) => {
                column1.build(database, builder);
                builder.push_space();
                builder.push_str(like_op(*case_sensitivity));
                builder.push_str(" '%' || ");
                column2.build(database, builder);
            }

            ConcretePredicate::Contains(column1, column2) => {
                relational_combine(column1, column2, "@>", database, builder)
            }
            ConcretePredicate::ContainedBy(column1, column2) => {
                relational_combine(column1, column2, "<@", database, builder)
            }
            ConcretePredicate::MatchKey(column1, column2) => {
                relational_combine(column1, column2, "?", database, builder)
            }
            ConcretePredicate::MatchAnyKey(column1, column2) => {
                relational_combine(column1, column2, "?|", database, builder)
            }
            ConcretePredicate::MatchAllKeys(column1, column2) => {
                relational_combine(column1, column2, "?&", database, builder)
            }
            ConcretePredicate::Overlaps(column1, column2) => {
                relational_combine(column1, column2, "&&", database, builder)
            }

            ConcretePredicate::PathMatch(column, path, comparator, value) => {
                column.build(database, builder);
                builder.push_str("#>>");
                path.build(database, builder);
                builder.push_space();
                builder.push_str(comparator.op());
                builder.push_space();
                value.build(database, builder);
            }

            ConcretePredicate::TextMatch(column1, column2) => {
                relational_combine(column1, column2, "@@", database, builder)
            }

            ConcretePredicate::Exists(select) => {
                builder.push_str("EXISTS (");
                select.build(database, builder);
                builder.push(')');
            }
            ConcretePredicate::Raw(fragment) => fragment.build(database, builder),

            ConcretePredicate::And(predicate1, predicate2) => {
                logical_combine(predicate1, predicate2, "AND", database, builder)
            }
            ConcretePredicate::Or(predicate1, predicate2) => {
                logical_combine(predicate1, predicate2, "OR", database, builder)
            }
            // `NOT EXISTS` reads as one keyword; everything else negates with
            // an explicit grouping
            ConcretePredicate::Not(predicate) => match predicate.as_ref() {
                ConcretePredicate::Exists(select) => {
                    builder.push_str("NOT EXISTS (");
                    select.build(database, builder);
                    builder.push(')');
                }
                predicate => {
                    builder.push_str("NOT(");
                    predicate.build(database, builder);
                    builder.push(')');
                }
            },
        }
    }
}

fn like_op(case_sensitivity: CaseSensitivity) -> &'static str {
    if case_sensitivity == CaseSensitivity::Insensitive {
        "ILIKE"
    } else {
        "LIKE"
    }
}

/// Combine two expressions with a relational operator.
fn relational_combine<E1: ExpressionBuilder, E2: ExpressionBuilder>(
    left: &E1,
    right: &E2,
    op: &'static str,
    database: &Database,
    builder: &mut SQLBuilder,
) {
    left.build(database, builder);
    builder.push_space();
    builder.push_str(op);
    builder.push_space();
    right.build(database, builder);
}

/// Combine two expressions with a logical binary operator.
fn logical_combine<E1: ExpressionBuilder, E2: ExpressionBuilder>(
    left: &E1,
    right: &E2,
    op: &'static str,
    database: &Database,
    builder: &mut SQLBuilder,
) {
    builder.push('(');
    left.build(database, builder);
    builder.push_space();
    builder.push_str(op);
    builder.push_space();
    right.build(database, builder);
    builder.push(')');
}

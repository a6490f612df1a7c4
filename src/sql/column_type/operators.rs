// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use super::ColumnType;

/// A comparison operator accepted in a condition map. Which operators a given
/// column accepts depends on its [`ColumnType`]; see [`ColumnType::operators`].
///
/// A few keys are reused across kinds with kind-specific meanings: `contains`
/// is a substring match on strings but `@>` on arrays, and `containedBy` is
/// `<@` on arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equals,
    Not,
    In,
    NotIn,
    Lt,
    Lte,
    Gt,
    Gte,
    Between,
    Like,
    ILike,
    Contains,
    IContains,
    StartsWith,
    IStartsWith,
    EndsWith,
    IEndsWith,
    JsonPath,
    JsonSupersetOf,
    JsonSubsetOf,
    HasKey,
    HasAnyKey,
    HasAllKeys,
    Has,
    ContainedBy,
    Overlaps,
    And,
    Or,
}

impl Operator {
    /// The key under which the operator appears in a condition map.
    pub fn key(&self) -> &'static str {
        match self {
            Operator::Equals => "equals",
            Operator::Not => "not",
            Operator::In => "in",
            Operator::NotIn => "notIn",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Between => "between",
            Operator::Like => "like",
            Operator::ILike => "iLike",
            Operator::Contains => "contains",
            Operator::IContains => "iContains",
            Operator::StartsWith => "startsWith",
            Operator::IStartsWith => "iStartsWith",
            Operator::EndsWith => "endsWith",
            Operator::IEndsWith => "iEndsWith",
            Operator::JsonPath => "jsonPath",
            Operator::JsonSupersetOf => "jsonSupersetOf",
            Operator::JsonSubsetOf => "jsonSubsetOf",
            Operator::HasKey => "hasKey",
            Operator::HasAnyKey => "hasAnyKey",
            Operator::HasAllKeys => "hasAllKeys",
            Operator::Has => "has",
            Operator::ContainedBy => "containedBy",
            Operator::Overlaps => "overlaps",
            Operator::And => "and",
            Operator::Or => "or",
        }
    }

    pub fn from_key(key: &str) -> Option<Operator> {
        Some(match key {
            "equals" => Operator::Equals,
            "not" => Operator::Not,
            "in" => Operator::In,
            "notIn" => Operator::NotIn,
            "lt" => Operator::Lt,
            "lte" => Operator::Lte,
            "gt" => Operator::Gt,
            "gte" => Operator::Gte,
            "between" => Operator::Between,
            "like" => Operator::Like,
            "iLike" => Operator::ILike,
            "contains" => Operator::Contains,
            "iContains" => Operator::IContains,
            "startsWith" => Operator::StartsWith,
            "iStartsWith" => Operator::IStartsWith,
            "endsWith" => Operator::EndsWith,
            "iEndsWith" => Operator::IEndsWith,
            "jsonPath" => Operator::JsonPath,
            "jsonSupersetOf" => Operator::JsonSupersetOf,
            "jsonSubsetOf" => Operator::JsonSubsetOf,
            "hasKey" => Operator::HasKey,
            "hasAnyKey" => Operator::HasAnyKey,
            "hasAllKeys" => Operator::HasAllKeys,
            "has" => Operator::Has,
            "containedBy" => Operator::ContainedBy,
            "overlaps" => Operator::Overlaps,
            "and" => Operator::And,
            "or" => Operator::Or,
            _ => return None,
        })
    }
}

const COMPARABLE: [Operator; 9] = [
    Operator::Equals,
    Operator::Not,
    Operator::In,
    Operator::NotIn,
    Operator::Lt,
    Operator::Lte,
    Operator::Gt,
    Operator::Gte,
    Operator::Between,
];

const STRING: [Operator; 17] = [
    Operator::Equals,
    Operator::Not,
    Operator::In,
    Operator::NotIn,
    Operator::Lt,
    Operator::Lte,
    Operator::Gt,
    Operator::Gte,
    Operator::Between,
    Operator::Like,
    Operator::ILike,
    Operator::Contains,
    Operator::IContains,
    Operator::StartsWith,
    Operator::IStartsWith,
    Operator::EndsWith,
    Operator::IEndsWith,
];

const EQUATABLE: [Operator; 4] = [
    Operator::Equals,
    Operator::Not,
    Operator::In,
    Operator::NotIn,
];

const BOOLEAN: [Operator; 4] = [
    Operator::Equals,
    Operator::Not,
    Operator::And,
    Operator::Or,
];

const JSON: [Operator; 10] = [
    Operator::Equals,
    Operator::Not,
    Operator::In,
    Operator::NotIn,
    Operator::JsonPath,
    Operator::JsonSupersetOf,
    Operator::JsonSubsetOf,
    Operator::HasKey,
    Operator::HasAnyKey,
    Operator::HasAllKeys,
];

const BLOB: [Operator; 2] = [Operator::Equals, Operator::Not];

const ARRAY: [Operator; 8] = [
    Operator::Equals,
    Operator::Not,
    Operator::In,
    Operator::NotIn,
    Operator::Has,
    Operator::Contains,
    Operator::ContainedBy,
    Operator::Overlaps,
];

impl ColumnType {
    /// The operators a column of this kind accepts in a condition map.
    pub fn operators(&self) -> &'static [Operator] {
        match self {
            ColumnType::Int { .. }
            | ColumnType::Float { .. }
            | ColumnType::Numeric { .. }
            | ColumnType::Timestamp { .. }
            | ColumnType::Date
            | ColumnType::Time { .. } => &COMPARABLE,
            ColumnType::String { .. } => &STRING,
            ColumnType::Boolean => &BOOLEAN,
            ColumnType::Json => &JSON,
            ColumnType::Blob => &BLOB,
            ColumnType::Uuid | ColumnType::Enum { .. } => &EQUATABLE,
            ColumnType::Array { .. } => &ARRAY,
        }
    }

    pub fn supports(&self, operator: Operator) -> bool {
        self.operators().contains(&operator)
    }
}

/// Operators accepted for a column the catalog knows nothing about (a raw
/// selectable or a joined subquery output). Kind-specific operators such as
/// the json and array families stay rejected.
pub static GENERIC_OPERATORS: [Operator; 17] = STRING;

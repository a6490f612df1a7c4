// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use serde_json::Value as JsonValue;

use crate::query_error::QueryError;
use crate::sql::column_type::Operator;
use crate::sql::raw_fragment::RawFragment;

use super::query_data::QueryData;

/// A comparison against a single column: the operator plus its right side.
#[derive(Debug, Clone)]
pub struct Comparison {
    pub operator: Operator,
    pub operand: Operand,
}

/// The right side of a comparison.
#[derive(Debug, Clone)]
pub enum Operand {
    /// A literal JSON value, encoded against the column's kind at compile time.
    Value(JsonValue),
    /// Another column, referenced by name or `alias.name`.
    Column(String),
    /// A sub-query, as in `"id" IN (SELECT ...)`.
    Subquery(Box<QueryData>),
    /// A verbatim SQL fragment with its own parameters.
    Raw(RawFragment),
}

/// A column-vs-column condition, as used in join `ON` clauses and correlated
/// `EXISTS` filters. The operator is the SQL comparison as written (`=`, `<>`,
/// `<`, ...).
#[derive(Debug, Clone)]
pub struct OnCond {
    pub left: String,
    pub op: String,
    pub right: String,
}

/// What a correlated `EXISTS` filter probes.
#[derive(Debug, Clone)]
pub enum ExistsTarget {
    Table(String),
    Query(Box<QueryData>),
}

/// One normalized WHERE/HAVING entry. Entries pushed through the `filter`
/// family are conjoined; each group pushed through `or_where` is itself a
/// conjunction and the groups are disjoined.
#[derive(Debug, Clone)]
pub enum WhereItem {
    /// `column <op> operand`
    Cond { column: String, cmp: Comparison },
    /// `NOT (...)`
    Not(Box<WhereItem>),
    /// Nested disjunction: each group is a conjunction, groups are OR'd.
    Or(Vec<Vec<WhereItem>>),
    /// `(a, b) IN ((1, 'x'), (2, 'y'))`; a single column drops the tuple
    /// parentheses. An empty value list compiles to `FALSE`.
    In {
        columns: Vec<String>,
        values: Vec<Vec<JsonValue>>,
    },
    /// `[NOT] EXISTS (SELECT 1 FROM <target> WHERE <on>)`, correlated against
    /// the enclosing query.
    Exists {
        target: ExistsTarget,
        on: Vec<OnCond>,
        not: bool,
    },
    /// A verbatim SQL condition with its own parameters.
    Raw(RawFragment),
    /// A column-vs-column comparison such as `"profile"."userId" = "user"."id"`.
    On(OnCond),
}

/// The SQL comparison operators accepted in `ON`-style conditions.
pub const SQL_COMPARISONS: [&str; 7] = ["=", "!=", "<>", "<", "<=", ">", ">="];

/// Normalize a condition map into WHERE items: each entry is either
/// `column: value` (equality) or `column: {operator: operand, ...}`.
pub fn from_condition_map(conditions: &JsonValue) -> Result<Vec<WhereItem>, QueryError> {
    let map = conditions.as_object().ok_or_else(|| {
        QueryError::Validation(format!(
            "Expected a condition map, got {conditions}"
        ))
    })?;

    let mut items = Vec::with_capacity(map.len());
    for (column, value) in map {
        column_conditions(column, value, &mut items)?;
    }
    Ok(items)
}

/// Normalize one `column: value-or-operator-map` entry. A map value is an
/// operator map (JSON-object equality must be written `{equals: {...}}`); any
/// other value is an equality test, with `null` meaning `IS NULL`.
fn column_conditions(
    column: &str,
    value: &JsonValue,
    items: &mut Vec<WhereItem>,
) -> Result<(), QueryError> {
    match value {
        JsonValue::Object(operators) => {
            for (key, operand) in operators {
                items.push(operator_entry(column, key, operand)?);
            }
            Ok(())
        }
        direct => {
            items.push(WhereItem::Cond {
                column: column.to_string(),
                cmp: Comparison {
                    operator: Operator::Equals,
                    operand: Operand::Value(direct.clone()),
                },
            });
            Ok(())
        }
    }
}

fn operator_entry(column: &str, key: &str, operand: &JsonValue) -> Result<WhereItem, QueryError> {
    let operator = Operator::from_key(key)
        .ok_or_else(|| QueryError::Validation(format!("Unknown operator '{key}'")))?;

    match operator {
        // `{and: [...]}`, `{or: [...]}`: nested operator maps on the same
        // column. `and` flattens into the ambient conjunction, `or` becomes a
        // nested disjunction.
        Operator::And | Operator::Or => {
            let alternatives = operand.as_array().ok_or_else(|| {
                QueryError::Validation(format!(
                    "'{key}' on column '{column}' takes an array of operator maps"
                ))
            })?;
            let mut groups = Vec::with_capacity(alternatives.len());
            for alternative in alternatives {
                let mut group = Vec::new();
                column_conditions(column, alternative, &mut group)?;
                groups.push(group);
            }
            if operator == Operator::And {
                // A conjunction nested inside a conjunction: a single group
                Ok(WhereItem::Or(vec![
                    groups.into_iter().flatten().collect::<Vec<_>>(),
                ]))
            } else {
                Ok(WhereItem::Or(groups))
            }
        }

        Operator::In | Operator::NotIn => {
            // Arrays get per-value placeholders; anything else (notably a
            // sub-query pushed through the dedicated builder method) stays an
            // operand.
            if !operand.is_array() {
                return Err(QueryError::Validation(format!(
                    "'{key}' on column '{column}' takes an array of values"
                )));
            }
            Ok(cond(column, operator, operand.clone()))
        }

        Operator::Between => {
            match operand.as_array() {
                Some(bounds) if bounds.len() == 2 => Ok(cond(column, operator, operand.clone())),
                _ => Err(QueryError::Validation(format!(
                    "'between' on column '{column}' takes a two-element array"
                ))),
            }
        }

        Operator::HasKey => match operand {
            JsonValue::String(_) => Ok(cond(column, operator, operand.clone())),
            _ => Err(QueryError::Validation(format!(
                "'hasKey' on column '{column}' takes a string key"
            ))),
        },

        Operator::HasAnyKey | Operator::HasAllKeys => {
            let keys = operand.as_array().ok_or_else(|| {
                QueryError::Validation(format!(
                    "'{key}' on column '{column}' takes an array of string keys"
                ))
            })?;
            if keys.iter().any(|k| !k.is_string()) {
                return Err(QueryError::Validation(format!(
                    "'{key}' on column '{column}' takes an array of string keys"
                )));
            }
            Ok(cond(column, operator, operand.clone()))
        }

        Operator::JsonPath => {
            let spec_ok = operand
                .as_object()
                .and_then(|o| o.get("path"))
                .and_then(|p| p.as_array())
                .map(|path| !path.is_empty() && path.iter().all(|p| p.is_string()))
                .unwrap_or(false);
            if !spec_ok {
                return Err(QueryError::Validation(format!(
                    "'jsonPath' on column '{column}' takes {{path: [keys...], op?, value?}}"
                )));
            }
            Ok(cond(column, operator, operand.clone()))
        }

        _ => Ok(cond(column, operator, operand.clone())),
    }
}

fn cond(column: &str, operator: Operator, operand: JsonValue) -> WhereItem {
    WhereItem::Cond {
        column: column.to_string(),
        cmp: Comparison {
            operator,
            operand: Operand::Value(operand),
        },
    }
}

/// Normalize the `(left, op, right)` form used by joins, `where_on`, and
/// `where_exists`.
pub fn on_condition(left: &str, op: &str, right: &str) -> Result<OnCond, QueryError> {
    if !SQL_COMPARISONS.contains(&op) {
        return Err(QueryError::Validation(format!(
            "Unknown comparison '{op}'; expected one of {SQL_COMPARISONS:?}"
        )));
    }
    Ok(OnCond {
        left: left.to_string(),
        op: op.to_string(),
        right: right.to_string(),
    })
}

/// Normalize a `where_in` call: `columns` and each row of `values` must have
/// the same width. A single column accepts a flat value array.
pub fn in_item(columns: &[&str], values: &JsonValue) -> Result<WhereItem, QueryError> {
    if columns.is_empty() {
        return Err(QueryError::Validation(
            "where_in requires at least one column".into(),
        ));
    }
    let rows = values.as_array().ok_or_else(|| {
        QueryError::Validation(format!("where_in takes an array of values, got {values}"))
    })?;

    let width = columns.len();
    let rows: Vec<Vec<JsonValue>> = rows
        .iter()
        .map(|row| {
            if width == 1 && !row.is_array() {
                return Ok(vec![row.clone()]);
            }
            let tuple = row.as_array().ok_or_else(|| {
                QueryError::Validation(format!(
                    "where_in over {width} columns takes rows of {width} values"
                ))
            })?;
            if tuple.len() != width {
                return Err(QueryError::Validation(format!(
                    "where_in over {width} columns takes rows of {width} values, got {}",
                    tuple.len()
                )));
            }
            Ok(tuple.clone())
        })
        .collect::<Result<_, QueryError>>()?;

    Ok(WhereItem::In {
        columns: columns.iter().map(|c| c.to_string()).collect(),
        values: rows,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn direct_values_normalize_to_equality() {
        let items = from_condition_map(&json!({"name": "Sam", "age": 30})).unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|item| matches!(
            item,
            WhereItem::Cond {
                cmp: Comparison {
                    operator: Operator::Equals,
                    ..
                },
                ..
            }
        )));
    }

    #[test]
    fn operator_maps_fan_out_per_key() {
        let items = from_condition_map(&json!({"age": {"gte": 21, "lt": 65}})).unwrap();
        let operators: Vec<_> = items
            .iter()
            .map(|item| match item {
                WhereItem::Cond { cmp, .. } => cmp.operator,
                _ => panic!("expected a condition"),
            })
            .collect();
        assert!(operators.contains(&Operator::Gte));
        assert!(operators.contains(&Operator::Lt));
    }

    #[test]
    fn unknown_operator_keys_are_rejected() {
        let err = from_condition_map(&json!({"age": {"gten": 21}})).unwrap_err();
        assert!(matches!(err, QueryError::Validation(msg) if msg.contains("gten")));
    }

    #[test]
    fn between_requires_two_bounds() {
        assert!(from_condition_map(&json!({"age": {"between": [18, 65]}})).is_ok());
        let err = from_condition_map(&json!({"age": {"between": [18]}})).unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));
    }

    #[test]
    fn nested_or_builds_groups() {
        let items = from_condition_map(&json!({"age": {"or": [{"lt": 13}, {"gte": 65}]}})).unwrap();
        match &items[0] {
            WhereItem::Or(groups) => {
                assert_eq!(groups.len(), 2);
                assert_eq!(groups[0].len(), 1);
            }
            other => panic!("expected an Or group, got {other:?}"),
        }
    }

    #[test]
    fn single_column_where_in_accepts_flat_values() {
        let item = in_item(&["id"], &json!([1, 2, 3])).unwrap();
        match item {
            WhereItem::In { columns, values } => {
                assert_eq!(columns, vec!["id"]);
                assert_eq!(values, vec![vec![json!(1)], vec![json!(2)], vec![json!(3)]]);
            }
            other => panic!("expected In, got {other:?}"),
        }
    }

    #[test]
    fn tuple_where_in_checks_row_width() {
        assert!(in_item(&["a", "b"], &json!([[1, "x"], [2, "y"]])).is_ok());
        let err = in_item(&["a", "b"], &json!([[1]])).unwrap_err();
        assert!(matches!(err, QueryError::Validation(_)));
    }

    #[test]
    fn on_conditions_accept_only_sql_comparisons() {
        assert!(on_condition("profile.userId", "=", "user.id").is_ok());
        assert!(on_condition("a", "like", "b").is_err());
    }
}

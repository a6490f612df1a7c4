// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Lowers the builder's normalized filter items into [`ConcretePredicate`]s,
//! encoding JSON operands into typed wire parameters along the way.

use serde_json::Value as JsonValue;

use crate::query::filter::{Comparison, ExistsTarget, OnCond, Operand, WhereItem};
use crate::query::join::{Resolved, Selectables};
use crate::query::query_data::{QueryData, SearchConfig};
use crate::query_error::QueryError;
use crate::sql::column::Column;
use crate::sql::column_type::encode::{infer_param, to_param};
use crate::sql::column_type::{ColumnType, Operator};
use crate::sql::database::Database;
use crate::sql::predicate::{CaseSensitivity, ConcretePredicate, NumericComparator};
use crate::sql::raw_fragment::RawFragment;
use crate::sql::select::Select;
use crate::sql::sql_param_container::SQLParamContainer;
use crate::sql::table::Table;
use crate::sql::text_search::{ts_headline, ts_query, ts_rank, ts_vector, TsQueryKind};

use super::select_transformer;

/// How a condition's column name resolves: WHERE names follow the catalog,
/// HAVING names may also refer to output aliases such as aggregates.
#[derive(Clone, Copy)]
enum Resolution {
    Where,
    Having,
}

/// The complete WHERE predicate of a query: applied scopes, `filter`
/// conditions, `or_where` alternatives, and the text-search match, conjoined.
pub(crate) fn where_predicate(
    data: &QueryData,
    database: &Database,
) -> Result<ConcretePredicate, QueryError> {
    let selectables = Selectables::new(data, database);
    let mut predicate = ConcretePredicate::True;

    for items in data.active_scopes.values() {
        predicate = ConcretePredicate::and(predicate, conjunction(items, &selectables, database)?);
    }
    predicate = ConcretePredicate::and(predicate, conjunction(&data.and, &selectables, database)?);

    if !data.or.is_empty() {
        let mut alternatives = ConcretePredicate::False;
        for group in &data.or {
            alternatives =
                ConcretePredicate::or(alternatives, conjunction(group, &selectables, database)?);
        }
        predicate = ConcretePredicate::and(predicate, alternatives);
    }

    if let Some(search) = &data.search {
        predicate = ConcretePredicate::and(predicate, search_match(search, &selectables)?);
    }

    Ok(predicate)
}

pub(crate) fn conjunction(
    items: &[WhereItem],
    selectables: &Selectables<'_>,
    database: &Database,
) -> Result<ConcretePredicate, QueryError> {
    items_predicate(items, selectables, database, Resolution::Where)
}

pub(crate) fn having_conjunction(
    items: &[WhereItem],
    selectables: &Selectables<'_>,
    database: &Database,
) -> Result<ConcretePredicate, QueryError> {
    items_predicate(items, selectables, database, Resolution::Having)
}

fn items_predicate(
    items: &[WhereItem],
    selectables: &Selectables<'_>,
    database: &Database,
    resolution: Resolution,
) -> Result<ConcretePredicate, QueryError> {
    let mut predicate = ConcretePredicate::True;
    for item in items {
        predicate = ConcretePredicate::and(
            predicate,
            item_predicate(item, selectables, database, resolution)?,
        );
    }
    Ok(predicate)
}

fn item_predicate(
    item: &WhereItem,
    selectables: &Selectables<'_>,
    database: &Database,
    resolution: Resolution,
) -> Result<ConcretePredicate, QueryError> {
    match item {
        WhereItem::Cond { column, cmp } => {
            let resolved = match resolution {
                Resolution::Where => selectables.resolve(column)?,
                Resolution::Having => selectables.resolve_having(column)?,
            };
            comparison_predicate(resolved, cmp, selectables, database)
        }
        WhereItem::Not(inner) => Ok(ConcretePredicate::Not(Box::new(item_predicate(
            inner,
            selectables,
            database,
            resolution,
        )?))),
        WhereItem::Or(groups) => {
            let mut predicate = ConcretePredicate::False;
            for group in groups {
                predicate = ConcretePredicate::or(
                    predicate,
                    items_predicate(group, selectables, database, resolution)?,
                );
            }
            Ok(predicate)
        }
        WhereItem::In { columns, values } => in_predicate(columns, values, selectables),
        WhereItem::Exists { target, on, not } => {
            exists_predicate(target, on, *not, selectables, database)
        }
        WhereItem::Raw(fragment) => Ok(ConcretePredicate::Raw(fragment.clone())),
        WhereItem::On(cond) => {
            let left = selectables.resolve(&cond.left)?.column;
            let right = selectables.resolve(&cond.right)?.column;
            sql_comparison(left, &cond.op, right)
        }
    }
}

fn comparison_predicate(
    resolved: Resolved,
    cmp: &Comparison,
    selectables: &Selectables<'_>,
    database: &Database,
) -> Result<ConcretePredicate, QueryError> {
    let Resolved {
        column: left, typ, ..
    } = resolved;

    match cmp.operator {
        Operator::Equals => Ok(ConcretePredicate::Eq(
            left,
            operand_column(&cmp.operand, &typ, selectables, database)?,
        )),
        Operator::Not => Ok(ConcretePredicate::Neq(
            left,
            operand_column(&cmp.operand, &typ, selectables, database)?,
        )),
        Operator::Lt => Ok(ConcretePredicate::Lt(
            left,
            operand_column(&cmp.operand, &typ, selectables, database)?,
        )),
        Operator::Lte => Ok(ConcretePredicate::Lte(
            left,
            operand_column(&cmp.operand, &typ, selectables, database)?,
        )),
        Operator::Gt => Ok(ConcretePredicate::Gt(
            left,
            operand_column(&cmp.operand, &typ, selectables, database)?,
        )),
        Operator::Gte => Ok(ConcretePredicate::Gte(
            left,
            operand_column(&cmp.operand, &typ, selectables, database)?,
        )),

        Operator::In | Operator::NotIn => {
            let inner = match &cmp.operand {
                Operand::Value(JsonValue::Array(values)) => {
                    if values.is_empty() {
                        // `IN ()` is not SQL; an empty list can match nothing
                        return Ok(match cmp.operator {
                            Operator::In => ConcretePredicate::False,
                            _ => ConcretePredicate::True,
                        });
                    }
                    let params = values
                        .iter()
                        .map(|value| param_container(&typ, value))
                        .collect::<Result<Vec<_>, _>>()?;
                    ConcretePredicate::In(left, Column::ParamTuple(params))
                }
                other => ConcretePredicate::In(
                    left,
                    operand_column(other, &typ, selectables, database)?,
                ),
            };
            Ok(match cmp.operator {
                Operator::In => inner,
                _ => ConcretePredicate::Not(Box::new(inner)),
            })
        }

        Operator::Between => match &cmp.operand {
            Operand::Value(JsonValue::Array(bounds)) if bounds.len() == 2 => {
                Ok(ConcretePredicate::Between(
                    left,
                    encoded_param(&typ, &bounds[0])?,
                    encoded_param(&typ, &bounds[1])?,
                ))
            }
            other => Err(QueryError::Validation(format!(
                "'between' takes a two-element array, got {other:?}"
            ))),
        },

        Operator::Like => Ok(ConcretePredicate::StringLike(
            left,
            operand_column(&cmp.operand, &typ, selectables, database)?,
            CaseSensitivity::Sensitive,
        )),
        Operator::ILike => Ok(ConcretePredicate::StringLike(
            left,
            operand_column(&cmp.operand, &typ, selectables, database)?,
            CaseSensitivity::Insensitive,
        )),
        Operator::Contains => {
            let right = operand_column(&cmp.operand, &typ, selectables, database)?;
            // `contains` is `@>` on arrays and a substring match elsewhere
            Ok(match typ {
                Some(ColumnType::Array { .. }) => ConcretePredicate::Contains(left, right),
                _ => ConcretePredicate::StringContains(left, right, CaseSensitivity::Sensitive),
            })
        }
        Operator::IContains => Ok(ConcretePredicate::StringContains(
            left,
            operand_column(&cmp.operand, &typ, selectables, database)?,
            CaseSensitivity::Insensitive,
        )),
        Operator::StartsWith => Ok(ConcretePredicate::StringStartsWith(
            left,
            operand_column(&cmp.operand, &typ, selectables, database)?,
            CaseSensitivity::Sensitive,
        )),
        Operator::IStartsWith => Ok(ConcretePredicate::StringStartsWith(
            left,
            operand_column(&cmp.operand, &typ, selectables, database)?,
            CaseSensitivity::Insensitive,
        )),
        Operator::EndsWith => Ok(ConcretePredicate::StringEndsWith(
            left,
            operand_column(&cmp.operand, &typ, selectables, database)?,
            CaseSensitivity::Sensitive,
        )),
        Operator::IEndsWith => Ok(ConcretePredicate::StringEndsWith(
            left,
            operand_column(&cmp.operand, &typ, selectables, database)?,
            CaseSensitivity::Insensitive,
        )),

        Operator::JsonSupersetOf => Ok(ConcretePredicate::Contains(
            left,
            operand_column(&cmp.operand, &typ, selectables, database)?,
        )),
        Operator::JsonSubsetOf => Ok(ConcretePredicate::ContainedBy(
            left,
            operand_column(&cmp.operand, &typ, selectables, database)?,
        )),
        Operator::HasKey => Ok(ConcretePredicate::MatchKey(
            left,
            operand_column(&cmp.operand, &None, selectables, database)?,
        )),
        Operator::HasAnyKey => Ok(ConcretePredicate::MatchAnyKey(
            left,
            string_array_param(&cmp.operand)?,
        )),
        Operator::HasAllKeys => Ok(ConcretePredicate::MatchAllKeys(
            left,
            string_array_param(&cmp.operand)?,
        )),
        Operator::JsonPath => json_path_predicate(left, &cmp.operand),

        Operator::Has => {
            // `$n = ANY("column")`, with the parameter typed as the element
            let element_type = match &typ {
                Some(ColumnType::Array { typ }) => Some((**typ).clone()),
                _ => None,
            };
            let element = match &cmp.operand {
                Operand::Value(value) => Column::Param(param_container(&element_type, value)?),
                other => operand_column(other, &element_type, selectables, database)?,
            };
            Ok(ConcretePredicate::Eq(
                element,
                Column::function("ANY", vec![left]),
            ))
        }
        Operator::ContainedBy => Ok(ConcretePredicate::ContainedBy(
            left,
            operand_column(&cmp.operand, &typ, selectables, database)?,
        )),
        Operator::Overlaps => Ok(ConcretePredicate::Overlaps(
            left,
            operand_column(&cmp.operand, &typ, selectables, database)?,
        )),

        // `and`/`or` unfold into groups when the condition map is parsed
        Operator::And | Operator::Or => Err(QueryError::Validation(format!(
            "'{}' cannot appear as a comparison",
            cmp.operator.key()
        ))),
    }
}

/// Encode a comparison's right side as a renderable column.
fn operand_column(
    operand: &Operand,
    typ: &Option<ColumnType>,
    selectables: &Selectables<'_>,
    database: &Database,
) -> Result<Column, QueryError> {
    match operand {
        Operand::Value(JsonValue::Null) => Ok(Column::Null),
        Operand::Value(value) => encoded_param(typ, value),
        Operand::Column(name) => Ok(selectables.resolve(name)?.column),
        Operand::Subquery(sub) => Ok(Column::SubSelect(Box::new(
            select_transformer::to_select(sub, database)?,
        ))),
        Operand::Raw(fragment) => Ok(Column::Raw(fragment.clone())),
    }
}

/// A single placeholder for a JSON value, typed by the column when the
/// catalog knows it. Enum values compare through an explicit cast so the text
/// parameter matches the enum type.
fn encoded_param(typ: &Option<ColumnType>, value: &JsonValue) -> Result<Column, QueryError> {
    match typ {
        Some(enum_type @ ColumnType::Enum { name }) => Ok(Column::Cast {
            column: Box::new(Column::Param(to_param(enum_type, value)?)),
            typ: name.clone(),
        }),
        _ => Ok(Column::Param(param_container(typ, value)?)),
    }
}

fn param_container(
    typ: &Option<ColumnType>,
    value: &JsonValue,
) -> Result<SQLParamContainer, QueryError> {
    match typ {
        Some(typ) => to_param(typ, value),
        None => Ok(infer_param(value)),
    }
}

/// A `text[]` parameter for the json key-set operators (`?|`, `?&`).
fn string_array_param(operand: &Operand) -> Result<Column, QueryError> {
    let keys_type = ColumnType::Array {
        typ: Box::new(ColumnType::String { max_length: None }),
    };
    match operand {
        Operand::Value(value) => Ok(Column::Param(to_param(&keys_type, value)?)),
        other => Err(QueryError::Validation(format!(
            "key-set operators take an array of string keys, got {other:?}"
        ))),
    }
}

/// `column #>> <path> <op> <value>`: extract at a path as text and compare.
fn json_path_predicate(left: Column, operand: &Operand) -> Result<ConcretePredicate, QueryError> {
    let Operand::Value(JsonValue::Object(spec)) = operand else {
        return Err(QueryError::Validation(
            "'jsonPath' takes {path: [keys...], op?, value?}".to_string(),
        ));
    };

    let path = spec
        .get("path")
        .and_then(|p| p.as_array())
        .ok_or_else(|| QueryError::Validation("'jsonPath' requires a path array".to_string()))?;
    let path_type = ColumnType::Array {
        typ: Box::new(ColumnType::String { max_length: None }),
    };
    let path_param = Column::Param(to_param(&path_type, &JsonValue::Array(path.clone()))?);

    let comparator = match spec.get("op").and_then(|op| op.as_str()) {
        None | Some("equals") => NumericComparator::Eq,
        Some("not") => NumericComparator::Neq,
        Some("lt") => NumericComparator::Lt,
        Some("lte") => NumericComparator::Lte,
        Some("gt") => NumericComparator::Gt,
        Some("gte") => NumericComparator::Gte,
        Some(other) => {
            return Err(QueryError::Validation(format!(
                "'jsonPath' does not support op '{other}'"
            )))
        }
    };

    // `#>>` extracts as text, so the comparison value binds as text too
    let value = spec
        .get("value")
        .ok_or_else(|| QueryError::Validation("'jsonPath' requires a value".to_string()))?;
    let value_text = match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    };

    Ok(ConcretePredicate::PathMatch(
        left,
        path_param,
        comparator,
        Column::Param(SQLParamContainer::from(value_text)),
    ))
}

fn in_predicate(
    columns: &[String],
    values: &[Vec<JsonValue>],
    selectables: &Selectables<'_>,
) -> Result<ConcretePredicate, QueryError> {
    if values.is_empty() {
        return Ok(ConcretePredicate::False);
    }

    let resolved = columns
        .iter()
        .map(|column| selectables.resolve(column))
        .collect::<Result<Vec<_>, _>>()?;

    if let [single] = resolved.as_slice() {
        let params = values
            .iter()
            .map(|row| param_container(&single.typ, &row[0]))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(ConcretePredicate::In(
            single.column.clone(),
            Column::ParamTuple(params),
        ));
    }

    let tuple_columns: Vec<Column> = resolved.iter().map(|r| r.column.clone()).collect();
    let rows = values
        .iter()
        .map(|row| {
            row.iter()
                .zip(&resolved)
                .map(|(value, r)| param_container(&r.typ, value).map(Column::Param))
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ConcretePredicate::TupleIn(tuple_columns, rows))
}

fn exists_predicate(
    target: &ExistsTarget,
    on: &[OnCond],
    not: bool,
    selectables: &Selectables<'_>,
    database: &Database,
) -> Result<ConcretePredicate, QueryError> {
    let select = match target {
        ExistsTarget::Query(sub) => select_transformer::to_select(sub, database)?,
        ExistsTarget::Table(name) => {
            let table_id = database
                .get_table_id(name)
                .ok_or_else(|| QueryError::UnknownTable(name.clone()))?;

            let mut predicate = ConcretePredicate::True;
            for cond in on {
                // The left side names the probed table (qualified or bare);
                // the right side resolves against the enclosing query
                let prefix = format!("{name}.");
                let left_name = cond.left.strip_prefix(&prefix).unwrap_or(&cond.left);
                let left = match database.get_column_id_by_key(table_id, left_name) {
                    Some(column_id) => Column::physical(column_id, None),
                    None => Column::Reference {
                        table_alias: Some(name.clone()),
                        name: left_name.to_string(),
                    },
                };
                let right = selectables.resolve(&cond.right)?.column;
                predicate =
                    ConcretePredicate::and(predicate, sql_comparison(left, &cond.op, right)?);
            }

            Select {
                columns: vec![(Column::Raw(RawFragment::new("1", vec![])?), None)],
                predicate,
                ..Select::new(Table::physical(table_id, None), vec![])
            }
        }
    };

    let exists = ConcretePredicate::Exists(Box::new(select));
    Ok(if not {
        ConcretePredicate::Not(Box::new(exists))
    } else {
        exists
    })
}

/// Map a SQL comparison string (as accepted in `ON`-style conditions) to its
/// predicate.
pub(crate) fn sql_comparison(
    left: Column,
    op: &str,
    right: Column,
) -> Result<ConcretePredicate, QueryError> {
    Ok(match op {
        "=" => ConcretePredicate::Eq(left, right),
        "!=" | "<>" => ConcretePredicate::Neq(left, right),
        "<" => ConcretePredicate::Lt(left, right),
        "<=" => ConcretePredicate::Lte(left, right),
        ">" => ConcretePredicate::Gt(left, right),
        ">=" => ConcretePredicate::Gte(left, right),
        other => {
            return Err(QueryError::Validation(format!(
                "Unknown comparison '{other}'"
            )))
        }
    })
}

/// The document expression a search runs over: the single column, or
/// `concat_ws(' ', ...)` over several.
fn search_document(
    config: &SearchConfig,
    selectables: &Selectables<'_>,
) -> Result<Column, QueryError> {
    let mut columns = Vec::with_capacity(config.columns.len());
    for name in &config.columns {
        columns.push(selectables.resolve(name)?.column);
    }
    Ok(match columns.len() {
        1 => columns.remove(0),
        _ => {
            let mut args = vec![Column::Constant(" ".to_string())];
            args.extend(columns);
            Column::function("concat_ws", args)
        }
    })
}

/// `to_tsvector(...) @@ websearch_to_tsquery(...)`.
pub(crate) fn search_match(
    config: &SearchConfig,
    selectables: &Selectables<'_>,
) -> Result<ConcretePredicate, QueryError> {
    let vector = ts_vector(&config.language, search_document(config, selectables)?);
    let query = ts_query(TsQueryKind::Web, &config.language, config.query.clone());
    Ok(ConcretePredicate::TextMatch(vector, query))
}

/// `ts_rank(to_tsvector(...), websearch_to_tsquery(...))`, for best-match
/// ordering.
pub(crate) fn search_rank(
    config: &SearchConfig,
    selectables: &Selectables<'_>,
) -> Result<Column, QueryError> {
    let vector = ts_vector(&config.language, search_document(config, selectables)?);
    let query = ts_query(TsQueryKind::Web, &config.language, config.query.clone());
    Ok(ts_rank(vector, query))
}

/// `ts_headline(...)` over one document column.
pub(crate) fn search_headline(config: &SearchConfig, document: Column) -> Column {
    let query = ts_query(TsQueryKind::Web, &config.language, config.query.clone());
    ts_headline(&config.language, document, query)
}

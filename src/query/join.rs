// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::query_error::QueryError;
use crate::sql::column::Column;
use crate::sql::column_type::operators::GENERIC_OPERATORS;
use crate::sql::column_type::ColumnType;
use crate::sql::database::{Database, TableId};

pub use crate::sql::join::JoinKind;

use super::filter::{ExistsTarget, WhereItem, OnCond};
use super::query_data::QueryData;
use super::shape::{ColumnShape, Shape};

/// What a join brings into the query.
#[derive(Debug, Clone)]
pub enum JoinTarget {
    /// A catalog table.
    Table(TableId),
    /// A CTE defined by an earlier `with`.
    Cte(String),
    /// A sub-query wrapped as a derived table; laterals always take this form.
    Subquery(Box<QueryData>),
}

/// One join clause plus the alias it answers to.
#[derive(Debug, Clone)]
pub struct JoinItem {
    pub kind: JoinKind,
    pub target: JoinTarget,
    pub alias: String,
    /// Column-vs-column conditions. Empty for laterals, which correlate in
    /// their own WHERE and join `ON TRUE`.
    pub on: Vec<OnCond>,
}

/// The columns an alias exposes to the rest of the query.
#[derive(Debug, Clone)]
pub struct JoinedShape {
    pub shape: Arc<Shape>,
    /// Set when the alias is backed by a catalog table; its columns then
    /// render as physical columns and unknown names stay permissive.
    pub table_id: Option<TableId>,
}

impl JoinedShape {
    /// The single aggregated field a json-mode lateral exposes, keyed by its
    /// own alias. `None` for every other joined shape.
    pub fn json_aggregate(&self, alias: &str) -> Option<&ColumnShape> {
        if self.table_id.is_some() || self.shape.len() != 1 {
            return None;
        }
        match self.shape.get_index(0) {
            Some((key, entry)) if key == alias => Some(entry),
            _ => None,
        }
    }
}

/// Pick a collision-free alias: the requested name as-is, else `name2`,
/// `name3`, ...
pub fn unique_alias(requested: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(requested) {
        return requested.to_string();
    }
    let mut n = 2;
    loop {
        let candidate = format!("{requested}{n}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// A selectable name resolved to a renderable column.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub column: Column,
    /// The column's kind, when the catalog knows it.
    pub typ: Option<ColumnType>,
    /// The record key the name selects as.
    pub key: String,
}

/// The resolvable-column view of one query: its base table (or the CTE it
/// selects from), plus everything its joins expose.
///
/// Bare names and names qualified by a table-backed alias resolve permissively:
/// a name the catalog does not know still renders, qualified, and the database
/// arbitrates. Names qualified by a sub-query alias resolve strictly against
/// that sub-query's selected shape, since nothing outside it exists.
pub struct Selectables<'a> {
    database: &'a Database,
    table_id: TableId,
    /// The alias explicitly set on the query, if any
    explicit_alias: Option<String>,
    /// What qualifies the base table's columns: the alias, else the table name
    qualifier: String,
    from_cte: Option<(String, Shape)>,
    joined: &'a IndexMap<String, JoinedShape>,
}

impl<'a> Selectables<'a> {
    pub fn new(data: &'a QueryData, database: &'a Database) -> Self {
        let table_name = &database.get_table(data.table_id).name;
        let qualifier = data.alias.clone().unwrap_or_else(|| table_name.clone());
        let from_cte = data.from_cte.as_ref().map(|name| {
            let shape = data
                .with
                .iter()
                .find(|item| &item.name == name)
                .map(|item| item.query.output_shape(database))
                .unwrap_or_default();
            (name.clone(), shape)
        });
        Selectables {
            database,
            table_id: data.table_id,
            explicit_alias: data.alias.clone(),
            qualifier,
            from_cte,
            joined: &data.joined,
        }
    }

    /// What qualifies the base table's columns in rendered SQL.
    pub fn qualifier(&self) -> &str {
        &self.qualifier
    }

    /// The output shape of the CTE the query selects from, if `from_with` is
    /// in effect.
    pub fn cte_shape(&self) -> Option<&Shape> {
        self.from_cte.as_ref().map(|(_, shape)| shape)
    }

    /// The shape an alias exposes, for `alias.*` selection.
    pub fn joined_shape(&self, alias: &str) -> Option<&JoinedShape> {
        self.joined.get(alias)
    }

    pub fn resolve(&self, name: &str) -> Result<Resolved, QueryError> {
        match name.split_once('.') {
            Some((alias, column)) => self.resolve_qualified(name, alias, column),
            None => self.resolve_bare(name),
        }
    }

    /// Resolve a HAVING reference: known base columns render qualified, but an
    /// unknown bare name renders unqualified so it can refer to an output
    /// alias such as an aggregate.
    pub fn resolve_having(&self, name: &str) -> Result<Resolved, QueryError> {
        if !name.contains('.') && self.from_cte.is_none() {
            if let Some(resolved) = self.own_column(name) {
                return Ok(resolved);
            }
            return Ok(Resolved {
                column: Column::Reference {
                    table_alias: None,
                    name: name.to_string(),
                },
                typ: None,
                key: name.to_string(),
            });
        }
        self.resolve(name)
    }

    fn resolve_bare(&self, name: &str) -> Result<Resolved, QueryError> {
        // FROM a CTE: the base table is out of scope and names resolve
        // against the CTE's output
        if let Some((cte_name, shape)) = &self.from_cte {
            return Ok(shape_column(cte_name, name, shape.get(name)));
        }
        match self.own_column(name) {
            Some(resolved) => Ok(resolved),
            None => Ok(Resolved {
                column: Column::Reference {
                    table_alias: Some(self.qualifier.clone()),
                    name: name.to_string(),
                },
                typ: None,
                key: name.to_string(),
            }),
        }
    }

    fn resolve_qualified(
        &self,
        full: &str,
        alias: &str,
        column: &str,
    ) -> Result<Resolved, QueryError> {
        if let Some((cte_name, shape)) = &self.from_cte {
            if alias == cte_name {
                return Ok(shape_column(cte_name, column, shape.get(column)));
            }
        } else if alias == self.qualifier {
            return self.resolve_bare(column);
        }

        match self.joined.get(alias) {
            Some(JoinedShape {
                table_id: Some(table_id),
                ..
            }) => match self.database.get_column_id_by_key(*table_id, column) {
                Some(column_id) => {
                    let physical = column_id.get_column(self.database);
                    Ok(Resolved {
                        column: Column::Physical {
                            column_id,
                            table_alias: Some(alias.to_string()),
                        },
                        typ: Some(physical.typ.clone()),
                        key: physical.record_key().to_string(),
                    })
                }
                None => Ok(Resolved {
                    column: Column::Reference {
                        table_alias: Some(alias.to_string()),
                        name: column.to_string(),
                    },
                    typ: None,
                    key: column.to_string(),
                }),
            },
            Some(JoinedShape {
                table_id: None,
                shape,
            }) => match shape.get(column) {
                Some(entry) => Ok(Resolved {
                    column: Column::Reference {
                        table_alias: Some(alias.to_string()),
                        name: column.to_string(),
                    },
                    typ: entry_type(entry),
                    key: column.to_string(),
                }),
                None => Err(QueryError::UnknownSelectable(full.to_string())),
            },
            None => Err(QueryError::UnknownSelectable(full.to_string())),
        }
    }

    fn own_column(&self, name: &str) -> Option<Resolved> {
        self.database
            .get_column_id_by_key(self.table_id, name)
            .map(|column_id| {
                let column = column_id.get_column(self.database);
                Resolved {
                    column: Column::Physical {
                        column_id,
                        table_alias: self.explicit_alias.clone(),
                    },
                    typ: Some(column.typ.clone()),
                    key: column.record_key().to_string(),
                }
            })
    }

    /// Check a batch of WHERE items against the resolvable columns and their
    /// operator sets, so a bad filter is reported from the builder call that
    /// pushed it rather than from deep inside compilation.
    pub fn validate_items(&self, items: &[WhereItem]) -> Result<(), QueryError> {
        items.iter().try_for_each(|item| self.validate_item(item))
    }

    fn validate_item(&self, item: &WhereItem) -> Result<(), QueryError> {
        match item {
            WhereItem::Cond { column, cmp } => {
                let resolved = self.resolve(column)?;
                let supported = match &resolved.typ {
                    Some(typ) => typ.supports(cmp.operator),
                    None => GENERIC_OPERATORS.contains(&cmp.operator),
                };
                if supported {
                    Ok(())
                } else {
                    Err(QueryError::InvalidOperator {
                        column: column.clone(),
                        operator: cmp.operator.key().to_string(),
                        data_type: resolved
                            .typ
                            .map(|typ| typ.sql_name())
                            .unwrap_or_else(|| "unknown".to_string()),
                    })
                }
            }
            WhereItem::Not(inner) => self.validate_item(inner),
            WhereItem::Or(groups) => groups
                .iter()
                .try_for_each(|group| self.validate_items(group)),
            WhereItem::In { columns, .. } => columns
                .iter()
                .try_for_each(|column| self.resolve(column).map(|_| ())),
            WhereItem::Exists { target, on, .. } => {
                if let ExistsTarget::Table(name) = target {
                    self.database
                        .get_table_id(name)
                        .ok_or_else(|| QueryError::UnknownTable(name.clone()))?;
                }
                // The left side names the probed target and is resolved when
                // the EXISTS compiles; the right side must resolve here.
                on.iter()
                    .try_for_each(|cond| self.resolve(&cond.right).map(|_| ()))
            }
            WhereItem::Raw(_) => Ok(()),
            WhereItem::On(cond) => {
                self.resolve(&cond.left)?;
                self.resolve(&cond.right)?;
                Ok(())
            }
        }
    }
}

fn shape_column(qualifier: &str, name: &str, entry: Option<&ColumnShape>) -> Resolved {
    Resolved {
        column: Column::Reference {
            table_alias: Some(qualifier.to_string()),
            name: name.to_string(),
        },
        typ: entry.and_then(entry_type),
        key: name.to_string(),
    }
}

fn entry_type(entry: &ColumnShape) -> Option<ColumnType> {
    match entry {
        ColumnShape::Scalar(typ) => Some(typ.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_collisions_suffix_deterministically() {
        let taken = |name: &str| name == "venue" || name == "venue2";
        assert_eq!(unique_alias("venue", taken), "venue3");
        assert_eq!(unique_alias("artist", taken), "artist");
    }
}

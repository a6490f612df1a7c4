// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::sync::LazyLock;

use regex::Regex;

use crate::query_error::QueryError;
use crate::sql::database::Database;

use super::{ExpressionBuilder, SQLBuilder, SQLParamContainer};

/// Placeholders in a raw fragment are written against the fragment's own
/// parameter list (`$1` is the fragment's first parameter). The statement-wide
/// numbers are assigned when the statement is built.
static LOCAL_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$(\d+)").unwrap());

/// A verbatim piece of SQL with its own parameters, spliced into a statement.
/// The text is emitted as written (no identifier quoting), so it must come
/// from the application, never from user input.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFragment {
    sql: String,
    params: Vec<SQLParamContainer>,
}

impl RawFragment {
    /// Create a fragment, checking that every `$k` reference stays within the
    /// parameter list. A reference past the end would otherwise surface as an
    /// opaque server error at execution time.
    pub fn new(
        sql: impl Into<String>,
        params: Vec<SQLParamContainer>,
    ) -> Result<Self, QueryError> {
        let sql = sql.into();

        for captures in LOCAL_PLACEHOLDER.captures_iter(&sql) {
            let index: usize = captures[1]
                .parse()
                .map_err(|_| QueryError::Validation(format!("Invalid placeholder in {sql}")))?;
            if index == 0 || index > params.len() {
                return Err(QueryError::RawParamOutOfRange {
                    index,
                    len: params.len(),
                });
            }
        }

        Ok(RawFragment { sql, params })
    }
}

impl ExpressionBuilder for RawFragment {
    fn build(&self, _database: &Database, builder: &mut SQLBuilder) {
        // Register the fragment's parameters to learn their statement-wide
        // numbers, then rewrite the local references
        let globals: Vec<usize> = self
            .params
            .iter()
            .map(|param| builder.register_param(param.param()))
            .collect();

        let rewritten = LOCAL_PLACEHOLDER.replace_all(&self.sql, |captures: &regex::Captures| {
            let local: usize = captures[1].parse().unwrap_or(0);
            match globals.get(local.wrapping_sub(1)) {
                Some(global) => format!("${global}"),
                None => captures[0].to_string(),
            }
        });

        builder.push_str(&rewritten);
    }
}

#[cfg(test)]
mod tests {
    use crate::sql::pg_value::PgValue;

    use super::*;

    #[test]
    fn local_placeholders_are_renumbered() {
        let database = Database::default();
        let mut builder = SQLBuilder::new();

        // Take up the first two statement-wide numbers
        builder.push_param(std::sync::Arc::new(PgValue::Int8(1)));
        builder.push_str(" AND ");
        builder.push_param(std::sync::Arc::new(PgValue::Int8(2)));
        builder.push_str(" AND ");

        let fragment = RawFragment::new(
            "lower(name) = lower($1) OR code = $2",
            vec![
                SQLParamContainer::from("sam"),
                SQLParamContainer::from("SAM-1"),
            ],
        )
        .unwrap();
        fragment.build(&database, &mut builder);

        let (stmt, params) = builder.into_sql();
        assert_eq!(stmt, "$1 AND $2 AND lower(name) = lower($3) OR code = $4");
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn out_of_range_references_are_rejected() {
        let result = RawFragment::new("a = $2", vec![SQLParamContainer::from(1_i64)]);
        assert!(matches!(
            result,
            Err(QueryError::RawParamOutOfRange { index: 2, len: 1 })
        ));

        assert!(RawFragment::new("a = $0", vec![]).is_err());
    }

    #[test]
    fn fragments_without_params_pass_through() {
        let database = Database::default();
        let fragment = RawFragment::new("count(*) > 0", vec![]).unwrap();
        let mut builder = SQLBuilder::new();
        fragment.build(&database, &mut builder);
        let (stmt, params) = builder.into_sql();
        assert_eq!(stmt, "count(*) > 0");
        assert!(params.is_empty());
    }
}

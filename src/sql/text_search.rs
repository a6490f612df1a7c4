// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Builders for the full-text search function family. The language is always
//! bound as a parameter and cast to `regconfig`, so changing it never changes
//! the statement text.

use super::SQLParamContainer;
use super::column::Column;

/// How the user's query string is turned into a tsquery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TsQueryKind {
    /// `plainto_tsquery`: words AND-ed together
    Plain,
    /// `phraseto_tsquery`: words must appear in sequence
    Phrase,
    /// `websearch_to_tsquery`: quoted phrases, `or`, `-`
    Web,
    /// `to_tsquery`: the raw tsquery syntax
    Raw,
}

impl TsQueryKind {
    pub fn function_name(&self) -> &'static str {
        match self {
            TsQueryKind::Plain => "plainto_tsquery",
            TsQueryKind::Phrase => "phraseto_tsquery",
            TsQueryKind::Web => "websearch_to_tsquery",
            TsQueryKind::Raw => "to_tsquery",
        }
    }
}

fn language_param(language: &str) -> Column {
    Column::Cast {
        column: Box::new(Column::Param(SQLParamContainer::from(language))),
        typ: "regconfig".to_string(),
    }
}

/// `to_tsvector($n::regconfig, <column>)`
pub fn ts_vector(language: &str, column: Column) -> Column {
    Column::function("to_tsvector", vec![language_param(language), column])
}

/// `<kind>_tsquery($n::regconfig, $m)`
pub fn ts_query(kind: TsQueryKind, language: &str, query: impl Into<String>) -> Column {
    Column::function(
        kind.function_name(),
        vec![
            language_param(language),
            Column::Param(SQLParamContainer::from(query.into())),
        ],
    )
}

/// `ts_rank(<vector>, <query>)`
pub fn ts_rank(vector: Column, query: Column) -> Column {
    Column::function("ts_rank", vec![vector, query])
}

/// `ts_headline($n::regconfig, <document>, <query>)`
pub fn ts_headline(language: &str, document: Column, query: Column) -> Column {
    Column::function("ts_headline", vec![language_param(language), document, query])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DatabaseSpec, TableSpec};
    use crate::sql::expression_builder::ExpressionBuilder;
    use crate::sql::pg_value::PgValue;
    use crate::sql::predicate::ConcretePredicate;

    #[test]
    fn search_predicate_shape() {
        let database = DatabaseSpec::new(vec![
            TableSpec::parse(
                "articles",
                &[("id", "bigserial primary key"), ("body", "text")],
            )
            .unwrap(),
        ])
        .to_database();

        let articles = database.get_table_id("articles").unwrap();
        let body = database.get_column_id(articles, "body").unwrap();

        let predicate = ConcretePredicate::TextMatch(
            ts_vector("english", Column::physical(body, None)),
            ts_query(TsQueryKind::Web, "english", "sql injection"),
        );

        assert_binding!(
            predicate.to_sql(&database),
            r#"to_tsvector($1::regconfig, "articles"."body") @@ websearch_to_tsquery($2::regconfig, $3)"#,
            PgValue::Text("english".to_string()),
            PgValue::Text("english".to_string()),
            PgValue::Text("sql injection".to_string())
        );
    }
}

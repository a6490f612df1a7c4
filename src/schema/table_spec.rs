// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::query_error::QueryError;

use super::column_spec::ColumnSpec;

pub struct TableSpec {
    pub(super) name: String,
    pub(super) columns: Vec<ColumnSpec>,
}

impl TableSpec {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnSpec>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Create a table from `(column name, DDL-style definition)` pairs.
    pub fn parse(
        name: impl Into<String>,
        columns: &[(&str, &str)],
    ) -> Result<Self, QueryError> {
        let columns = columns
            .iter()
            .map(|(column_name, definition)| ColumnSpec::parse(*column_name, definition))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(name, columns))
    }
}

// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::query_error::QueryError;
use crate::sql::column_type::ColumnType;

/// A column definition, before it is placed into a table.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    pub name: String,
    pub typ: ColumnType,
    pub is_pk: bool,
    pub is_nullable: bool,
    pub api_name: Option<String>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, typ: ColumnType) -> Self {
        Self {
            name: name.into(),
            typ,
            is_pk: false,
            is_nullable: true,
            api_name: None,
        }
    }

    /// Create a column from a DDL-style definition such as `"serial primary key"`,
    /// `"text not null"`, or `"numeric(10,2)"`. `PRIMARY KEY` and `NOT NULL`
    /// suffixes set the flags; the rest must name a known SQL type.
    pub fn parse(name: impl Into<String>, definition: &str) -> Result<Self, QueryError> {
        let upper = definition.to_uppercase();
        let mut rest = upper.trim();
        let mut is_pk = false;
        let mut not_null = false;

        loop {
            if let Some(prefix) = rest.strip_suffix("PRIMARY KEY") {
                is_pk = true;
                rest = prefix.trim_end();
            } else if let Some(prefix) = rest.strip_suffix("NOT NULL") {
                not_null = true;
                rest = prefix.trim_end();
            } else {
                break;
            }
        }

        let typ = ColumnType::from_string(rest)?;

        Ok(Self {
            name: name.into(),
            typ,
            is_pk,
            // primary keys are implied to be not null
            is_nullable: !(not_null || is_pk),
            api_name: None,
        })
    }

    pub fn primary_key(mut self) -> Self {
        self.is_pk = true;
        self.is_nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    /// Expose the column under a different key in records (for example a
    /// `first_name` column surfacing as `firstName`).
    pub fn with_api_name(mut self, api_name: impl Into<String>) -> Self {
        self.api_name = Some(api_name.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::column_type::IntBits;

    #[test]
    fn parses_flags_from_the_tail() {
        let id = ColumnSpec::parse("id", "bigserial primary key").unwrap();
        assert!(id.is_pk);
        assert!(!id.is_nullable);
        assert_eq!(id.typ, ColumnType::Int { bits: IntBits::_64 });

        let name = ColumnSpec::parse("name", "text not null").unwrap();
        assert!(!name.is_pk);
        assert!(!name.is_nullable);

        let bio = ColumnSpec::parse("bio", "text").unwrap();
        assert!(bio.is_nullable);
    }

    #[test]
    fn rejects_malformed_definitions() {
        assert!(ColumnSpec::parse("x", "wibble not null").is_err());
    }
}

// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use regex::Regex;

use crate::query_error::QueryError;

pub mod encode;
pub mod operators;
pub mod parse;

pub use operators::Operator;

/// The number of bits in an integer column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntBits {
    _16,
    _32,
    _64,
}

/// The number of bits in the mantissa of a float column (24 for `real`, 53 for
/// `double precision`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatBits {
    _24,
    _53,
}

/// The kind of a column. Carries the kind-specific attributes (bits, precision,
/// element type, ...) and determines the operator set, the encoding of JSON
/// values into wire parameters, and the parsing of wire values back into JSON.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Int {
        bits: IntBits,
    },
    Float {
        bits: FloatBits,
    },
    Numeric {
        precision: Option<usize>,
        scale: Option<usize>,
    },
    String {
        max_length: Option<usize>,
    },
    Boolean,
    Timestamp {
        timezone: bool,
        precision: Option<usize>,
    },
    Date,
    Time {
        precision: Option<usize>,
    },
    Json,
    Blob,
    Uuid,
    Enum {
        name: String,
    },
    Array {
        typ: Box<ColumnType>,
    },
}

impl ColumnType {
    /// Parse a SQL type string (as it would appear in a DDL statement) into a column kind.
    /// Unrecognized type strings are rejected here, at table-definition time, so a typo never
    /// reaches the query path.
    pub fn from_string(s: &str) -> Result<ColumnType, QueryError> {
        let s = s.to_uppercase();

        match s.find('[') {
            // If the type contains `[`, then it's an array type
            Some(idx) => {
                let db_type = &s[..idx]; // The underlying data type (e.g. `INT` in `INT[][]`)
                let mut dims = &s[idx..]; // The array brackets (e.g. `[][]` in `INT[][]`)

                // Count how many `[]` exist in `dims` (how many dimensions does this array have)
                let mut count = 0;
                loop {
                    if !dims.is_empty() {
                        if dims.len() >= 2 && &dims[0..2] == "[]" {
                            dims = &dims[2..];
                            count += 1;
                        } else {
                            return Err(QueryError::Validation(format!("unknown type {s}")));
                        }
                    } else {
                        break;
                    }
                }

                // Wrap the underlying type with `ColumnType::Array`
                let mut array_type = ColumnType::Array {
                    typ: Box::new(ColumnType::from_string(db_type)?),
                };
                for _ in 0..count - 1 {
                    array_type = ColumnType::Array {
                        typ: Box::new(array_type),
                    };
                }
                Ok(array_type)
            }

            None => Ok(match s.as_str() {
                "SMALLSERIAL" => ColumnType::Int { bits: IntBits::_16 },
                "SMALLINT" => ColumnType::Int { bits: IntBits::_16 },
                "INT" => ColumnType::Int { bits: IntBits::_32 },
                "INTEGER" => ColumnType::Int { bits: IntBits::_32 },
                "SERIAL" => ColumnType::Int { bits: IntBits::_32 },
                "BIGINT" => ColumnType::Int { bits: IntBits::_64 },
                "BIGSERIAL" => ColumnType::Int { bits: IntBits::_64 },

                "REAL" => ColumnType::Float {
                    bits: FloatBits::_24,
                },
                "DOUBLE PRECISION" => ColumnType::Float {
                    bits: FloatBits::_53,
                },

                "UUID" => ColumnType::Uuid,
                "TEXT" => ColumnType::String { max_length: None },
                "BOOLEAN" => ColumnType::Boolean,
                "JSON" => ColumnType::Json,
                "JSONB" => ColumnType::Json,
                "BYTEA" => ColumnType::Blob,
                "DATE" => ColumnType::Date,
                s => {
                    // parse types with arguments
                    let get_num = |s: &str| {
                        s.chars()
                            .filter(|c| c.is_numeric())
                            .collect::<String>()
                            .parse::<usize>()
                            .ok()
                    };

                    if s.starts_with("CHARACTER VARYING")
                        || s.starts_with("VARCHAR")
                        || s.starts_with("CHAR")
                    {
                        ColumnType::String {
                            max_length: get_num(s),
                        }
                    } else if s.starts_with("TIMESTAMPTZ") {
                        ColumnType::Timestamp {
                            precision: get_num(s),
                            timezone: true,
                        }
                    } else if s.starts_with("TIMESTAMP") {
                        ColumnType::Timestamp {
                            precision: get_num(s),
                            timezone: s.contains("WITH TIME ZONE"),
                        }
                    } else if s.starts_with("TIME") {
                        ColumnType::Time {
                            precision: get_num(s),
                        }
                    } else if s.starts_with("NUMERIC") || s.starts_with("DECIMAL") {
                        let regex = Regex::new("(NUMERIC|DECIMAL)(\\((?P<precision>\\d+),?(?P<scale>\\d+)?\\))?")
                            .map_err(|_| {
                                QueryError::Validation("Invalid numeric column spec".into())
                            })?;
                        let captures = regex
                            .captures(s)
                            .ok_or_else(|| QueryError::Validation(format!("unknown type {s}")))?;

                        let precision = captures
                            .name("precision")
                            .and_then(|s| s.as_str().parse().ok());
                        let scale = captures.name("scale").and_then(|s| s.as_str().parse().ok());

                        ColumnType::Numeric { precision, scale }
                    } else if s.starts_with("ENUM") {
                        // accepts `enum(<type name>)`
                        let name = s
                            .strip_prefix("ENUM(")
                            .and_then(|rest| rest.strip_suffix(')'))
                            .ok_or_else(|| QueryError::Validation(format!("unknown type {s}")))?;
                        ColumnType::Enum {
                            name: name.to_lowercase(),
                        }
                    } else {
                        return Err(QueryError::Validation(format!("unknown type {s}")));
                    }
                }
            }),
        }
    }

    /// The SQL name of the type, used in error messages.
    pub fn sql_name(&self) -> String {
        match self {
            ColumnType::Int { bits } => match bits {
                IntBits::_16 => "smallint".to_owned(),
                IntBits::_32 => "integer".to_owned(),
                IntBits::_64 => "bigint".to_owned(),
            },
            ColumnType::Float { bits } => match bits {
                FloatBits::_24 => "real".to_owned(),
                FloatBits::_53 => "double precision".to_owned(),
            },
            ColumnType::Numeric { precision, scale } => match (precision, scale) {
                (Some(p), Some(s)) => format!("numeric({p},{s})"),
                (Some(p), None) => format!("numeric({p})"),
                _ => "numeric".to_owned(),
            },
            ColumnType::String {
                max_length: Some(len),
            } => format!("varchar({len})"),
            ColumnType::String { max_length: None } => "text".to_owned(),
            ColumnType::Boolean => "boolean".to_owned(),
            ColumnType::Timestamp { timezone, .. } => if *timezone {
                "timestamp with time zone"
            } else {
                "timestamp"
            }
            .to_owned(),
            ColumnType::Date => "date".to_owned(),
            ColumnType::Time { .. } => "time".to_owned(),
            ColumnType::Json => "jsonb".to_owned(),
            ColumnType::Blob => "bytea".to_owned(),
            ColumnType::Uuid => "uuid".to_owned(),
            ColumnType::Enum { name } => name.clone(),
            ColumnType::Array { typ } => format!("{}[]", typ.sql_name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_types() {
        assert_eq!(
            ColumnType::from_string("bigint").unwrap(),
            ColumnType::Int { bits: IntBits::_64 }
        );
        assert_eq!(
            ColumnType::from_string("TEXT").unwrap(),
            ColumnType::String { max_length: None }
        );
        assert_eq!(
            ColumnType::from_string("double precision").unwrap(),
            ColumnType::Float {
                bits: FloatBits::_53
            }
        );
        assert_eq!(ColumnType::from_string("jsonb").unwrap(), ColumnType::Json);
        assert_eq!(ColumnType::from_string("bytea").unwrap(), ColumnType::Blob);
    }

    #[test]
    fn parses_parameterized_types() {
        assert_eq!(
            ColumnType::from_string("varchar(100)").unwrap(),
            ColumnType::String {
                max_length: Some(100)
            }
        );
        assert_eq!(
            ColumnType::from_string("numeric(10,2)").unwrap(),
            ColumnType::Numeric {
                precision: Some(10),
                scale: Some(2)
            }
        );
        assert_eq!(
            ColumnType::from_string("timestamp with time zone").unwrap(),
            ColumnType::Timestamp {
                timezone: true,
                precision: None
            }
        );
        assert_eq!(
            ColumnType::from_string("timestamptz").unwrap(),
            ColumnType::from_string("timestamp with time zone").unwrap()
        );
        assert_eq!(
            ColumnType::from_string("enum(mood)").unwrap(),
            ColumnType::Enum {
                name: "mood".to_owned()
            }
        );
    }

    #[test]
    fn parses_array_types() {
        assert_eq!(
            ColumnType::from_string("text[]").unwrap(),
            ColumnType::Array {
                typ: Box::new(ColumnType::String { max_length: None })
            }
        );
        assert_eq!(
            ColumnType::from_string("int[][]").unwrap(),
            ColumnType::Array {
                typ: Box::new(ColumnType::Array {
                    typ: Box::new(ColumnType::Int { bits: IntBits::_32 })
                })
            }
        );
    }

    #[test]
    fn rejects_unknown_types() {
        assert!(matches!(
            ColumnType::from_string("blorb"),
            Err(QueryError::Validation(_))
        ));
        assert!(matches!(
            ColumnType::from_string("int[]x"),
            Err(QueryError::Validation(_))
        ));
    }
}

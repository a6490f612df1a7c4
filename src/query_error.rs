// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Record not found")]
    NotFound,

    #[error("Expected at most one row, but the query affected {0}")]
    MoreThanOneRow(u64),

    #[error("Unknown selectable '{0}'")]
    UnknownSelectable(String),

    #[error("Unknown table '{0}'")]
    UnknownTable(String),

    #[error("Unknown scope '{0}'")]
    UnknownScope(String),

    #[error("Operator '{operator}' is not supported for column '{column}' of type {data_type}")]
    InvalidOperator {
        column: String,
        operator: String,
        data_type: String,
    },

    #[error("{0} without a filter; call all_records() to affect every row")]
    UnguardedMutation(&'static str),

    #[error("Raw fragment references ${index}, but only {len} values were provided")]
    RawParamOutOfRange { index: usize, len: usize },

    #[error("Validation: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to execute transaction {0}")]
    Transaction(String),

    #[error("Delegate: {0}")]
    Delegate(#[from] tokio_postgres::Error),

    #[error("Pool: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("{0} {1}")]
    WithContext(String, #[source] Box<QueryError>),

    #[error("{0}")]
    BoxedError(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl QueryError {
    pub fn with_context(self, context: String) -> QueryError {
        QueryError::WithContext(context, Box::new(self))
    }

    /// The SQLSTATE code of the underlying database error, if there is one.
    pub fn db_code(&self) -> Option<&str> {
        self.as_db_error().map(|e| e.code().code())
    }

    /// The name of the violated constraint, if the underlying database error carries one.
    pub fn constraint(&self) -> Option<&str> {
        self.as_db_error().and_then(|e| e.constraint())
    }

    /// The column the underlying database error refers to, if any.
    pub fn column_name(&self) -> Option<&str> {
        self.as_db_error().and_then(|e| e.column())
    }

    /// True if the error is a unique constraint violation (SQLSTATE 23505).
    pub fn is_unique_violation(&self) -> bool {
        self.db_code() == Some("23505")
    }

    /// Re-create a usage error recorded against an earlier builder call.
    ///
    /// Builder methods never fail; a bad argument is remembered and reported
    /// when the query is compiled. The recorded error is kept behind an `Arc`
    /// (queries are cheap to clone), so reporting it re-creates the variant
    /// rather than moving it out.
    pub fn replay(&self) -> QueryError {
        match self {
            QueryError::UnknownSelectable(name) => {
                QueryError::UnknownSelectable(name.clone())
            }
            QueryError::UnknownTable(name) => QueryError::UnknownTable(name.clone()),
            QueryError::UnknownScope(name) => QueryError::UnknownScope(name.clone()),
            QueryError::InvalidOperator {
                column,
                operator,
                data_type,
            } => QueryError::InvalidOperator {
                column: column.clone(),
                operator: operator.clone(),
                data_type: data_type.clone(),
            },
            QueryError::UnguardedMutation(op) => QueryError::UnguardedMutation(op),
            QueryError::RawParamOutOfRange { index, len } => QueryError::RawParamOutOfRange {
                index: *index,
                len: *len,
            },
            QueryError::Validation(msg) => QueryError::Validation(msg.clone()),
            other => QueryError::Validation(other.to_string()),
        }
    }

    fn as_db_error(&self) -> Option<&tokio_postgres::error::DbError> {
        match self {
            QueryError::Delegate(e) => e.as_db_error(),
            QueryError::WithContext(_, inner) => inner.as_db_error(),
            _ => None,
        }
    }
}

pub trait WithContext {
    fn with_context(self, context: String) -> Self;
}

impl<T> WithContext for Result<T, QueryError> {
    fn with_context(self, context: String) -> Result<T, QueryError> {
        self.map_err(|e| e.with_context(context))
    }
}

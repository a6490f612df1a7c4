// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

#![cfg(test)]

//! Test assertions to check SQL statements and parameters.

/// Assert that the given parameters match the expected ones.
///
/// Parameters are compared through [`SQLParam::eq`](crate::SQLParam::eq), so the expected values
/// must have the same runtime type as the bound ones (bindings produced by this crate are always
/// [`PgValue`](crate::sql::pg_value::PgValue)s).
macro_rules! assert_params {
    ($actual_params:expr) => {
        assert!($actual_params.is_empty(), "Extra actual parameters");
    };
    ($actual_params:expr, $expected_param:expr) => {
        match $actual_params.split_first() {
            Some((actual_head, actual_tail)) => {
                assert_eq!(
                    &actual_head.as_ref(),
                    &(&$expected_param as &dyn $crate::SQLParam),
                    "Parameter mismatch"
                );
                assert_eq!(actual_tail.len(), 0, "Extra actual parameters")
            }
            None => panic!("Too few actual parameters"),
        }
    };
    ($actual_params:expr, $expected_param:expr, $($rest:expr), *) => {
        match $actual_params.split_first() {
            Some((actual_head, actual_tail)) => {
                assert_eq!(
                    &actual_head.as_ref(),
                    &(&$expected_param as &dyn $crate::SQLParam),
                    "Parameter mismatch"
                );
                assert_params!(actual_tail, $($rest), *);
            }
            None => panic!("Too few actual parameters"),
        }
    };
}

/// Assert that a `(stmt, params)` pair matches the expected statement and parameters.
macro_rules! assert_binding {
    ($actual:expr, $expected_stmt:expr) => {
        let (actual_stmt, actual_params) = $actual;
        assert_eq!(actual_stmt, $expected_stmt);
        assert_params!(actual_params);
    };
    ($actual:expr, $expected_stmt:expr, $($rest:expr), *) => {
        let (actual_stmt, actual_params) = $actual;
        assert_eq!(actual_stmt, $expected_stmt);
        assert_params!(actual_params, $($rest), *);
    };
}

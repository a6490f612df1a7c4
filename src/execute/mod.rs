// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The adapter boundary: connection pooling, transactions, the hook
//! pipeline, and row parsing.

pub(crate) mod executor;
pub(crate) mod pool;
pub(crate) mod row_parser;

pub use executor::HookContext;
pub use pool::{DatabaseClient, DatabasePool, TransactionWrapper};

// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

pub mod column_spec;
pub mod database_spec;
pub mod table_spec;

pub use column_spec::ColumnSpec;
pub use database_spec::DatabaseSpec;
pub use table_spec::TableSpec;

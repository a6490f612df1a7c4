// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::sql::database::TableId;

use super::filter::WhereItem;

/// The scope auto-applied to every query over a table that defines it.
pub const DEFAULT_SCOPE: &str = "default";

/// The scopes one table defines, in definition order.
pub type TableScopes = IndexMap<String, Arc<Vec<WhereItem>>>;

/// Named, reusable WHERE condition sets, per table. A query snapshots its
/// table's scopes when it is created, so definitions added later do not change
/// queries already in flight.
#[derive(Debug, Clone, Default)]
pub struct ScopeRegistry {
    by_table: HashMap<TableId, Arc<TableScopes>>,
}

impl ScopeRegistry {
    pub fn define(&mut self, table_id: TableId, name: impl Into<String>, items: Vec<WhereItem>) {
        let scopes = self.by_table.entry(table_id).or_default();
        Arc::make_mut(scopes).insert(name.into(), Arc::new(items));
    }

    pub fn for_table(&self, table_id: TableId) -> Arc<TableScopes> {
        self.by_table.get(&table_id).cloned().unwrap_or_default()
    }
}

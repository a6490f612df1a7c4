// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::execute::HookContext;
use crate::query_error::QueryError;

/// Where in a mutation's lifecycle a hook runs.
///
/// Before-hooks run before the statement is sent. After-hooks run once the
/// statement succeeds but before the surrounding transaction commits, so a
/// failing hook still rolls the write back. Commit-hooks run only after the
/// transaction has committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    BeforeCreate,
    AfterCreate,
    AfterCreateCommit,
    BeforeUpdate,
    AfterUpdate,
    AfterUpdateCommit,
    BeforeDelete,
    AfterDelete,
    AfterDeleteCommit,
}

/// A callback attached to a mutation. Before-hooks receive the input records;
/// after-hooks receive the records the statement returned. The context lets a
/// hook issue further statements on the same connection (and, for after-hooks,
/// inside the same transaction).
#[async_trait]
pub trait Hook: Send + Sync {
    async fn run(&self, records: &[JsonValue], ctx: &HookContext<'_>) -> Result<(), QueryError>;
}

/// The hooks registered on one query, per hook point, in registration order.
#[derive(Clone, Default)]
pub struct HookSet {
    hooks: IndexMap<HookPoint, Vec<Arc<dyn Hook>>>,
}

impl HookSet {
    pub fn add(&mut self, point: HookPoint, hook: Arc<dyn Hook>) {
        self.hooks.entry(point).or_default().push(hook);
    }

    pub fn get(&self, point: HookPoint) -> &[Arc<dyn Hook>] {
        self.hooks.get(&point).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_any(&self, points: &[HookPoint]) -> bool {
        points.iter().any(|point| !self.get(*point).is_empty())
    }
}

impl fmt::Debug for HookSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_map();
        for (point, hooks) in &self.hooks {
            dbg.entry(point, &hooks.len());
        }
        dbg.finish()
    }
}

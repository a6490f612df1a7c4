// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::sql::database::Database;

use super::{ExpressionBuilder, SQLBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStrength {
    Update,
    NoKeyUpdate,
    Share,
    KeyShare,
}

/// What to do when a candidate row is already locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockWait {
    /// Block until the row becomes available
    Wait,
    /// Error out immediately
    NoWait,
    /// Leave the row out of the result
    SkipLocked,
}

/// A row-level locking clause at the end of a SELECT, such as `FOR UPDATE SKIP LOCKED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lock {
    pub strength: LockStrength,
    pub wait: LockWait,
}

impl Lock {
    pub fn new(strength: LockStrength) -> Self {
        Lock {
            strength,
            wait: LockWait::Wait,
        }
    }
}

impl ExpressionBuilder for Lock {
    fn build(&self, _database: &Database, builder: &mut SQLBuilder) {
        builder.push_str(match self.strength {
            LockStrength::Update => "FOR UPDATE",
            LockStrength::NoKeyUpdate => "FOR NO KEY UPDATE",
            LockStrength::Share => "FOR SHARE",
            LockStrength::KeyShare => "FOR KEY SHARE",
        });
        match self.wait {
            LockWait::Wait => {}
            LockWait::NoWait => builder.push_str(" NOWAIT"),
            LockWait::SkipLocked => builder.push_str(" SKIP LOCKED"),
        }
    }
}

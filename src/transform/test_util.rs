// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

#![cfg(test)]

use crate::query::{Db, Query};
use crate::schema::{ColumnSpec, DatabaseSpec, TableSpec};

/// A catalog wide enough to exercise every clause: scalars of each kind on
/// `users`, two joinable tables, and a renamed column (`posts.author_id`
/// appears in records as `authorId`).
pub struct TestSetup {
    pub db: Db,
}

impl TestSetup {
    pub fn with_setup(test_fn: impl Fn(TestSetup)) {
        let users = TableSpec::parse(
            "users",
            &[
                ("id", "bigserial primary key"),
                ("name", "text not null"),
                ("age", "int"),
                ("email", "text"),
                ("bio", "text"),
                ("salary", "numeric(12,2)"),
                ("metadata", "jsonb"),
                ("tags", "text[]"),
                ("avatar", "bytea"),
                ("status", "enum(user_status)"),
                ("created_at", "timestamptz"),
            ],
        )
        .unwrap();

        let profiles = TableSpec::parse(
            "profiles",
            &[
                ("id", "bigserial primary key"),
                ("user_id", "bigint"),
                ("city", "text"),
            ],
        )
        .unwrap();

        let posts = TableSpec::new(
            "posts",
            vec![
                ColumnSpec::parse("id", "bigserial primary key").unwrap(),
                ColumnSpec::parse("author_id", "bigint")
                    .unwrap()
                    .with_api_name("authorId"),
                ColumnSpec::parse("title", "text not null").unwrap(),
                ColumnSpec::parse("body", "text").unwrap(),
                ColumnSpec::parse("views", "int").unwrap(),
                ColumnSpec::parse("published", "boolean").unwrap(),
            ],
        );

        let database = DatabaseSpec::new(vec![users, profiles, posts]).to_database();
        test_fn(TestSetup {
            db: Db::new(database),
        })
    }

    pub fn users(&self) -> Query {
        self.db.table("users").unwrap()
    }

    pub fn profiles(&self) -> Query {
        self.db.table("profiles").unwrap()
    }

    pub fn posts(&self) -> Query {
        self.db.table("posts").unwrap()
    }
}

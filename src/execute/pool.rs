// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;

use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::{NoTls, ToStatement};

use crate::query_error::QueryError;

/// A shared pool of Postgres connections. Cloning shares the underlying
/// pool, so one `DatabasePool` can serve any number of concurrent queries.
#[derive(Clone)]
pub struct DatabasePool {
    pool: Pool,
}

impl DatabasePool {
    /// Build a pool from a `postgres://` connection string.
    pub fn from_url(url: &str, pool_size: usize) -> Result<Self, QueryError> {
        let config = tokio_postgres::Config::from_str(url).map_err(|e| {
            QueryError::Delegate(e)
                .with_context("Failed to parse the PostgreSQL connection string".into())
        })?;
        Self::from_config(config, pool_size)
    }

    /// Build a pool from an already-assembled connection config.
    pub fn from_config(config: tokio_postgres::Config, pool_size: usize) -> Result<Self, QueryError> {
        let manager_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let manager = Manager::from_config(config, NoTls, manager_config);

        let pool = Pool::builder(manager)
            .max_size(pool_size)
            .build()
            .map_err(|e| QueryError::Config(format!("Failed to create the connection pool: {e}")))?;

        Ok(Self { pool })
    }

    pub async fn get_client(&self) -> Result<DatabaseClient, QueryError> {
        Ok(DatabaseClient::Pooled(self.pool.get().await?))
    }
}

impl fmt::Debug for DatabasePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabasePool")
            .field("size", &self.pool.status().max_size)
            .finish()
    }
}

/// A single checked-out connection, pooled or direct.
pub enum DatabaseClient {
    Pooled(deadpool_postgres::Client),
    Direct(tokio_postgres::Client),
}

impl Deref for DatabaseClient {
    type Target = tokio_postgres::Client;

    fn deref(&self) -> &Self::Target {
        match self {
            DatabaseClient::Pooled(client) => client,
            DatabaseClient::Direct(client) => client,
        }
    }
}

impl DerefMut for DatabaseClient {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            DatabaseClient::Pooled(client) => client,
            DatabaseClient::Direct(client) => client,
        }
    }
}

impl DatabaseClient {
    pub async fn transaction(
        &mut self,
    ) -> Result<TransactionWrapper<'_>, tokio_postgres::Error> {
        match self {
            DatabaseClient::Pooled(client) => {
                client.transaction().await.map(TransactionWrapper::Pooled)
            }
            DatabaseClient::Direct(client) => {
                client.transaction().await.map(TransactionWrapper::Direct)
            }
        }
    }

    pub async fn query<T>(
        &self,
        query: &T,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> Result<Vec<tokio_postgres::Row>, tokio_postgres::Error>
    where
        T: ?Sized + ToStatement,
    {
        match self {
            DatabaseClient::Pooled(client) => client.query(query, params).await,
            DatabaseClient::Direct(client) => client.query(query, params).await,
        }
    }

    pub async fn execute<T>(
        &self,
        query: &T,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> Result<u64, tokio_postgres::Error>
    where
        T: ?Sized + ToStatement,
    {
        match self {
            DatabaseClient::Pooled(client) => client.execute(query, params).await,
            DatabaseClient::Direct(client) => client.execute(query, params).await,
        }
    }
}

/// Abstracts over the different transaction types the client variants hand
/// out. Dropping it without `commit` rolls the transaction back.
pub enum TransactionWrapper<'a> {
    Pooled(deadpool_postgres::Transaction<'a>),
    Direct(tokio_postgres::Transaction<'a>),
}

impl TransactionWrapper<'_> {
    pub async fn commit(self) -> Result<(), tokio_postgres::Error> {
        match self {
            TransactionWrapper::Pooled(tx) => tx.commit().await,
            TransactionWrapper::Direct(tx) => tx.commit().await,
        }
    }

    pub async fn rollback(self) -> Result<(), tokio_postgres::Error> {
        match self {
            TransactionWrapper::Pooled(tx) => tx.rollback().await,
            TransactionWrapper::Direct(tx) => tx.rollback().await,
        }
    }
}

impl<'a> Deref for TransactionWrapper<'a> {
    type Target = tokio_postgres::Transaction<'a>;

    fn deref(&self) -> &Self::Target {
        match self {
            TransactionWrapper::Pooled(tx) => tx,
            TransactionWrapper::Direct(tx) => tx,
        }
    }
}

impl DerefMut for TransactionWrapper<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            TransactionWrapper::Pooled(tx) => tx,
            TransactionWrapper::Direct(tx) => tx,
        }
    }
}

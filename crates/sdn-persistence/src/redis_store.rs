// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `RedisStore`: the concrete `PersistenceStore` backend.
//!
//! Grounded on `original_source/src/core/redisdb/redisdatabase.cc`'s
//! `RedisDatabase` (`putValue`/`getValue`/`delValue`/`getKeys`/`clearDB`/
//! `setupMasterRole`/`setupSlaveOf`) and its `reconnect()` path through
//! `redisclient.cc`, which re-authenticates before re-selecting the
//! keyspace on every reconnect (recorded as an Open Question decision:
//! AUTH before SELECT). The structural pattern — a single shared
//! connection guarded by a mutex, lazily established and torn down on
//! error — follows `hdds-persistence/src/sqlite.rs`'s `SqliteStore { conn:
//! Mutex<Connection> }`, swapped for `redis`'s async multiplexed
//! connection in place of a blocking `rusqlite::Connection`.

use crate::store::PersistenceStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub struct RedisStore {
    client: redis::Client,
    conn: Mutex<Option<MultiplexedConnection>>,
    password: Option<String>,
    db_index: i64,
}

impl RedisStore {
    /// `address`/`port` come from `database-connector`; `password` and
    /// `db_index` are deployment-specific and not part of that config
    /// block today, so they are threaded through separately.
    pub fn new(address: &str, port: u16, password: Option<String>, db_index: i64) -> Result<Self> {
        let url = format!("redis://{address}:{port}/");
        let client = redis::Client::open(url).context("invalid redis address")?;
        Ok(RedisStore { client, conn: Mutex::new(None), password, db_index })
    }

    /// Returns the cached connection, opening (and AUTH/SELECT-ing) a
    /// fresh one if none is cached yet.
    async fn connection(&self) -> Result<MultiplexedConnection> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }
        let mut conn = self
            .client
            .get_multiplexed_tokio_connection()
            .await
            .context("failed to open redis connection")?;
        if let Some(password) = &self.password {
            redis::cmd("AUTH")
                .arg(password)
                .query_async::<_, ()>(&mut conn)
                .await
                .context("redis AUTH failed")?;
        }
        redis::cmd("SELECT")
            .arg(self.db_index)
            .query_async::<_, ()>(&mut conn)
            .await
            .context("redis SELECT failed")?;
        info!("redis connection established and keyspace {} selected", self.db_index);
        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Drops the cached connection so the next call re-establishes it
    /// (and re-runs AUTH/SELECT) from scratch.
    async fn invalidate(&self) {
        *self.conn.lock().await = None;
    }
}

#[async_trait]
impl PersistenceStore for RedisStore {
    async fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        match conn.set::<_, _, ()>(key, value).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("redis SET {} failed: {}", key, e);
                self.invalidate().await;
                Err(e.into())
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        match conn.get::<_, Option<String>>(key).await {
            Ok(value) => Ok(value),
            Err(e) => {
                warn!("redis GET {} failed: {}", key, e);
                self.invalidate().await;
                Err(e.into())
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        match conn.del::<_, ()>(key).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("redis DEL {} failed: {}", key, e);
                self.invalidate().await;
                Err(e.into())
            }
        }
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut conn = self.connection().await?;
        let pattern = format!("{prefix}*");
        match conn.keys::<_, Vec<String>>(&pattern).await {
            Ok(keys) => Ok(keys),
            Err(e) => {
                warn!("redis KEYS {} failed: {}", pattern, e);
                self.invalidate().await;
                Err(e.into())
            }
        }
    }

    async fn clear(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        redis::cmd("FLUSHDB").query_async::<_, ()>(&mut conn).await.map_err(|e| {
            warn!("redis FLUSHDB failed: {}", e);
            e
        })?;
        Ok(())
    }

    async fn setup_master_role(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        redis::cmd("REPLICAOF")
            .arg("NO")
            .arg("ONE")
            .query_async::<_, ()>(&mut conn)
            .await
            .context("redis REPLICAOF NO ONE failed")?;
        info!("datastore promoted to master");
        Ok(())
    }

    async fn setup_slave_of(&self, address: &str, port: u16) -> Result<()> {
        let mut conn = self.connection().await?;
        redis::cmd("REPLICAOF")
            .arg(address)
            .arg(port)
            .query_async::<_, ()>(&mut conn)
            .await
            .context("redis REPLICAOF failed")?;
        info!("datastore configured as replica of {}:{}", address, port);
        Ok(())
    }
}

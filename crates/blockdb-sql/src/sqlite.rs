//! SQLite-backed relational store, for embedded use and tests.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use blockdb_store::{KvError, KvResult, WriteBuffer};
use blockdb_types::ContentAddress;
use bytes::Bytes;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite, SqliteConnection};
use tracing::{debug, info};

use crate::backend::{PoolStats, RelationalBackend};
use crate::error::sql_error;
use crate::schema::{
    DELETE_BLOCK, DELETE_BLOCK_PREIMAGES, DELETE_PREIMAGE, GET_BLOCK, HAS_BLOCK, PUT_BLOCK,
    PUT_PREIMAGE, SCAN_PREIMAGES, SQLITE_DB_SIZE, SQLITE_SCHEMA,
};

const BACKEND: &str = "sqlite";

fn db_err(err: sqlx::Error) -> KvError {
    sql_error(BACKEND, err)
}

pub struct SqliteBackend {
    pool: Pool<Sqlite>,
}

impl SqliteBackend {
    /// Connect with a `sqlite:` URL, creating the file if missing.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        busy_timeout: Option<Duration>,
    ) -> KvResult<Self> {
        let opts = SqliteConnectOptions::from_str(url)
            .map_err(db_err)?
            .create_if_missing(true);
        Self::connect(opts, max_connections, busy_timeout).await
    }

    /// Open a database file, creating it if missing.
    pub async fn open(path: impl AsRef<Path>, max_connections: u32) -> KvResult<Self> {
        let opts = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        Self::connect(opts, max_connections, None).await
    }

    async fn connect(
        mut opts: SqliteConnectOptions,
        max_connections: u32,
        busy_timeout: Option<Duration>,
    ) -> KvResult<Self> {
        if let Some(timeout) = busy_timeout {
            opts = opts.busy_timeout(timeout);
        }
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await
            .map_err(db_err)?;
        info!(backend = BACKEND, max_connections, "connected to relational store");

        let backend = Self { pool };
        backend.migrate().await?;
        Ok(backend)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

async fn put_in(
    conn: &mut SqliteConnection,
    key: &[u8],
    address: &ContentAddress,
    value: &[u8],
) -> KvResult<()> {
    sqlx::query(PUT_BLOCK)
        .bind(address.as_str())
        .bind(value)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    sqlx::query(PUT_PREIMAGE)
        .bind(key)
        .bind(address.as_str())
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    Ok(())
}

async fn delete_in(
    conn: &mut SqliteConnection,
    key: &[u8],
    address: &ContentAddress,
) -> KvResult<()> {
    sqlx::query(DELETE_PREIMAGE)
        .bind(key)
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    sqlx::query(DELETE_BLOCK_PREIMAGES)
        .bind(address.as_str())
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    sqlx::query(DELETE_BLOCK)
        .bind(address.as_str())
        .execute(&mut *conn)
        .await
        .map_err(db_err)?;
    Ok(())
}

#[async_trait]
impl RelationalBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn migrate(&self) -> KvResult<()> {
        for statement in SQLITE_SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        }
        info!(backend = BACKEND, "schema ready");
        Ok(())
    }

    async fn has(&self, address: &ContentAddress) -> KvResult<bool> {
        sqlx::query_scalar::<_, bool>(HAS_BLOCK)
            .bind(address.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn get(&self, address: &ContentAddress) -> KvResult<Option<Bytes>> {
        let data = sqlx::query_scalar::<_, Vec<u8>>(GET_BLOCK)
            .bind(address.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(data.map(Bytes::from))
    }

    async fn put(&self, key: &[u8], address: &ContentAddress, value: &[u8]) -> KvResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        put_in(&mut tx, key, address, value).await?;
        tx.commit().await.map_err(db_err)
    }

    async fn delete(&self, key: &[u8], address: &ContentAddress) -> KvResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        delete_in(&mut tx, key, address).await?;
        tx.commit().await.map_err(db_err)
    }

    async fn apply(&self, buffer: &WriteBuffer) -> KvResult<()> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        for (key, address, value) in buffer.puts() {
            put_in(&mut tx, key, address, value).await?;
        }
        for (key, address) in buffer.deletes() {
            delete_in(&mut tx, key, address).await?;
        }
        tx.commit().await.map_err(db_err)?;
        debug!(
            backend = BACKEND,
            puts = buffer.put_count(),
            deletes = buffer.delete_count(),
            "batch committed"
        );
        Ok(())
    }

    async fn scan_keys(&self, from: &[u8], limit: usize) -> KvResult<Vec<Vec<u8>>> {
        sqlx::query_scalar::<_, Vec<u8>>(SCAN_PREIMAGES)
            .bind(from)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn database_size(&self) -> KvResult<u64> {
        let size = sqlx::query_scalar::<_, i64>(SQLITE_DB_SIZE)
            .fetch_one(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(size.max(0) as u64)
    }

    fn pool_stats(&self) -> PoolStats {
        PoolStats {
            open: self.pool.size(),
            idle: self.pool.num_idle() as u32,
            max: self.pool.options().get_max_connections(),
        }
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

//! PostgreSQL-backed relational store.

use std::str::FromStr;

use async_trait::async_trait;
use blockdb_store::{KvError, KvResult, WriteBuffer};
use blockdb_types::ContentAddress;
use bytes::Bytes;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info};

use crate::backend::{PoolStats, RelationalBackend};
use crate::error::sql_error;
use crate::schema::{
    DELETE_BLOCK, DELETE_BLOCK_PREIMAGES, DELETE_PREIMAGE, GET_BLOCK, HAS_BLOCK,
    POSTGRES_DB_SIZE, POSTGRES_SCHEMA, PUT_BLOCK, PUT_PREIMAGE, SCAN_PREIMAGES,
};

const BACKEND: &str = "postgres";

fn db_err(err: sqlx::Error) -> KvError {
    sql_error(BACKEND, err)
}

pub struct PostgresBackend {
    pool: PgPool,
}

impl PostgresBackend {
    /// Connect with a `postgres://` URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> KvResult<Self> {
        let opts = PgConnectOptions::from_str(url).map_err(db_err)?;
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> KvResult<Self> {
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{timeout_ms}ms"))]);
            info!(timeout_ms, "PostgreSQL statement_timeout set");
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await
            .map_err(db_err)?;
        info!(backend = BACKEND, max_connections, "connected to relational store");

        let backend = Self { pool };
        backend.migrate().await?;
        Ok(backend)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

async fn put_in(
    conn: &mut PgConnection,
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

async fn delete_in(conn: &mut PgConnection, key: &[u8], address: &ContentAddress) -> KvResult<()> {
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
impl RelationalBackend for PostgresBackend {
    fn name(&self) -> &'static str {
        BACKEND
    }

    async fn migrate(&self) -> KvResult<()> {
        for statement in POSTGRES_SCHEMA {
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
        let size = sqlx::query_scalar::<_, i64>(POSTGRES_DB_SIZE)
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

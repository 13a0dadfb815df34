//! blockdb database over a relational block table.
//!
//! [`SqlDatabase`] stores values in a `blocks` table keyed by blockstore key
//! and keeps a `preimages` index from client keys to those addresses. The
//! index makes single writes and batches transactional and gives ordered
//! iteration. PostgreSQL and SQLite are both supported through sqlx.

pub mod backend;
pub mod batch;
pub mod config;
pub mod database;
mod error;
pub mod iterator;
pub mod postgres;
mod schema;
pub mod sqlite;

pub use backend::{PoolStats, RelationalBackend};
pub use batch::SqlBatch;
pub use config::SqlConfig;
pub use database::SqlDatabase;
pub use iterator::SqlIterator;
pub use postgres::PostgresBackend;
pub use sqlite::SqliteBackend;

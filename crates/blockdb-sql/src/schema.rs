//! SQL shared by both relational backends.
//!
//! Placeholders use the `$N` form, which PostgreSQL and SQLite both accept.
//! Every parameter first appears in ascending order so SQLite assigns the
//! same indices PostgreSQL does.

pub(crate) const SQLITE_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS blocks (key TEXT PRIMARY KEY, data BLOB NOT NULL)",
    "CREATE TABLE IF NOT EXISTS preimages (original_key BLOB PRIMARY KEY, key TEXT NOT NULL)",
    "CREATE INDEX IF NOT EXISTS preimages_key_idx ON preimages (key)",
];

pub(crate) const POSTGRES_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS blocks (key TEXT PRIMARY KEY, data BYTEA NOT NULL)",
    "CREATE TABLE IF NOT EXISTS preimages (original_key BYTEA PRIMARY KEY, key TEXT NOT NULL)",
    "CREATE INDEX IF NOT EXISTS preimages_key_idx ON preimages (key)",
];

pub(crate) const HAS_BLOCK: &str = "SELECT EXISTS(SELECT 1 FROM blocks WHERE key = $1)";

pub(crate) const GET_BLOCK: &str = "SELECT data FROM blocks WHERE key = $1";

pub(crate) const PUT_BLOCK: &str = "INSERT INTO blocks (key, data) VALUES ($1, $2) \
     ON CONFLICT (key) DO UPDATE SET data = excluded.data";

pub(crate) const PUT_PREIMAGE: &str = "INSERT INTO preimages (original_key, key) VALUES ($1, $2) \
     ON CONFLICT (original_key) DO UPDATE SET key = excluded.key";

pub(crate) const DELETE_PREIMAGE: &str = "DELETE FROM preimages WHERE original_key = $1";

/// Drops every alias of a block, so no other client key can still read it.
pub(crate) const DELETE_BLOCK_PREIMAGES: &str = "DELETE FROM preimages WHERE key = $1";

pub(crate) const DELETE_BLOCK: &str = "DELETE FROM blocks WHERE key = $1";

pub(crate) const SCAN_PREIMAGES: &str = "SELECT original_key FROM preimages \
     WHERE original_key >= $1 ORDER BY original_key LIMIT $2";

pub(crate) const SQLITE_DB_SIZE: &str =
    "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()";

pub(crate) const POSTGRES_DB_SIZE: &str = "SELECT pg_database_size(current_database())";

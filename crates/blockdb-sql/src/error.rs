use blockdb_store::KvError;

/// Map a driver error, keeping `RowNotFound` distinguishable.
pub(crate) fn sql_error(backend: &'static str, err: sqlx::Error) -> KvError {
    match err {
        sqlx::Error::RowNotFound => KvError::NotFound("row".into()),
        other => KvError::backend(backend, other),
    }
}

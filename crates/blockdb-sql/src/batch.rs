use std::sync::Arc;

use async_trait::async_trait;
use blockdb_store::{Batch, BlockCache, KeyValueWriter, KvResult, WriteBuffer};
use blockdb_types::ClassifiedKey;
use tracing::debug;

use crate::backend::RelationalBackend;

/// Batch over the relational store. `write` is a single transaction.
pub struct SqlBatch {
    backend: Arc<dyn RelationalBackend>,
    cache: Arc<BlockCache>,
    buffer: WriteBuffer,
}

impl SqlBatch {
    pub(crate) fn new(
        backend: Arc<dyn RelationalBackend>,
        cache: Arc<BlockCache>,
        buffer: WriteBuffer,
    ) -> Self {
        Self {
            backend,
            cache,
            buffer,
        }
    }

    pub fn buffer(&self) -> &WriteBuffer {
        &self.buffer
    }
}

#[async_trait]
impl Batch for SqlBatch {
    fn put_classified(&mut self, key: &ClassifiedKey<'_>, value: &[u8]) -> KvResult<()> {
        self.buffer.put_classified(key, value)
    }

    fn delete_classified(&mut self, key: &ClassifiedKey<'_>) -> KvResult<()> {
        self.buffer.delete_classified(key)
    }

    fn value_size(&self) -> usize {
        self.buffer.value_size()
    }

    async fn write(&mut self) -> KvResult<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.backend.apply(&self.buffer).await?;
        for (_, address) in self.buffer.deletes() {
            self.cache.invalidate(address);
        }
        debug!(
            backend = self.backend.name(),
            value_size = self.buffer.value_size(),
            "relational batch flushed"
        );
        Ok(())
    }

    fn reset(&mut self) {
        self.buffer.reset();
    }

    async fn replay(&self, writer: &dyn KeyValueWriter) -> KvResult<()> {
        self.buffer.replay(writer).await
    }
}

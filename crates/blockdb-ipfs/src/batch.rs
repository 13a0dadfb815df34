use std::sync::Arc;

use async_trait::async_trait;
use blockdb_store::{Batch, BlockCache, BlockStore, KeyValueWriter, KvResult, WriteBuffer};
use blockdb_types::{ClassifiedKey, ContentAddress};
use bytes::Bytes;
use tracing::debug;

/// Batch over a block service.
///
/// `write` stores every buffered put with one batch-add call, then removes
/// the buffered deletes one at a time. The block service has no
/// transactions: a failure aborts the remaining steps but leaves earlier
/// ones applied.
pub struct BlockServiceBatch {
    service: Arc<dyn BlockStore>,
    cache: Arc<BlockCache>,
    buffer: WriteBuffer,
}

impl BlockServiceBatch {
    pub(crate) fn new(
        service: Arc<dyn BlockStore>,
        cache: Arc<BlockCache>,
        buffer: WriteBuffer,
    ) -> Self {
        Self {
            service,
            cache,
            buffer,
        }
    }

    pub fn buffer(&self) -> &WriteBuffer {
        &self.buffer
    }
}

#[async_trait]
impl Batch for BlockServiceBatch {
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
        let blocks: Vec<(ContentAddress, Bytes)> = self
            .buffer
            .puts()
            .map(|(_, address, value)| (address.clone(), value.clone()))
            .collect();
        let stored = blocks.len();
        if !blocks.is_empty() {
            self.service.store_batch(blocks).await?;
        }
        for (_, address) in self.buffer.deletes() {
            self.service.remove(address).await?;
            self.cache.invalidate(address);
        }
        debug!(
            puts = stored,
            deletes = self.buffer.delete_count(),
            value_size = self.buffer.value_size(),
            "block service batch flushed"
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

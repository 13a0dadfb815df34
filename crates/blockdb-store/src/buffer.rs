use std::sync::Arc;

use blockdb_types::{AddressScheme, ClassifiedKey, ContentAddress};
use bytes::Bytes;
use tracing::warn;

use crate::error::{KvError, KvResult};
use crate::lru::BoundedLru;
use crate::traits::KeyValueWriter;

/// Pending writes shared by every [`Batch`](crate::Batch) implementation.
///
/// Puts and deletes live in two independent LRU buckets keyed by the raw
/// key, each holding at most `capacity` entries. The backend address is
/// derived when an operation is buffered, so classification and encoding
/// failures surface immediately. Flushing never clears the buffer; only
/// [`reset`](WriteBuffer::reset) does.
pub struct WriteBuffer {
    scheme: Arc<dyn AddressScheme>,
    puts: BoundedLru<Vec<u8>, (ContentAddress, Bytes)>,
    deletes: BoundedLru<Vec<u8>, ContentAddress>,
    value_size: usize,
}

impl WriteBuffer {
    pub fn new(scheme: Arc<dyn AddressScheme>, capacity: usize) -> KvResult<Self> {
        Ok(Self {
            scheme,
            puts: BoundedLru::new(capacity)?,
            deletes: BoundedLru::new(capacity)?,
            value_size: 0,
        })
    }

    /// Buffer a put.
    ///
    /// The value size is counted even when the insert overflows the bucket;
    /// on overflow the put is kept and [`KvError::EvictionWarning`] names the
    /// key that was dropped.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> KvResult<()> {
        self.put_classified(&ClassifiedKey::classify(key)?, value)
    }

    /// Buffer a put for a key whose class the caller already knows.
    pub fn put_classified(&mut self, key: &ClassifiedKey<'_>, value: &[u8]) -> KvResult<()> {
        let address = self.scheme.derive(key)?;
        self.value_size += value.len();
        match self
            .puts
            .insert(key.raw().to_vec(), (address, Bytes::copy_from_slice(value)))
        {
            Some((evicted, _)) => Err(self.overflow("put", &evicted)),
            None => Ok(()),
        }
    }

    /// Buffer a delete, with the same overflow behaviour as [`put`](Self::put).
    pub fn delete(&mut self, key: &[u8]) -> KvResult<()> {
        self.delete_classified(&ClassifiedKey::classify(key)?)
    }

    pub fn delete_classified(&mut self, key: &ClassifiedKey<'_>) -> KvResult<()> {
        let address = self.scheme.derive(key)?;
        match self.deletes.insert(key.raw().to_vec(), address) {
            Some((evicted, _)) => Err(self.overflow("delete", &evicted)),
            None => Ok(()),
        }
    }

    fn overflow(&self, kind: &'static str, evicted: &[u8]) -> KvError {
        let key = hex::encode(evicted);
        warn!(kind, key = %key, capacity = self.puts.capacity(), "batch buffer overflow evicted pending write");
        KvError::EvictionWarning { kind, key }
    }

    pub fn value_size(&self) -> usize {
        self.value_size
    }

    pub fn reset(&mut self) {
        self.puts.clear();
        self.deletes.clear();
        self.value_size = 0;
    }

    /// Buffered puts, oldest first.
    pub fn puts(&self) -> impl Iterator<Item = (&[u8], &ContentAddress, &Bytes)> + '_ {
        self.puts
            .iter()
            .map(|(key, (address, value))| (key.as_slice(), address, value))
    }

    /// Buffered deletes, oldest first.
    pub fn deletes(&self) -> impl Iterator<Item = (&[u8], &ContentAddress)> + '_ {
        self.deletes
            .iter()
            .map(|(key, address)| (key.as_slice(), address))
    }

    pub fn put_count(&self) -> usize {
        self.puts.len()
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.puts.is_empty() && self.deletes.is_empty()
    }

    /// Apply buffered puts, then deletes, through `writer`.
    pub async fn replay(&self, writer: &dyn KeyValueWriter) -> KvResult<()> {
        for (key, _, value) in self.puts() {
            writer.put(key, value).await?;
        }
        for (key, _) in self.deletes() {
            writer.delete(key).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for WriteBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteBuffer")
            .field("scheme", &self.scheme.name())
            .field("puts", &self.puts.len())
            .field("deletes", &self.deletes.len())
            .field("value_size", &self.value_size)
            .finish()
    }
}

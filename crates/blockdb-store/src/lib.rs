//! Store contracts for blockdb.
//!
//! Defines the database facade every backend exposes, the [`BlockStore`]
//! interface consumed by the block-service backend, the shared error
//! taxonomy, and the [`WriteBuffer`] behind every batch.

pub mod buffer;
pub mod config;
pub mod error;
pub mod lru;
pub mod memory;
pub mod stat;
pub mod traits;

pub use buffer::WriteBuffer;
pub use config::StoreConfig;
pub use error::{KvError, KvResult};
pub use lru::BoundedLru;
pub use memory::{CallCounts, InMemoryBlockStore, InjectedFault};
pub use stat::cache_property;
pub use traits::{
    AncientStore, Batch, Batcher, BlockStore, Compacter, Database, Iteratee, IteratorState,
    KeyValueReader, KeyValueStore, KeyValueWriter, KvIterator, Snapshotter, Stater,
};

/// Read cache keyed by backend address.
pub type BlockCache = blockdb_cache::ReadCache<blockdb_types::ContentAddress, KvError>;

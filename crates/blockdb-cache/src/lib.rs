//! Read cache for blockdb backends.
//!
//! [`ReadCache`] sits in front of a slow or network-bound store. It bounds
//! memory by the summed size of cached values, expires entries after a
//! fixed TTL, and guarantees that concurrent misses for one key trigger a
//! single backend fetch. Caches are explicit handles: each database owns or
//! shares an `Arc<ReadCache<_, _>>` and nothing is registered globally.

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheStats, ReadCache};
pub use config::CacheConfig;
pub use error::{CacheError, FetchTimeout};

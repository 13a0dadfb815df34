//! blockdb database over a content-addressed block service.
//!
//! [`BlockServiceDatabase`] maps flat keys onto CIDv1 addresses and talks to
//! any [`BlockStore`](blockdb_store::BlockStore) implementation, typically an
//! IPFS block service whose exchange can fetch missing blocks from peers.

pub mod batch;
pub mod database;

pub use batch::BlockServiceBatch;
pub use database::BlockServiceDatabase;

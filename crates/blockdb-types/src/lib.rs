//! Foundation types for blockdb.
//!
//! This crate turns the flat, digest-keyed keys used by clients into the
//! native addresses of each backing store. Every other blockdb crate depends
//! on `blockdb-types`.
//!
//! # Key Types
//!
//! - [`Digest`]: 32-byte caller-supplied content hash
//! - [`KeyClass`] / [`ClassifiedKey`]: structural variant of a raw key
//! - [`ContentAddress`]: backend-native address string
//! - [`AddressScheme`]: [`CidScheme`] for block services, [`BlockstoreKeyScheme`] for tables
//! - [`Codec`]: content-type tag carried in CIDs

pub mod address;
pub mod codec;
pub mod digest;
pub mod encoding;
pub mod error;
pub mod key;

pub use address::{
    blockstore_key, derive, AddressScheme, BlockstoreKeyScheme, CidScheme, ContentAddress,
};
pub use codec::Codec;
pub use digest::{Digest, DIGEST_LEN};
pub use encoding::{Cid, HashCode, Multihash};
pub use error::TypeError;
pub use key::{classify, AddressSource, ClassifiedKey, KeyClass};

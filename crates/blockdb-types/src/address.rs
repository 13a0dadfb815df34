//! Content-address derivation.
//!
//! Each backend has its own native addressing scheme. Both are pure
//! functions of the classified key and the scheme parameters, so the same
//! input always produces the same address byte for byte.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::Codec;
use crate::digest::Digest;
use crate::encoding::{cid_v1, datastore_key, digest_multihash, identity_multihash, Cid, HashCode};
use crate::error::TypeError;
use crate::key::{AddressSource, ClassifiedKey};

/// Namespace prefix of datastore keys for blocks.
pub const BLOCKS_PREFIX: &str = "/blocks/";

/// A backend-native key string.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentAddress(String);

impl ContentAddress {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentAddress({})", self.0)
    }
}

impl fmt::Display for ContentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ContentAddress {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Maps classified keys to a backend's native addresses.
pub trait AddressScheme: Send + Sync + fmt::Debug {
    /// Derive the address for an already-classified key.
    fn derive(&self, key: &ClassifiedKey<'_>) -> Result<ContentAddress, TypeError>;

    /// Classify `raw` heuristically, then derive.
    fn derive_key(&self, raw: &[u8]) -> Result<ContentAddress, TypeError> {
        self.derive(&ClassifiedKey::classify(raw)?)
    }

    fn name(&self) -> &'static str;
}

/// CIDv1 strings, as understood by a block service.
///
/// Digests are wrapped as `hash` multihashes tagged with `codec`. Verbatim
/// keys are embedded in an identity multihash under the `raw` codec.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CidScheme {
    codec: Codec,
    hash: HashCode,
}

impl CidScheme {
    pub const fn new(codec: Codec, hash: HashCode) -> Self {
        Self { codec, hash }
    }

    pub const fn keccak(codec: Codec) -> Self {
        Self::new(codec, HashCode::Keccak256)
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    /// Build the CID for `key` without rendering it.
    pub fn cid(&self, key: &ClassifiedKey<'_>) -> Result<Cid, TypeError> {
        match key.address_source()? {
            AddressSource::Digest(digest) => {
                Ok(cid_v1(self.codec, digest_multihash(self.hash, &digest)?))
            }
            AddressSource::Verbatim(raw) => Ok(cid_v1(Codec::Raw, identity_multihash(raw)?)),
        }
    }
}

impl Default for CidScheme {
    fn default() -> Self {
        Self::keccak(Codec::default())
    }
}

impl AddressScheme for CidScheme {
    fn derive(&self, key: &ClassifiedKey<'_>) -> Result<ContentAddress, TypeError> {
        self.cid(key).map(|cid| ContentAddress(cid.to_string()))
    }

    fn name(&self) -> &'static str {
        "cid"
    }
}

/// Flat-namespace datastore keys, as used by the relational block table.
///
/// Digests become `/blocks/` followed by the upper-case unpadded base32 of
/// the multihash. Verbatim keys are stored as lower-case hex.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockstoreKeyScheme {
    hash: HashCode,
}

impl BlockstoreKeyScheme {
    pub const fn new(hash: HashCode) -> Self {
        Self { hash }
    }
}

impl Default for BlockstoreKeyScheme {
    fn default() -> Self {
        Self::new(HashCode::Keccak256)
    }
}

impl AddressScheme for BlockstoreKeyScheme {
    fn derive(&self, key: &ClassifiedKey<'_>) -> Result<ContentAddress, TypeError> {
        match key.address_source()? {
            AddressSource::Digest(digest) => blockstore_key_with(self.hash, &digest),
            AddressSource::Verbatim(raw) => Ok(ContentAddress(hex::encode(raw))),
        }
    }

    fn name(&self) -> &'static str {
        "blockstore-key"
    }
}

/// CIDv1 address for a keccak-256 digest tagged with `codec`.
pub fn derive(digest: &Digest, codec: Codec) -> Result<ContentAddress, TypeError> {
    let cid = cid_v1(codec, digest_multihash(HashCode::Keccak256, digest)?);
    Ok(ContentAddress(cid.to_string()))
}

/// Datastore key for a keccak-256 digest.
pub fn blockstore_key(digest: &Digest) -> Result<ContentAddress, TypeError> {
    blockstore_key_with(HashCode::Keccak256, digest)
}

fn blockstore_key_with(hash: HashCode, digest: &Digest) -> Result<ContentAddress, TypeError> {
    let mh = digest_multihash(hash, digest)?;
    Ok(ContentAddress(format!("{BLOCKS_PREFIX}{}", datastore_key(&mh))))
}

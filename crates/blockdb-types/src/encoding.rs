//! Multihash, CID and datastore-key encoding on top of the `multihash`,
//! `cid` and `data-encoding` crates.

use data_encoding::BASE32_NOPAD;
use serde::{Deserialize, Serialize};

use crate::codec::Codec;
use crate::digest::Digest;
use crate::error::TypeError;

/// Largest digest (and identity payload) a [`Multihash`] can carry.
pub const MAX_IDENTITY_LEN: usize = 128;

pub type Multihash = multihash::Multihash<MAX_IDENTITY_LEN>;

/// Version-1 content identifier sized to hold any [`Multihash`].
pub type Cid = cid::CidGeneric<MAX_IDENTITY_LEN>;

/// Multihash function codes understood by the adapter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HashCode {
    #[serde(rename = "identity")]
    Identity,
    #[serde(rename = "keccak-256")]
    Keccak256,
}

impl HashCode {
    /// The multicodec table code.
    pub const fn code(self) -> u64 {
        match self {
            Self::Identity => 0x00,
            Self::Keccak256 => 0x1b,
        }
    }
}

/// Tag a caller-supplied digest with the function that produced it.
pub fn digest_multihash(code: HashCode, digest: &Digest) -> Result<Multihash, TypeError> {
    wrap(code, digest.as_bytes())
}

/// Embed raw bytes verbatim using the identity function.
pub fn identity_multihash(data: &[u8]) -> Result<Multihash, TypeError> {
    wrap(HashCode::Identity, data)
}

fn wrap(code: HashCode, data: &[u8]) -> Result<Multihash, TypeError> {
    Multihash::wrap(code.code(), data).map_err(|e| {
        TypeError::Encoding(format!(
            "{} byte payload for multihash {:#x}: {e}",
            data.len(),
            code.code()
        ))
    })
}

pub fn cid_v1(codec: Codec, hash: Multihash) -> Cid {
    Cid::new_v1(codec.code(), hash)
}

/// Upper-case unpadded base32 of the binary multihash.
pub fn datastore_key(hash: &Multihash) -> String {
    BASE32_NOPAD.encode(&hash.to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keccak(byte: u8) -> Multihash {
        digest_multihash(HashCode::Keccak256, &Digest::from_array([byte; 32])).unwrap()
    }

    // ---- multihash ----

    #[test]
    fn keccak_multihash_layout() {
        let bytes = keccak(0xaa).to_bytes();
        assert_eq!(bytes.len(), 34);
        assert_eq!(&bytes[..2], &[0x1b, 0x20]);
        assert_eq!(&bytes[2..], &[0xaa; 32]);
    }

    #[test]
    fn identity_rejects_oversized_payload() {
        assert!(identity_multihash(&[0; MAX_IDENTITY_LEN]).is_ok());
        assert!(matches!(
            identity_multihash(&[0; MAX_IDENTITY_LEN + 1]),
            Err(TypeError::Encoding(_))
        ));
    }

    // ---- cid ----

    #[test]
    fn cid_binary_layout() {
        let bytes = cid_v1(Codec::EthStateTrie, keccak(0x5a)).to_bytes();
        assert_eq!(&bytes[..5], &[0x01, 0x96, 0x01, 0x1b, 0x20]);
        assert_eq!(bytes.len(), 5 + 32);
    }

    #[test]
    fn cid_strings_match_known_ethereum_prefixes() {
        assert!(cid_v1(Codec::EthStateTrie, keccak(0x5a))
            .to_string()
            .starts_with("baglacgza"));
        assert!(cid_v1(Codec::EthBlock, keccak(0x5a))
            .to_string()
            .starts_with("bagiacgza"));
    }

    #[test]
    fn raw_identity_cid() {
        let cid = cid_v1(Codec::Raw, identity_multihash(b"\x01\x02").unwrap());
        assert_eq!(cid.to_bytes(), vec![0x01, 0x55, 0x00, 0x02, 0x01, 0x02]);
        assert_eq!(cid.to_string(), "bafkqaaqbai");
    }

    // ---- datastore key ----

    #[test]
    fn datastore_key_is_upper_base32_without_padding() {
        let key = datastore_key(&keccak(0));
        assert!(key.starts_with("DMQ"));
        assert!(!key.contains('='));
        assert_eq!(key.len(), (34 * 8usize).div_ceil(5));
    }
}

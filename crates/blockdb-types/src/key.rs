//! Structural classification of raw keys.
//!
//! Keys arriving from the client are either bare digests or one of a few
//! multi-part layouts joined by [`KEY_DELINEATION`]. The classifier infers
//! the layout purely from byte length and fixed marker sequences, so it is
//! ambiguous by construction: a 32-byte literal key is indistinguishable from
//! a digest. Callers that already know a key's origin should build a
//! [`ClassifiedKey`] directly with [`ClassifiedKey::hashed`] or
//! [`ClassifiedKey::literal`] instead of running the heuristic.

use crate::digest::{Digest, DIGEST_LEN};
use crate::error::TypeError;

/// Separates key prefixes and suffixes.
pub const KEY_DELINEATION: &[u8] = b"-fix-";

/// Separates the block number from the hash inside a header key.
pub const NUMBER_DELINEATION: &[u8] = b"-nmb-";

/// Marker for header keys: `h` + delineator + number + `-nmb-` + hash.
pub const HEADER_PREFIX: &[u8] = b"h";

/// Marker for preimage keys: `secure-key-` + delineator + hash.
pub const PREIMAGE_PREFIX: &[u8] = b"secure-key-";

/// Structural variant of a key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KeyClass<'a> {
    /// Short opaque key that is not a digest.
    StaticLiteral,
    /// Bare digest.
    Hashed,
    /// Known structural tag followed by number/hash sub-parts.
    PrefixTagged { tag: &'a [u8], parts: Vec<&'a [u8]> },
    /// Preimage marker followed by the hash.
    PreimageTagged { remainder: &'a [u8] },
    /// Two-part key that is not hash-addressed.
    Prefixed { parts: Vec<&'a [u8]> },
    /// Three-part key that is not hash-addressed.
    Suffixed { parts: Vec<&'a [u8]> },
}

impl KeyClass<'_> {
    /// Short name used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StaticLiteral => "static",
            Self::Hashed => "hashed",
            Self::PrefixTagged { .. } => "header",
            Self::PreimageTagged { .. } => "preimage",
            Self::Prefixed { .. } => "prefixed",
            Self::Suffixed { .. } => "suffixed",
        }
    }
}

/// Where a content address is derived from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AddressSource<'a> {
    /// Derive from an embedded digest.
    Digest(Digest),
    /// Store under the raw key; it has no stable digest-derived address.
    Verbatim(&'a [u8]),
}

/// A raw key paired with its structural class.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassifiedKey<'a> {
    raw: &'a [u8],
    class: KeyClass<'a>,
}

impl<'a> ClassifiedKey<'a> {
    /// Classify an untyped key with the length/marker heuristic.
    pub fn classify(raw: &'a [u8]) -> Result<Self, TypeError> {
        let class = classify(raw)?;
        Ok(Self { raw, class })
    }

    /// A key the caller knows to be a bare digest.
    pub fn hashed(digest: &'a Digest) -> Self {
        Self {
            raw: digest.as_bytes(),
            class: KeyClass::Hashed,
        }
    }

    /// A key the caller knows to be an opaque literal, whatever its length.
    pub fn literal(raw: &'a [u8]) -> Self {
        Self {
            raw,
            class: KeyClass::StaticLiteral,
        }
    }

    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    pub fn class(&self) -> &KeyClass<'a> {
        &self.class
    }

    /// Resolve the component the backend address is derived from.
    ///
    /// Hash-addressed variants yield their embedded digest, which must be
    /// exactly [`DIGEST_LEN`] bytes. Every other variant is stored verbatim.
    pub fn address_source(&self) -> Result<AddressSource<'a>, TypeError> {
        match &self.class {
            KeyClass::Hashed => Digest::from_slice(self.raw).map(AddressSource::Digest),
            KeyClass::PrefixTagged { parts, .. } => {
                let hash = parts.get(1).ok_or(TypeError::MalformedDigest {
                    expected: DIGEST_LEN,
                    actual: 0,
                })?;
                Digest::from_slice(hash).map(AddressSource::Digest)
            }
            KeyClass::PreimageTagged { remainder } => {
                Digest::from_slice(remainder).map(AddressSource::Digest)
            }
            KeyClass::StaticLiteral | KeyClass::Prefixed { .. } | KeyClass::Suffixed { .. } => {
                Ok(AddressSource::Verbatim(self.raw))
            }
        }
    }
}

/// Classify a raw key by splitting it on [`KEY_DELINEATION`].
pub fn classify(key: &[u8]) -> Result<KeyClass<'_>, TypeError> {
    let parts = split_on(key, KEY_DELINEATION);
    match parts.len() {
        1 if parts[0].len() < DIGEST_LEN => Ok(KeyClass::StaticLiteral),
        1 => Ok(KeyClass::Hashed),
        2 => {
            let remainder = parts[1];
            if parts[0] == HEADER_PREFIX {
                Ok(KeyClass::PrefixTagged {
                    tag: parts[0],
                    parts: split_on(remainder, NUMBER_DELINEATION),
                })
            } else if parts[0] == PREIMAGE_PREFIX {
                Ok(KeyClass::PreimageTagged { remainder })
            } else {
                Ok(KeyClass::Prefixed { parts })
            }
        }
        3 => Ok(KeyClass::Suffixed { parts }),
        n => Err(TypeError::Unclassifiable {
            key: hex::encode(key),
            parts: n,
        }),
    }
}

/// Split `data` on every non-overlapping occurrence of `delim`.
///
/// Always yields at least one part; an input without the delimiter is a
/// single part equal to the input.
pub fn split_on<'a>(data: &'a [u8], delim: &[u8]) -> Vec<&'a [u8]> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while !delim.is_empty() && i + delim.len() <= data.len() {
        if &data[i..i + delim.len()] == delim {
            parts.push(&data[start..i]);
            i += delim.len();
            start = i;
        } else {
            i += 1;
        }
    }
    parts.push(&data[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn header_key(number: u64, hash: &[u8; 32]) -> Vec<u8> {
        let mut key = HEADER_PREFIX.to_vec();
        key.extend_from_slice(KEY_DELINEATION);
        key.extend_from_slice(&number.to_be_bytes());
        key.extend_from_slice(NUMBER_DELINEATION);
        key.extend_from_slice(hash);
        key
    }

    #[test]
    fn short_key_is_static_literal() {
        assert_eq!(classify(b"\x01\x02").unwrap(), KeyClass::StaticLiteral);
        assert_eq!(classify(b"").unwrap(), KeyClass::StaticLiteral);
    }

    #[test]
    fn thirty_two_zero_bytes_are_hashed() {
        assert_eq!(classify(&[0u8; 32]).unwrap(), KeyClass::Hashed);
    }

    #[test]
    fn longer_single_part_is_hashed() {
        assert_eq!(classify(&[9u8; 40]).unwrap(), KeyClass::Hashed);
    }

    #[test]
    fn header_key_is_prefix_tagged() {
        let hash = [0x11u8; 32];
        let key = header_key(0, &hash);
        match classify(&key).unwrap() {
            KeyClass::PrefixTagged { tag, parts } => {
                assert_eq!(tag, HEADER_PREFIX);
                assert_eq!(parts.len(), 2);
                assert_eq!(parts[0], &[0u8; 8]);
                assert_eq!(parts[1], &hash);
            }
            other => panic!("unexpected class: {other:?}"),
        }
    }

    #[test]
    fn preimage_key_is_preimage_tagged() {
        let mut key = PREIMAGE_PREFIX.to_vec();
        key.extend_from_slice(KEY_DELINEATION);
        key.extend_from_slice(&[0x22; 32]);
        assert_eq!(
            classify(&key).unwrap(),
            KeyClass::PreimageTagged {
                remainder: &[0x22; 32]
            }
        );
    }

    #[test]
    fn other_two_part_key_is_prefixed() {
        assert_eq!(
            classify(b"LastBlock-fix-tail").unwrap(),
            KeyClass::Prefixed {
                parts: vec![b"LastBlock".as_slice(), b"tail".as_slice()]
            }
        );
    }

    #[test]
    fn three_part_key_is_suffixed() {
        assert_eq!(
            classify(b"a-fix-b-fix-c").unwrap(),
            KeyClass::Suffixed {
                parts: vec![b"a".as_slice(), b"b".as_slice(), b"c".as_slice()]
            }
        );
    }

    #[test]
    fn four_parts_fail() {
        let err = classify(b"a-fix-b-fix-c-fix-d").unwrap_err();
        assert_eq!(
            err,
            TypeError::Unclassifiable {
                key: hex::encode(b"a-fix-b-fix-c-fix-d"),
                parts: 4
            }
        );
    }

    #[test]
    fn split_on_handles_edges() {
        assert_eq!(
            split_on(b"-fix-", KEY_DELINEATION),
            vec![b"".as_slice(), b"".as_slice()]
        );
        assert_eq!(split_on(b"abc", KEY_DELINEATION), vec![b"abc".as_slice()]);
        assert_eq!(split_on(b"", KEY_DELINEATION), vec![b"".as_slice()]);
    }

    #[test]
    fn header_address_source_is_embedded_hash() {
        let hash = [0x33u8; 32];
        let key = header_key(1337, &hash);
        let classified = ClassifiedKey::classify(&key).unwrap();
        assert_eq!(
            classified.address_source().unwrap(),
            AddressSource::Digest(Digest::from_array(hash))
        );
    }

    #[test]
    fn header_without_number_delineation_is_malformed() {
        let mut key = HEADER_PREFIX.to_vec();
        key.extend_from_slice(KEY_DELINEATION);
        key.extend_from_slice(&[0x44; 32]);
        let classified = ClassifiedKey::classify(&key).unwrap();
        assert!(matches!(
            classified.address_source(),
            Err(TypeError::MalformedDigest { .. })
        ));
    }

    #[test]
    fn oversized_hashed_key_is_malformed() {
        let key = [5u8; 33];
        let classified = ClassifiedKey::classify(&key).unwrap();
        assert_eq!(
            classified.address_source(),
            Err(TypeError::MalformedDigest {
                expected: 32,
                actual: 33
            })
        );
    }

    #[test]
    fn non_hashed_variants_are_verbatim() {
        for key in [
            b"\x01\x02".as_slice(),
            b"x-fix-y".as_slice(),
            b"a-fix-b-fix-c".as_slice(),
        ] {
            let classified = ClassifiedKey::classify(key).unwrap();
            assert_eq!(
                classified.address_source().unwrap(),
                AddressSource::Verbatim(key)
            );
        }
    }

    #[test]
    fn explicit_literal_overrides_heuristic() {
        let raw = [0u8; 32];
        assert_eq!(ClassifiedKey::classify(&raw).unwrap().class(), &KeyClass::Hashed);
        let literal = ClassifiedKey::literal(&raw);
        assert_eq!(literal.address_source().unwrap(), AddressSource::Verbatim(&raw));
    }

    proptest! {
        #[test]
        fn prop_classification_is_deterministic(key in proptest::collection::vec(any::<u8>(), 0..96)) {
            prop_assert_eq!(classify(&key).ok(), classify(&key).ok());
        }

        #[test]
        fn prop_split_then_join_is_identity(key in proptest::collection::vec(any::<u8>(), 0..96)) {
            let parts = split_on(&key, KEY_DELINEATION);
            prop_assert_eq!(parts.join(KEY_DELINEATION), key);
        }
    }
}

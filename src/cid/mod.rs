//! Content identifiers for event payloads
//!
//! A [`Cid`] is a CIDv1: version byte, content codec, then a multihash
//! (hash function code, digest length, digest). The only codec used here is
//! `raw` and the only hash is SHA-256, but both are tagged in the bytes so
//! the identifier stays self-describing. The textual form is multibase
//! base16: `f` followed by lowercase hex, byte-identical for identical
//! content regardless of who computed it.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// CIDv1 version byte
const CID_VERSION: u8 = 0x01;
/// Multicodec code for raw binary content
const CODEC_RAW: u8 = 0x55;
/// Multihash code for SHA2-256
const HASH_SHA2_256: u8 = 0x12;
/// SHA-256 digest length in bytes
const DIGEST_LEN: u8 = 0x20;
/// Multibase prefix for lowercase base16
const MULTIBASE_BASE16: char = 'f';

/// Domain separator hashed in place of a previous CID for the first
/// event in a chain. Must never collide with real CID bytes, which always
/// start with the version byte 0x01.
const GENESIS_SENTINEL: &[u8] = b"\x00chronograph:genesis";

/// Errors from parsing a textual CID
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CidError {
    #[error("unknown multibase prefix: {0:?}")]
    UnknownMultibase(Option<char>),

    #[error("invalid hex encoding: {0}")]
    InvalidHex(String),

    #[error("wrong length: expected {expected} bytes, got {got}")]
    WrongLength { expected: usize, got: usize },

    #[error("unsupported version/codec/hash tags: {0:02x?}")]
    UnsupportedTags([u8; 4]),
}

/// A content identifier
///
/// Stored as the full CIDv1 byte string (4 tag bytes + 32 digest bytes).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cid([u8; 36]);

impl Cid {
    /// Compute the CID of a byte string.
    ///
    /// Pure: the same bytes always produce the same CID.
    pub fn from_content(content: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(content);
        Self::from_digest(hasher.finalize().into())
    }

    /// Compute the CID of an event payload chained to its predecessor.
    ///
    /// The digest covers the previous CID's bytes (or the genesis sentinel
    /// when there is no predecessor) followed by the payload bytes, so a
    /// change to any earlier event changes every CID after it.
    pub fn from_chained(payload: &[u8], previous: Option<&Cid>) -> Self {
        let mut hasher = Sha256::new();
        match previous {
            Some(prev) => hasher.update(prev.as_bytes()),
            None => hasher.update(GENESIS_SENTINEL),
        }
        hasher.update(payload);
        Self::from_digest(hasher.finalize().into())
    }

    fn from_digest(digest: [u8; 32]) -> Self {
        let mut bytes = [0u8; 36];
        bytes[0] = CID_VERSION;
        bytes[1] = CODEC_RAW;
        bytes[2] = HASH_SHA2_256;
        bytes[3] = DIGEST_LEN;
        bytes[4..].copy_from_slice(&digest);
        Self(bytes)
    }

    /// The full CIDv1 byte string (tags + digest)
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Parse the multibase textual form produced by `Display`
    pub fn parse(s: &str) -> Result<Self, CidError> {
        let mut chars = s.chars();
        match chars.next() {
            Some(MULTIBASE_BASE16) => {}
            other => return Err(CidError::UnknownMultibase(other)),
        }
        let raw = hex::decode(chars.as_str()).map_err(|e| CidError::InvalidHex(e.to_string()))?;
        if raw.len() != 36 {
            return Err(CidError::WrongLength {
                expected: 36,
                got: raw.len(),
            });
        }
        let tags = [raw[0], raw[1], raw[2], raw[3]];
        if tags != [CID_VERSION, CODEC_RAW, HASH_SHA2_256, DIGEST_LEN] {
            return Err(CidError::UnsupportedTags(tags));
        }
        let mut bytes = [0u8; 36];
        bytes.copy_from_slice(&raw);
        Ok(Self(bytes))
    }
}

impl std::fmt::Display for Cid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", MULTIBASE_BASE16, hex::encode(self.0))
    }
}

impl std::fmt::Debug for Cid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Cid({self})")
    }
}

impl From<Cid> for String {
    fn from(cid: Cid) -> Self {
        cid.to_string()
    }
}

impl TryFrom<String> for Cid {
    type Error = CidError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_content_same_cid() {
        let a = Cid::from_content(b"hello graph");
        let b = Cid::from_content(b"hello graph");
        assert_eq!(a, b);
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn chained_cid_is_deterministic() {
        let prev = Cid::from_content(b"event zero");
        let a = Cid::from_chained(b"event one", Some(&prev));
        let b = Cid::from_chained(b"event one", Some(&prev));
        assert_eq!(a, b);
    }

    #[test]
    fn payload_bit_flip_changes_cid() {
        let prev = Cid::from_content(b"root");
        let mut payload = b"a perfectly ordinary payload".to_vec();
        let original = Cid::from_chained(&payload, Some(&prev));
        for i in 0..payload.len() {
            for bit in 0..8 {
                payload[i] ^= 1 << bit;
                assert_ne!(Cid::from_chained(&payload, Some(&prev)), original);
                payload[i] ^= 1 << bit;
            }
        }
    }

    #[test]
    fn previous_cid_changes_cid() {
        let p1 = Cid::from_content(b"one");
        let p2 = Cid::from_content(b"two");
        let payload = b"same payload";
        assert_ne!(
            Cid::from_chained(payload, Some(&p1)),
            Cid::from_chained(payload, Some(&p2))
        );
        assert_ne!(
            Cid::from_chained(payload, Some(&p1)),
            Cid::from_chained(payload, None)
        );
    }

    #[test]
    fn genesis_differs_from_plain_hash() {
        // from_chained(p, None) frames with the sentinel, so it must not
        // equal the unframed content hash of p.
        let payload = b"genesis payload";
        assert_ne!(Cid::from_chained(payload, None), Cid::from_content(payload));
    }

    #[test]
    fn display_parse_round_trip() {
        let cid = Cid::from_content(b"round trip");
        let text = cid.to_string();
        assert!(text.starts_with('f'));
        assert_eq!(text.len(), 1 + 36 * 2);
        assert_eq!(Cid::parse(&text).unwrap(), cid);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(
            Cid::parse("bdeadbeef"),
            Err(CidError::UnknownMultibase(Some('b')))
        );
        assert!(matches!(
            Cid::parse("fdeadbeef"),
            Err(CidError::WrongLength { .. })
        ));
        assert!(matches!(
            Cid::parse("fzz"),
            Err(CidError::InvalidHex(_))
        ));
        // Right length, wrong tags
        let bogus = format!("f{}", hex::encode([0xffu8; 36]));
        assert!(matches!(
            Cid::parse(&bogus),
            Err(CidError::UnsupportedTags(_))
        ));
    }

    #[test]
    fn random_payloads_round_trip() {
        use rand::RngCore;
        let mut rng = rand::thread_rng();
        let mut payload = [0u8; 64];
        let mut previous: Option<Cid> = None;
        for _ in 0..100 {
            rng.fill_bytes(&mut payload);
            let cid = Cid::from_chained(&payload, previous.as_ref());
            assert_eq!(Cid::parse(&cid.to_string()).unwrap(), cid);
            previous = Some(cid);
        }
    }

    #[test]
    fn serde_round_trips_as_string() {
        let cid = Cid::from_content(b"serde");
        let json = serde_json::to_string(&cid).unwrap();
        assert_eq!(json, format!("\"{cid}\""));
        let back: Cid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cid);
    }
}

//! Canonical content hashes.
//!
//! Every artifact hash in the catalogue is a SHA-256 digest rendered as
//! `sha256:<64 lowercase hex chars>`. [`FileHash`] is the only way to hold
//! one: construction validates and normalizes, so two hashes compare equal
//! exactly when their normalized strings match.
//!
//! # Ordering
//!
//! [`combine_hashes`] digests the sequence exactly as given. The same set of
//! artifacts supplied in a different order yields a different combined hash,
//! so callers must sort entries by path before combining.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Algorithm prefix carried by every normalized hash.
pub const HASH_PREFIX: &str = "sha256:";

/// Number of hex characters in a SHA-256 digest.
pub const HEX_LEN: usize = 64;

/// Reasons a string is not a valid [`FileHash`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HashError {
    #[error("hash is empty")]
    Empty,
    #[error("hash '{input}' does not start with '{}'", HASH_PREFIX)]
    MissingPrefix { input: String },
    #[error("hash digest has {actual} hex characters, expected {}", HEX_LEN)]
    InvalidLength { actual: usize },
    #[error("hash '{input}' contains non-hex characters")]
    NonHex { input: String },
}

/// A validated, normalized SHA-256 content hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileHash(String);

impl FileHash {
    /// Parse and normalize a hash string.
    ///
    /// Surrounding whitespace is ignored and the prefix and digest are
    /// lower-cased, so `"SHA256:ABCD…"` and `"sha256:abcd…"` are the same hash.
    pub fn parse(input: &str) -> Result<Self, HashError> {
        let normalized = input.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return Err(HashError::Empty);
        }

        let digest = normalized
            .strip_prefix(HASH_PREFIX)
            .ok_or_else(|| HashError::MissingPrefix {
                input: input.to_string(),
            })?;

        if digest.len() != HEX_LEN {
            return Err(HashError::InvalidLength {
                actual: digest.len(),
            });
        }
        if !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(HashError::NonHex {
                input: input.to_string(),
            });
        }

        Ok(Self(normalized))
    }

    /// Wrap a raw 32-byte SHA-256 digest.
    pub fn from_digest(digest: &[u8]) -> Self {
        Self(format!("{}{}", HASH_PREFIX, hex::encode(digest)))
    }

    /// The full normalized form, including the prefix.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for FileHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FileHash {
    type Error = HashError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FileHash> for String {
    fn from(hash: FileHash) -> Self {
        hash.0
    }
}

/// Hash an in-memory byte payload.
pub fn hash_bytes(bytes: &[u8]) -> FileHash {
    FileHash::from_digest(&Sha256::digest(bytes))
}

/// Hash text as its UTF-8 bytes, with no other normalization.
pub fn hash_text(text: &str) -> FileHash {
    hash_bytes(text.as_bytes())
}

/// Combine an ordered sequence of hashes into one.
///
/// Each normalized hash is fed to SHA-256 followed by a `\n` separator.
/// The input order is significant.
pub fn combine_hashes<'a, I>(hashes: I) -> FileHash
where
    I: IntoIterator<Item = &'a FileHash>,
{
    let mut hasher = Sha256::new();
    for hash in hashes {
        hasher.update(hash.as_str().as_bytes());
        hasher.update(b"\n");
    }
    FileHash::from_digest(&hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = "sha256:9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    #[test]
    fn parse_normalizes_case_and_whitespace() {
        let upper = format!("  {}  ", VALID.to_uppercase());
        let hash = FileHash::parse(&upper).unwrap();
        assert_eq!(hash.as_str(), VALID);
        assert_eq!(hash, FileHash::parse(VALID).unwrap());
    }

    #[test]
    fn parse_rejects_invalid_input() {
        assert_eq!(FileHash::parse(""), Err(HashError::Empty));
        assert_eq!(FileHash::parse("   "), Err(HashError::Empty));
        assert!(matches!(
            FileHash::parse(&VALID[HASH_PREFIX.len()..]),
            Err(HashError::MissingPrefix { .. })
        ));
        assert!(matches!(
            FileHash::parse(&VALID.replace("sha256", "md5")),
            Err(HashError::MissingPrefix { .. })
        ));
        assert_eq!(
            FileHash::parse("sha256:abcd"),
            Err(HashError::InvalidLength { actual: 4 })
        );
        let non_hex = format!("sha256:{}", "z".repeat(HEX_LEN));
        assert!(matches!(
            FileHash::parse(&non_hex),
            Err(HashError::NonHex { .. })
        ));
    }

    #[test]
    fn known_digest_of_text() {
        // SHA-256("test")
        assert_eq!(hash_text("test").as_str(), VALID);
        assert_eq!(
            hash_text("test").as_str().len(),
            HASH_PREFIX.len() + HEX_LEN
        );
    }

    #[test]
    fn hashing_is_deterministic_and_content_sensitive() {
        let a = hash_bytes(b"steel base plate rev A");
        let b = hash_bytes(b"steel base plate rev A");
        let c = hash_bytes(b"steel base plate rev B");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn text_hash_matches_utf8_bytes() {
        let text = "Flansch Ø40 – Stahl";
        assert_eq!(hash_text(text), hash_bytes(text.as_bytes()));
    }

    #[test]
    fn combine_is_order_sensitive() {
        let a = hash_text("a.dxf");
        let b = hash_text("b.dxf");
        let ab = combine_hashes([&a, &b]);
        let ba = combine_hashes([&b, &a]);
        assert_ne!(ab, ba);
        assert_eq!(ab, combine_hashes(vec![&a, &b]));
    }

    #[test]
    fn serde_uses_string_form() {
        let hash = hash_text("bolt");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{}\"", hash));
        let back: FileHash = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hash);
        assert!(serde_json::from_str::<FileHash>("\"sha256:xyz\"").is_err());
    }
}

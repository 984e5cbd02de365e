//! File content hashing.
//!
//! Streams files through SHA-256 and wraps the digest as a [`FileHash`].
//! Byte and text hashing are re-exported from `mcat-core` so every hash in
//! the system comes from one place.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use crate::error::IntegrityError;

pub use mcat_core::hash::{combine_hashes, hash_bytes, hash_text, FileHash};

const READ_BUFFER: usize = 64 * 1024;

/// Hash a file's exact byte content.
pub fn hash_file(path: &Path) -> Result<FileHash, IntegrityError> {
    let file = File::open(path).map_err(|e| IntegrityError::from_io(path, e))?;
    let mut reader = BufReader::with_capacity(READ_BUFFER, file);
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher).map_err(|e| IntegrityError::from_io(path, e))?;
    Ok(FileHash::from_digest(&hasher.finalize()))
}

/// Recompute a file's hash and compare it with `expected`.
///
/// A mismatch is `Ok(false)`; only I/O problems are errors.
pub fn verify_file(path: &Path, expected: &FileHash) -> Result<bool, IntegrityError> {
    Ok(&hash_file(path)? == expected)
}

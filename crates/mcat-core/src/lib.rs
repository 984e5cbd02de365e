//! # mech-catalog core
//!
//! Shared, I/O-free logic for the component catalogue: content hashes,
//! the per-component manifest model, artifact diffing, the integrity
//! severity model, vector index records, and the embedding trait.
//!
//! This crate performs no filesystem, database, or network access. The
//! `mech-catalog` crate supplies those and drives the algorithms here.

pub mod diff;
pub mod embedding;
pub mod hash;
pub mod integrity;
pub mod manifest;
pub mod vector;

pub use hash::{combine_hashes, hash_bytes, hash_text, FileHash, HashError};

//! # mech-catalog
//!
//! Artifact sync, integrity checking, and similarity search for a
//! catalogue of mechanical components.
//!
//! Every component lives in its own directory under the catalogue root,
//! holding its drawings, models, and documents next to a JSON manifest
//! that records the SHA-256 of each artifact. `mcat` keeps those
//! manifests in step with the files, verifies files against them, mirrors
//! them into SQLite, and answers "which components look like this?"
//! through an embedding index with an on-disk HNSW cache.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────────────┐
//! │ component    │──▶│  sync       │──▶│ manifest (JSON)  │
//! │ directories  │   │ scan + diff │   │ SQLite records   │
//! └──────────────┘   └──────┬──────┘   └──────────────────┘
//!                           │ --include-vectors
//!                           ▼
//!                    ┌─────────────┐   ┌──────────────────┐
//!                    │ embedding   │──▶│ vector_index     │
//!                    │ provider    │   │ + usearch cache  │
//!                    └─────────────┘   └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! mcat init                          # create database and catalogue root
//! mcat new BP-1042 --identifier BP-1042 --category fabricated
//! mcat sync                          # register files, write manifests
//! mcat validate                      # verify files against manifests
//! mcat sync --include-vectors        # embed components
//! mcat search "steel base plate"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`hasher`] | Streaming SHA-256 of artifact files |
//! | [`scanner`] | Component directory walking |
//! | [`manifest_file`] | Atomic manifest read/write |
//! | [`integrity`] | Artifact verification |
//! | [`sync`] | Filesystem to manifest synchronization |
//! | [`catalog`] | Component records and creation |
//! | [`embedding`] | Embedding provider implementations |
//! | [`vector_store`] | Persisted vector rows |
//! | [`similarity`] | Similarity index over the vector rows |

pub(crate) mod ann_index;
pub mod catalog;
pub mod components_cmd;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod hasher;
pub mod integrity;
pub mod manifest_file;
pub mod migrate;
pub mod scanner;
pub mod search_cmd;
pub mod similarity;
pub mod sync;
pub mod sync_cmd;
pub mod vector_store;

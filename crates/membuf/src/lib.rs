// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # membuf - shared in-memory byte cache
//!
//! A set-associative, randomized-LFU cache that keeps every payload in
//! one large byte arena and indexes it through a directory of fixed-size
//! entry groups. One [`MemBuffer`] per process is the intended shape;
//! any number of [`TypedCache`] facades share it, each with its own key
//! namespace and value codec.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use membuf::{CacheConfig, MemBuffer, Result, TypedCache, Utf8Codec};
//!
//! fn main() -> Result<()> {
//!     // One shared core: 64 MiB total, 1 MiB of it directory.
//!     let core = Arc::new(MemBuffer::new(&CacheConfig::new(64 << 20, 1 << 20))?);
//!
//!     // A typed view for one client.
//!     let paths = TypedCache::new(Arc::clone(&core), "node-paths", Utf8Codec)?;
//!     paths.set(b"42", &"/trunk/doc".to_string())?;
//!
//!     if let Some(path) = paths.get(b"42")? {
//!         println!("cached: {}", path);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                  TypedCache (per client)                     |
//! |        namespace prefix | Codec | scratch buffers            |
//! +--------------------------------------------------------------+
//! |                    MemBuffer (shared)                        |
//! |  directory: groups of 4 entry slots, picked by fingerprint   |
//! |  arena:     payload bytes, used-list ordered by offset       |
//! |  eviction:  sliding insertion window, randomized LFU         |
//! +--------------------------------------------------------------+
//! ```
//!
//! Keys are reduced to 128-bit fingerprints and never stored, which is
//! also why iteration is not offered. Reads touch one counter; all
//! structural work (compaction, eviction) happens on the write path
//! while the single cache mutex is held.
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`MemBuffer`] | The shared cache core |
//! | [`CacheConfig`] | Sizing knobs, normalized at construction |
//! | [`TypedCache`] | Typed, namespaced per-client facade |
//! | [`Codec`] | Value (de)serialization hook |
//! | [`CacheStats`] | Counter snapshot |

/// Payload storage.
mod arena;
/// Sizing configuration and layout constants.
pub mod config;
/// Key fingerprints and the hasher seam.
pub mod digest;
/// Entry slots and the group directory.
mod directory;
/// Error type shared by all cache operations.
pub mod error;
/// The cache core: directory + arena + eviction under one mutex.
pub mod membuffer;
/// Usage counters.
pub mod stats;
/// Typed per-client facades.
pub mod typed;

pub use config::CacheConfig;
pub use digest::{Fingerprint, KeyHasher, Md5Hasher, FINGERPRINT_LEN};
pub use error::{Error, Result};
pub use membuffer::MemBuffer;
pub use stats::CacheStats;
pub use typed::{BytesCodec, Codec, TypedCache, Utf8Codec};

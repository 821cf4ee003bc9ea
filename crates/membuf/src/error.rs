// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error type for cache operations.
//!
//! Misses, oversize rejections and evictions are normal outcomes, not
//! errors; only conditions the caller must react to surface here.

/// Errors returned by membuf cache operations.
#[derive(Debug)]
pub enum Error {
    /// The requested operation is not supported by this cache kind
    /// (e.g. iterating a fingerprint-indexed cache).
    Unsupported,
    /// The value serializer reported a failure; the cache is unchanged.
    SerializerFailed(String),
    /// The value deserializer reported a failure on a cached payload.
    DeserializerFailed(String),
    /// The key hasher failed to produce a fingerprint.
    DigestFailed(String),
    /// The cache mutex could not be acquired (a writer panicked while
    /// holding it).
    LockFailed,
    /// Not even a minimal directory could be allocated.
    OutOfMemory,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Unsupported => write!(f, "Operation not supported"),
            Error::SerializerFailed(msg) => write!(f, "Serializer failed: {}", msg),
            Error::DeserializerFailed(msg) => write!(f, "Deserializer failed: {}", msg),
            Error::DigestFailed(msg) => write!(f, "Key digest failed: {}", msg),
            Error::LockFailed => write!(f, "Cache mutex poisoned"),
            Error::OutOfMemory => write!(f, "Out of memory"),
        }
    }
}

impl std::error::Error for Error {}

/// Result type for membuf operations.
pub type Result<T> = std::result::Result<T, Error>;

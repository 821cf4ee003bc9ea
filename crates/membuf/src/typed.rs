// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed per-client views onto a shared [`MemBuffer`].
//!
//! Membuffer caches tend to be large, so a process usually has exactly
//! one, shared as the backend of many `TypedCache` instances. Each
//! facade salts user keys with the fingerprint of its namespace string,
//! which keeps clients apart without any coordination, and binds a
//! [`Codec`] that converts values to and from the stored bytes.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use crate::digest::Fingerprint;
use crate::error::{Error, Result};
use crate::membuffer::MemBuffer;

/// Operations between trims of a facade's scratch buffers.
const SCRATCH_TRIM_INTERVAL: u32 = 10;

/// Capacity a scratch buffer keeps across a trim.
const SCRATCH_KEEP_BYTES: usize = 4096;

/// Converts values to and from their cached byte form.
///
/// `encode` runs before the cache lock is taken and `decode` runs inside
/// it, so neither should block. Failures should be reported as
/// [`Error::SerializerFailed`] / [`Error::DeserializerFailed`].
pub trait Codec<V> {
    /// Append the serialized form of `value` to `out`.
    fn encode(&self, value: &V, out: &mut Vec<u8>) -> Result<()>;

    /// Rebuild a value from its serialized form.
    ///
    /// `bytes` is borrowed from the cache arena and is only valid for
    /// the duration of the call.
    fn decode(&self, bytes: &[u8]) -> Result<V>;
}

/// Identity codec for raw byte values.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytesCodec;

impl Codec<Vec<u8>> for BytesCodec {
    fn encode(&self, value: &Vec<u8>, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(value);
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

/// Codec for UTF-8 string values.
#[derive(Debug, Default, Clone, Copy)]
pub struct Utf8Codec;

impl Codec<String> for Utf8Codec {
    fn encode(&self, value: &String, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(value.as_bytes());
        Ok(())
    }

    fn decode(&self, bytes: &[u8]) -> Result<String> {
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|e| Error::DeserializerFailed(e.to_string()))
    }
}

/// Reusable per-facade buffers for key composition and serialization.
///
/// Cleared on every operation; capacity above [`SCRATCH_KEEP_BYTES`] is
/// released every [`SCRATCH_TRIM_INTERVAL`] operations so a burst of
/// large values does not pin memory forever.
struct Scratch {
    key: Vec<u8>,
    value: Vec<u8>,
    ops_since_trim: u32,
}

impl Scratch {
    fn new() -> Self {
        Self {
            key: Vec::new(),
            value: Vec::new(),
            ops_since_trim: 0,
        }
    }

    fn begin_op(&mut self) {
        self.ops_since_trim += 1;
        if self.ops_since_trim >= SCRATCH_TRIM_INTERVAL {
            self.ops_since_trim = 0;
            self.key.shrink_to(SCRATCH_KEEP_BYTES);
            self.value.shrink_to(SCRATCH_KEEP_BYTES);
        }
        self.key.clear();
        self.value.clear();
    }
}

/// Typed, namespaced view onto a shared [`MemBuffer`].
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use membuf::{BytesCodec, CacheConfig, MemBuffer, TypedCache};
///
/// # fn main() -> membuf::Result<()> {
/// let core = Arc::new(MemBuffer::new(&CacheConfig::new(64 << 20, 1 << 20))?);
/// let cache = TypedCache::new(Arc::clone(&core), "revision-props", BytesCodec)?;
///
/// cache.set(b"1234", &b"payload".to_vec())?;
/// if let Some(value) = cache.get(b"1234")? {
///     assert_eq!(value, b"payload");
/// }
/// # Ok(())
/// # }
/// ```
pub struct TypedCache<V, C: Codec<V>> {
    core: Arc<MemBuffer>,
    codec: C,
    /// Fingerprint of the namespace, prepended to every user key.
    prefix: Fingerprint,
    scratch: Mutex<Scratch>,
    _values: PhantomData<fn() -> V>,
}

impl<V, C: Codec<V>> TypedCache<V, C> {
    /// Create a view over `core` for the client named `namespace`.
    ///
    /// Distinct namespaces get (all but certainly) disjoint key spaces;
    /// equal namespaces share one.
    ///
    /// # Errors
    /// [`Error::DigestFailed`] if the namespace cannot be fingerprinted.
    pub fn new(core: Arc<MemBuffer>, namespace: &str, codec: C) -> Result<Self> {
        let prefix = core.fingerprint(namespace.as_bytes())?;
        Ok(Self {
            core,
            codec,
            prefix,
            scratch: Mutex::new(Scratch::new()),
            _values: PhantomData,
        })
    }

    /// Look up the value stored under `key`.
    ///
    /// # Errors
    /// [`Error::LockFailed`] or a decode failure; misses are `Ok(None)`.
    pub fn get(&self, key: &[u8]) -> Result<Option<V>> {
        let mut scratch = self.lock_scratch()?;
        scratch.begin_op();
        scratch.key.extend_from_slice(&self.prefix);
        scratch.key.extend_from_slice(key);

        self.core
            .get_with(&scratch.key, |bytes| self.codec.decode(bytes))
    }

    /// Store `value` under `key`. Best effort, see [`MemBuffer::set`].
    ///
    /// # Errors
    /// An encode failure (the cache is untouched) or
    /// [`Error::LockFailed`].
    pub fn set(&self, key: &[u8], value: &V) -> Result<()> {
        let mut scratch = self.lock_scratch()?;
        let scratch = &mut *scratch;
        scratch.begin_op();
        scratch.key.extend_from_slice(&self.prefix);
        scratch.key.extend_from_slice(key);

        self.codec.encode(value, &mut scratch.value)?;
        self.core.set(&scratch.key, &scratch.value)
    }

    /// Iteration is not supported: the cache keeps key fingerprints,
    /// not keys, so there is nothing to enumerate.
    ///
    /// # Errors
    /// Always [`Error::Unsupported`].
    pub fn iterate(&self) -> Result<()> {
        Err(Error::Unsupported)
    }

    /// The shared core this facade writes through to.
    pub fn core(&self) -> &Arc<MemBuffer> {
        &self.core
    }

    fn lock_scratch(&self) -> Result<std::sync::MutexGuard<'_, Scratch>> {
        self.scratch.lock().map_err(|_| Error::LockFailed)
    }
}

impl TypedCache<Vec<u8>, BytesCodec> {
    /// Byte-value view, the default codec pairing.
    ///
    /// # Errors
    /// See [`TypedCache::new`].
    pub fn bytes(core: Arc<MemBuffer>, namespace: &str) -> Result<Self> {
        Self::new(core, namespace, BytesCodec)
    }
}

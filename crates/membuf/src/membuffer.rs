// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The membuffer core: directory + arena + randomized-LFU eviction under
//! a single mutex.
//!
//! A cache consists of two parts: a linear data arena holding serialized
//! payloads (with arbitrary gaps) and a directory of entry groups indexed
//! CPU-cache style, making the whole thing 4-way set associative. Arena
//! usage is implied by the directory: every used entry links to the
//! previous and next used entry in payload order, so freeing is just an
//! unlink.
//!
//! Insertion happens at a single position, the insertion window. When the
//! window is too small for a new payload, the entry right behind it is
//! put to a dice roll against the average hit count: winners get their
//! payload compacted to the window front (and their hit count halved so
//! they must keep earning their place), losers are evicted. Frequently
//! read entries therefore tend to survive without any per-read list
//! maintenance, and even under heavy thrash roughly half of the warm
//! content outlives a full overwrite of the cache.
//!
//! One mutex guards directory, arena and all counters. Key hashing and
//! value serialization happen outside of it; only the byte-level work
//! holds the lock.

use std::sync::{Mutex, MutexGuard};

use crate::arena::Arena;
use crate::config::{align_up, CacheConfig};
use crate::digest::{group_index, Fingerprint, KeyHasher, Md5Hasher};
use crate::directory::{Directory, NIL, UNUSED_OFFSET};
use crate::error::{Error, Result};
use crate::stats::CacheStats;

/// First arena offset past an entry's payload, aligned.
///
/// Zero-size payloads still consume one alignment quantum so used-list
/// offsets stay strictly ordered.
fn entry_end(offset: u64, size: u32) -> u64 {
    align_up(offset + u64::from(size).max(1))
}

/// Everything the cache mutex protects.
struct CacheInner {
    directory: Directory,
    arena: Arena,

    /// First used entry by arena offset, or [`NIL`] for an empty cache.
    head: u32,
    /// Last used entry by arena offset, or [`NIL`] for an empty cache.
    tail: u32,
    /// First used entry at or past the insertion position, or [`NIL`]
    /// when the arena is free from `current_data` to its end.
    window_next: u32,
    /// Arena offset where the next payload will be placed.
    current_data: u64,

    used_entries: u32,
    data_used: u64,
    /// Sum of all used entries' hit counters.
    hit_count: u64,

    total_reads: u64,
    total_writes: u64,
    total_hits: u64,

    /// Eviction dice.
    rng: fastrand::Rng,
}

impl CacheInner {
    /// Unlink the used entry `idx` and mark its slot free.
    ///
    /// The payload bytes become part of a gap; they are not touched.
    fn drop_entry(&mut self, idx: u32) {
        let entry = *self.directory.get(idx);
        debug_assert!(entry.is_used());

        self.used_entries -= 1;
        self.hit_count -= u64::from(entry.hit_count);
        self.data_used -= u64::from(entry.size);

        if idx == self.window_next {
            self.window_next = entry.next;
        } else if entry.next == self.window_next {
            // The entry borders the window from below; its bytes extend
            // the window backwards.
            self.current_data = if entry.prev == NIL {
                0
            } else {
                let prev = self.directory.get(entry.prev);
                entry_end(prev.offset, prev.size)
            };
        }

        if entry.prev == NIL {
            self.head = entry.next;
        } else {
            self.directory.get_mut(entry.prev).next = entry.next;
        }
        if entry.next == NIL {
            self.tail = entry.prev;
        } else {
            self.directory.get_mut(entry.next).prev = entry.prev;
        }

        self.directory.get_mut(idx).offset = UNUSED_OFFSET;
    }

    /// Link entry `idx` into the used-list just before `window_next`.
    ///
    /// `offset` and `size` must already be set and `offset` must equal
    /// the window start.
    fn insert_entry(&mut self, idx: u32) {
        let entry = *self.directory.get(idx);
        debug_assert_eq!(entry.offset, self.current_data);

        self.current_data = entry_end(entry.offset, entry.size);
        self.used_entries += 1;
        self.data_used += u64::from(entry.size);

        let window_next = self.window_next;
        {
            let e = self.directory.get_mut(idx);
            e.hit_count = 0;
            e.next = window_next;
        }

        if self.head == NIL {
            // sole entry in the chain
            self.directory.get_mut(idx).prev = NIL;
            self.head = idx;
            self.tail = idx;
        } else if window_next == NIL {
            // append past the old tail; cannot also be the head here
            let tail = self.tail;
            self.directory.get_mut(idx).prev = tail;
            self.directory.get_mut(tail).next = idx;
            self.tail = idx;
        } else {
            let prev = self.directory.get(window_next).prev;
            self.directory.get_mut(idx).prev = prev;
            self.directory.get_mut(window_next).prev = idx;
            if prev != NIL {
                self.directory.get_mut(prev).next = idx;
            } else {
                self.head = idx;
            }
        }
    }

    /// Halve `idx`'s hit counter, keeping the global sum in step.
    fn halve_hits(&mut self, idx: u32) {
        let entry = self.directory.get_mut(idx);
        let dropped = entry.hit_count - (entry.hit_count >> 1);
        entry.hit_count >>= 1;
        self.hit_count -= u64::from(dropped);
    }

    /// A surviving entry moves from just past the window to its front.
    ///
    /// Its hit count is halved so it gets evicted next time around
    /// unless someone reads it again in the meantime.
    fn move_entry(&mut self, idx: u32) {
        self.halve_hits(idx);

        let entry = *self.directory.get(idx);
        if entry.offset > self.current_data {
            self.arena.relocate(entry.offset, self.current_data, entry.size);
            self.directory.get_mut(idx).offset = self.current_data;
        }

        let entry = *self.directory.get(idx);
        self.current_data = entry_end(entry.offset, entry.size);
        self.window_next = entry.next;
    }

    /// Enlarge the insertion window until it holds `need` bytes.
    ///
    /// Walks the window over used entries, rolling a threshold uniformly
    /// from `[0, 2 * avg_hits)` for each: entries at or above the
    /// threshold survive (compacted to the window front), the rest are
    /// evicted. Wraps to offset zero at the arena end. `need` must not
    /// exceed the arena size or this loop cannot terminate.
    fn ensure_insertable(&mut self, need: u64) {
        debug_assert!(need <= self.arena.len());

        loop {
            if self.used_entries == 0 {
                // empty cache: the whole arena is the window
                self.current_data = 0;
                self.window_next = NIL;
                return;
            }

            let window_end = if self.window_next == NIL {
                self.arena.len()
            } else {
                self.directory.get(self.window_next).offset
            };
            if window_end - self.current_data >= need {
                return;
            }

            if self.window_next == NIL {
                // arena end reached; restart the window at offset zero
                self.current_data = 0;
                self.window_next = self.head;
                continue;
            }

            let avg = (self.hit_count / u64::from(self.used_entries)).max(1);
            let threshold = self.rng.u64(0..2 * avg);

            let idx = self.window_next;
            if u64::from(self.directory.get(idx).hit_count) >= threshold {
                self.move_entry(idx);
            } else {
                self.drop_entry(idx);
            }
        }
    }

    /// Hand out a slot in `group` ready to be initialized for `key`.
    ///
    /// A slot already mapping `key` is dropped and reused; otherwise a
    /// free slot is taken; otherwise the coldest slot is forced out
    /// (first in group order on ties) and every other slot in the group
    /// pays with half its hit count.
    fn acquire_entry(&mut self, group: u32, key: &Fingerprint) -> u32 {
        if let Some(idx) = self.directory.find(group, key) {
            self.drop_entry(idx);
            return idx;
        }

        let slots = self.directory.group_slots(group);
        for idx in slots.clone() {
            if !self.directory.get(idx).is_used() {
                self.directory.get_mut(idx).key = *key;
                return idx;
            }
        }

        let mut victim = slots.start;
        for idx in slots.clone() {
            if self.directory.get(idx).hit_count < self.directory.get(victim).hit_count {
                victim = idx;
            }
        }
        for idx in slots {
            if idx != victim {
                self.halve_hits(idx);
            }
        }
        self.drop_entry(victim);
        self.directory.get_mut(victim).key = *key;
        victim
    }

    /// Store `payload` under `key` in `group`.
    ///
    /// Payloads above a quarter of the arena are rejected so a single
    /// admission cannot flush most of the cache; the rejected store
    /// still invalidates the previous mapping for the key.
    fn set_entry(&mut self, group: u32, key: &Fingerprint, payload: &[u8]) {
        let arena_size = self.arena.len();
        let admissible =
            arena_size > 0 && (payload.len() as u64).saturating_mul(4) <= arena_size;

        if !admissible {
            if let Some(idx) = self.directory.find(group, key) {
                self.drop_entry(idx);
            }
            log::trace!(
                "[membuf] {} byte payload rejected (arena {} bytes)",
                payload.len(),
                arena_size
            );
            return;
        }

        let size = payload.len() as u32;
        self.ensure_insertable(u64::from(size).max(1));

        let idx = self.acquire_entry(group, key);
        {
            let entry = self.directory.get_mut(idx);
            entry.size = size;
            entry.offset = self.current_data;
        }

        self.arena.write(self.current_data, payload);
        self.insert_entry(idx);
        self.total_writes += 1;
    }

    /// Validate list order, gap alignment and counter sums.
    #[cfg(test)]
    fn check_invariants(&self) {
        use crate::config::ITEM_ALIGNMENT;

        let mut count = 0u32;
        let mut hits = 0u64;
        let mut bytes = 0u64;
        let mut prev = NIL;
        let mut prev_entry: Option<crate::directory::Entry> = None;

        let mut idx = self.head;
        while idx != NIL {
            let entry = *self.directory.get(idx);
            assert!(entry.is_used(), "used-list reached a free slot");
            assert_eq!(entry.prev, prev, "backward link broken at {}", idx);
            assert_eq!(entry.offset % ITEM_ALIGNMENT, 0, "unaligned offset");
            if let Some(p) = prev_entry {
                assert!(p.offset < entry.offset, "offsets not strictly increasing");
                assert!(
                    align_up(p.offset + u64::from(p.size)) <= entry.offset,
                    "payloads overlap"
                );
            }
            count += 1;
            hits += u64::from(entry.hit_count);
            bytes += u64::from(entry.size);
            prev = idx;
            prev_entry = Some(entry);
            idx = entry.next;
        }

        assert_eq!(prev, self.tail, "tail does not terminate the used-list");
        assert_eq!(count, self.used_entries, "used_entries out of sync");
        assert_eq!(hits, self.hit_count, "hit_count out of sync");
        assert_eq!(bytes, self.data_used, "data_used out of sync");

        if self.used_entries == 0 {
            assert_eq!(self.head, NIL);
            assert_eq!(self.tail, NIL);
            assert_eq!(self.window_next, NIL);
        }
        assert!(self.current_data <= self.arena.len());
        if self.window_next != NIL {
            assert!(self.current_data <= self.directory.get(self.window_next).offset);
        }
    }
}

/// Shared in-memory byte cache.
///
/// One `MemBuffer` is typically shared by many
/// [`TypedCache`](crate::TypedCache) facades; keeping a single large
/// instance per process gives all of them a fair share of one memory
/// budget. Keys are arbitrary byte strings, reduced to fingerprints (see
/// [`crate::digest`]); values are opaque byte payloads.
///
/// All methods are safe to call from any number of threads.
pub struct MemBuffer {
    inner: Mutex<CacheInner>,
    hasher: Box<dyn KeyHasher>,
    group_count: u32,
}

impl MemBuffer {
    /// Create a cache sized by `config`, fingerprinting keys with MD5.
    ///
    /// If the configured buffers cannot be allocated the cache degrades
    /// to a single group with no arena: stores are discarded and lookups
    /// always miss.
    ///
    /// # Errors
    /// [`Error::OutOfMemory`] if even the minimal directory allocation
    /// fails.
    pub fn new(config: &CacheConfig) -> Result<Self> {
        Self::with_hasher(config, Box::new(Md5Hasher))
    }

    /// Create a cache with a caller-provided key hasher.
    ///
    /// # Errors
    /// [`Error::OutOfMemory`], see [`MemBuffer::new`].
    pub fn with_hasher(config: &CacheConfig, hasher: Box<dyn KeyHasher>) -> Result<Self> {
        let layout = config.layout();

        let allocated = Directory::try_new(layout.group_count).and_then(|directory| {
            let arena = Arena::try_new(layout.arena_bytes)?;
            Ok((directory, arena))
        });
        let (directory, arena) = match allocated {
            Ok(pair) => pair,
            Err(_) => {
                log::warn!(
                    "[membuf] failed to allocate {} groups / {} byte arena, \
                     continuing with a zero-capacity cache",
                    layout.group_count,
                    layout.arena_bytes
                );
                let directory = Directory::try_new(1).map_err(|_| Error::OutOfMemory)?;
                (directory, Arena::empty())
            }
        };

        let rng = match config.rng_seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };

        let group_count = directory.group_count();
        log::debug!(
            "[membuf] cache ready: {} groups, {} byte arena, thread_safe={}",
            group_count,
            arena.len(),
            config.thread_safe
        );

        Ok(Self {
            inner: Mutex::new(CacheInner {
                directory,
                arena,
                head: NIL,
                tail: NIL,
                window_next: NIL,
                current_data: 0,
                used_entries: 0,
                data_used: 0,
                hit_count: 0,
                total_reads: 0,
                total_writes: 0,
                total_hits: 0,
                rng,
            }),
            hasher,
            group_count,
        })
    }

    /// Store `payload` under `key`.
    ///
    /// Best effort: the payload may be rejected (oversize) or evicted at
    /// any later point. Either way any previous mapping for `key` is
    /// gone afterwards. An un-indexable key makes this a no-op.
    ///
    /// # Errors
    /// [`Error::LockFailed`] if the cache mutex is poisoned.
    pub fn set(&self, key: &[u8], payload: &[u8]) -> Result<()> {
        let Some((fingerprint, group)) = self.index_key(key) else {
            log::trace!("[membuf] un-indexable key, store dropped");
            return Ok(());
        };

        let mut inner = self.lock()?;
        inner.set_entry(group, &fingerprint, payload);
        Ok(())
    }

    /// Look up `key` and pass the cached payload to `read`.
    ///
    /// `read` runs inside the cache's critical section; the payload view
    /// it receives is only valid for that call. Returns `Ok(None)` on a
    /// miss or an un-indexable key. A hit bumps the entry's hit counter
    /// even if `read` fails afterwards.
    ///
    /// # Errors
    /// [`Error::LockFailed`] if the cache mutex is poisoned, or whatever
    /// `read` returns.
    pub fn get_with<R>(
        &self,
        key: &[u8],
        read: impl FnOnce(&[u8]) -> Result<R>,
    ) -> Result<Option<R>> {
        let Some((fingerprint, group)) = self.index_key(key) else {
            return Ok(None);
        };

        let mut guard = self.lock()?;
        let inner = &mut *guard;
        inner.total_reads += 1;

        let Some(idx) = inner.directory.find(group, &fingerprint) else {
            return Ok(None);
        };

        let entry = inner.directory.get_mut(idx);
        entry.hit_count += 1;
        let (offset, size) = (entry.offset, entry.size);
        inner.hit_count += 1;
        inner.total_hits += 1;

        let view = inner.arena.view(offset, size);
        Ok(Some(read(view)?))
    }

    /// Snapshot the usage counters.
    ///
    /// # Errors
    /// [`Error::LockFailed`] if the cache mutex is poisoned.
    pub fn stats(&self) -> Result<CacheStats> {
        let inner = self.lock()?;
        Ok(CacheStats {
            group_count: inner.directory.group_count(),
            data_size: inner.arena.len(),
            used_entries: inner.used_entries,
            data_used: inner.data_used,
            hit_count: inner.hit_count,
            total_reads: inner.total_reads,
            total_writes: inner.total_writes,
            total_hits: inner.total_hits,
        })
    }

    /// Fingerprint arbitrary bytes with this cache's hasher.
    pub(crate) fn fingerprint(&self, bytes: &[u8]) -> Result<Fingerprint> {
        self.hasher.digest(bytes)
    }

    /// Fingerprint + group index, or `None` for an un-indexable key.
    fn index_key(&self, key: &[u8]) -> Option<(Fingerprint, u32)> {
        let fingerprint = self.hasher.digest(key).ok()?;
        let group = group_index(&fingerprint, self.group_count);
        Some((fingerprint, group))
    }

    fn lock(&self) -> Result<MutexGuard<'_, CacheInner>> {
        self.inner.lock().map_err(|_| Error::LockFailed)
    }
}

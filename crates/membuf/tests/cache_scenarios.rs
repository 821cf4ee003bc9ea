// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test/bench code readability over pedantic
#![allow(clippy::cast_possible_truncation)] // Test parameters
#![allow(clippy::unreadable_literal)] // Large test constants
#![allow(clippy::doc_markdown)] // Test documentation
#![allow(clippy::missing_panics_doc)] // Tests/examples panic on failure
#![allow(clippy::items_after_statements)] // Test helpers
#![allow(clippy::too_many_lines)] // Example/test code
#![allow(clippy::wildcard_imports)] // Test utility imports
#![allow(clippy::similar_names)] // Test variable naming
#![allow(clippy::shadow_unrelated)] // Test scoping
#![allow(clippy::must_use_candidate)] // Test functions

//! End-to-end cache behavior through the public API.
//!
//! Covers admission, group saturation, oversize rejection, the sliding
//! eviction window and counter bookkeeping.

use std::sync::Arc;

use membuf::config::group_bytes;
use membuf::{BytesCodec, CacheConfig, Error, MemBuffer, TypedCache, Utf8Codec};

/// Config with an exact arena size and group count, pinned dice.
fn config(arena_bytes: usize, groups: usize) -> CacheConfig {
    let directory = groups * group_bytes();
    CacheConfig::new(directory + arena_bytes + 16, directory).with_rng_seed(0x5EED)
}

fn get_bytes(cache: &MemBuffer, key: &[u8]) -> Option<Vec<u8>> {
    cache.get_with(key, |bytes| Ok(bytes.to_vec())).unwrap()
}

// ============================================================================
// Basic admission and lookup
// ============================================================================

#[test]
fn test_single_entry_roundtrip() {
    let cache = MemBuffer::new(&config(256, 2)).unwrap();
    let value: Vec<u8> = (0..32).collect();

    cache.set(b"a", &value).unwrap();
    assert_eq!(get_bytes(&cache, b"a"), Some(value));

    let stats = cache.stats().unwrap();
    assert_eq!(stats.used_entries, 1);
    assert_eq!(stats.data_used, 32);
    assert_eq!(stats.data_size, 256);
    assert_eq!(stats.group_count, 2);
}

#[test]
fn test_lookup_of_absent_key_misses() {
    let cache = MemBuffer::new(&config(256, 2)).unwrap();
    assert_eq!(get_bytes(&cache, b"nothing"), None);

    let stats = cache.stats().unwrap();
    assert_eq!(stats.total_reads, 1);
    assert_eq!(stats.total_hits, 0);
}

#[test]
fn test_overwrite_is_visible_immediately() {
    let cache = MemBuffer::new(&config(1024, 2)).unwrap();
    for round in 0u8..8 {
        cache.set(b"k", &vec![round; 48]).unwrap();
        assert_eq!(get_bytes(&cache, b"k"), Some(vec![round; 48]));
    }
    assert_eq!(cache.stats().unwrap().used_entries, 1);
}

// ============================================================================
// Group saturation
// ============================================================================

#[test]
fn test_fifth_key_in_full_group_evicts_coldest() {
    // A single-group directory makes every key collide.
    let cache = MemBuffer::new(&config(4096, 1)).unwrap();
    for key in [&b"k1"[..], b"k2", b"k3", b"k4"] {
        cache.set(key, &[0; 16]).unwrap();
    }
    // k1 stays cold; the others earn one hit each.
    for key in [&b"k2"[..], b"k3", b"k4"] {
        assert!(get_bytes(&cache, key).is_some());
    }

    cache.set(b"k5", &[0; 16]).unwrap();

    assert_eq!(get_bytes(&cache, b"k1"), None, "coldest key must go");
    for key in [&b"k2"[..], b"k3", b"k4", b"k5"] {
        assert!(get_bytes(&cache, key).is_some(), "{:?} missing", key);
    }
    assert_eq!(cache.stats().unwrap().used_entries, 4);
}

#[test]
fn test_forced_group_eviction_taxes_survivors() {
    let cache = MemBuffer::new(&config(4096, 1)).unwrap();
    for key in [&b"k1"[..], b"k2", b"k3", b"k4"] {
        cache.set(key, &[0; 16]).unwrap();
    }
    for key in [&b"k2"[..], b"k3", b"k4"] {
        assert!(get_bytes(&cache, key).is_some());
    }
    assert_eq!(cache.stats().unwrap().hit_count, 3);

    // The forced eviction halves every surviving slot's hit count:
    // three single hits round down to zero.
    cache.set(b"k5", &[0; 16]).unwrap();
    assert_eq!(cache.stats().unwrap().hit_count, 0);
}

// ============================================================================
// Oversize rejection
// ============================================================================

#[test]
fn test_payload_above_quarter_arena_is_rejected() {
    let cache = MemBuffer::new(&config(256, 2)).unwrap();
    cache.set(b"big", &[0; 80]).unwrap();

    assert_eq!(get_bytes(&cache, b"big"), None);
    let stats = cache.stats().unwrap();
    assert_eq!(stats.used_entries, 0);
    assert_eq!(stats.total_writes, 0);
}

#[test]
fn test_rejected_store_still_drops_old_mapping() {
    let cache = MemBuffer::new(&config(256, 2)).unwrap();
    cache.set(b"k", &[1; 32]).unwrap();
    assert!(get_bytes(&cache, b"k").is_some());

    cache.set(b"k", &[2; 80]).unwrap();
    assert_eq!(get_bytes(&cache, b"k"), None);
    assert_eq!(cache.stats().unwrap().used_entries, 0);
}

// ============================================================================
// Sliding window
// ============================================================================

#[test]
fn test_wrap_around_admits_new_entry() {
    let cache = MemBuffer::new(&config(256, 2)).unwrap();
    let keys: Vec<String> = (0..4).map(|i| format!("wrap-{}", i)).collect();
    for key in &keys {
        cache.set(key.as_bytes(), &[3; 64]).unwrap();
    }
    // One hit each: with avg = 1 every threshold draw is 0 or 1, so the
    // first window pass keeps all four.
    for key in &keys {
        assert!(get_bytes(&cache, key.as_bytes()).is_some());
    }

    cache.set(b"fresh", &[9; 32]).unwrap();

    assert_eq!(get_bytes(&cache, b"fresh"), Some(vec![9; 32]));
    let stats = cache.stats().unwrap();
    assert!(stats.used_entries >= 1 && stats.used_entries <= 5);
    assert!(stats.data_used <= stats.data_size);
}

#[test]
fn test_window_pass_halves_surviving_hit_count() {
    let cache = MemBuffer::new(&config(256, 2)).unwrap();
    cache.set(b"warm", &[7; 16]).unwrap();
    cache.set(b"gap", &[0; 64]).unwrap();
    cache.set(b"f1", &[0; 64]).unwrap();
    cache.set(b"f2", &[0; 64]).unwrap();
    for _ in 0..10 {
        assert!(get_bytes(&cache, b"warm").is_some());
    }

    // Punch a hole right behind "warm", then overflow the trailing
    // space: the window wraps, passes over "warm" (10 hits beats any
    // threshold), halves it and lands in the hole.
    cache.set(b"gap", &[0; 200]).unwrap();
    cache.set(b"f4", &[0; 64]).unwrap();

    let stats = cache.stats().unwrap();
    assert_eq!(stats.hit_count, 5);
    assert_eq!(stats.used_entries, 4);
    assert_eq!(get_bytes(&cache, b"warm"), Some(vec![7; 16]));
}

#[test]
fn test_churn_far_beyond_capacity_stays_consistent() {
    let cache = MemBuffer::new(&config(1024, 2)).unwrap();

    // Write 20x the arena worth of data.
    for i in 0u32..320 {
        let key = format!("churn-{}", i);
        cache.set(key.as_bytes(), &vec![i as u8; 64]).unwrap();
        // The entry just admitted must be readable before anything else
        // happens.
        assert_eq!(get_bytes(&cache, key.as_bytes()), Some(vec![i as u8; 64]));
    }

    let stats = cache.stats().unwrap();
    assert_eq!(stats.total_writes, 320);
    assert!(stats.data_used <= stats.data_size);
    assert!(stats.used_entries <= 8, "more entries than directory slots");
}

// ============================================================================
// Facade behavior
// ============================================================================

#[test]
fn test_facade_namespaces_do_not_interfere() {
    let core = Arc::new(MemBuffer::new(&config(4096, 2)).unwrap());
    let texts = TypedCache::new(Arc::clone(&core), "texts", Utf8Codec).unwrap();
    let blobs = TypedCache::new(Arc::clone(&core), "blobs", BytesCodec).unwrap();

    texts.set(b"id", &"readable".to_string()).unwrap();
    blobs.set(b"id", &vec![0u8, 159, 146, 150]).unwrap();

    assert_eq!(texts.get(b"id").unwrap(), Some("readable".to_string()));
    assert_eq!(blobs.get(b"id").unwrap(), Some(vec![0u8, 159, 146, 150]));
}

#[test]
fn test_facade_iterate_is_unsupported() {
    let core = Arc::new(MemBuffer::new(&config(256, 2)).unwrap());
    let cache = TypedCache::bytes(core, "any").unwrap();
    assert!(matches!(cache.iterate(), Err(Error::Unsupported)));
}

#[test]
fn test_facade_reports_core_pressure() {
    let core = Arc::new(MemBuffer::new(&config(256, 2)).unwrap());
    let cache = TypedCache::bytes(Arc::clone(&core), "pressure").unwrap();

    // Keys are prefixed, so the effective key is 16 bytes longer than
    // what the caller passes; values behave exactly as on the core.
    cache.set(b"big", &vec![0u8; 80]).unwrap();
    assert_eq!(cache.get(b"big").unwrap(), None);
    assert_eq!(core.stats().unwrap().used_entries, 0);
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![no_main]

use libfuzzer_sys::fuzz_target;
use membuf::config::group_bytes;
use membuf::{CacheConfig, MemBuffer};

// Interpret the input as a script of cache operations against a tiny
// cache, so wrap-around and eviction fire constantly. Every stored
// value is the key byte repeated, which lets any later hit be checked
// for torn or misattributed payloads.
fuzz_target!(|data: &[u8]| {
    let directory = 2 * group_bytes();
    let config = CacheConfig::new(directory + 512 + 16, directory).with_rng_seed(0xF422);
    let cache = match MemBuffer::new(&config) {
        Ok(cache) => cache,
        Err(_) => return,
    };

    for op in data.chunks_exact(3) {
        let (kind, key_byte, len) = (op[0], op[1], usize::from(op[2]));
        let key = [key_byte, key_byte ^ 0x55];

        if kind & 1 == 0 {
            let value = vec![key_byte; len];
            let _ = cache.set(&key, &value);
        } else {
            let hit = cache
                .get_with(&key, |bytes| Ok(bytes.to_vec()))
                .unwrap_or(None);
            if let Some(bytes) = hit {
                assert!(bytes.iter().all(|&b| b == key_byte));
            }
        }
    }
});

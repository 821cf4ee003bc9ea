// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Key fingerprints and group-index derivation.
//!
//! Full keys are never stored. Each key is reduced to a 128-bit digest
//! ("fingerprint") and fingerprint equality stands in for key equality;
//! users have only limited control over full keys, so constructing a
//! collision is impractical. The directory group for a fingerprint is
//! derived by folding its 32-bit words with a rotating mix.

use crate::error::Result;

/// Width of a key fingerprint in bytes.
pub const FINGERPRINT_LEN: usize = 16;

/// 128-bit digest standing in for a full cache key.
pub type Fingerprint = [u8; FINGERPRINT_LEN];

/// Reduces arbitrary key bytes to a [`Fingerprint`].
///
/// The digest must be deterministic and at least 128 bits wide. A hasher
/// failure makes the key un-indexable: lookups miss and stores become
/// no-ops, without surfacing the underlying error.
pub trait KeyHasher: Send + Sync {
    /// Digest `key` into a fingerprint.
    ///
    /// # Errors
    /// [`Error::DigestFailed`] if the underlying hasher fails.
    fn digest(&self, key: &[u8]) -> Result<Fingerprint>;
}

/// Default hasher: MD5.
///
/// MD5 is chosen for digest width and speed (SHA-1 is more than twice as
/// slow) and never fails. Cryptographic strength is not required here;
/// the cache only needs collision resistance for benign inputs.
#[derive(Debug, Default, Clone, Copy)]
pub struct Md5Hasher;

impl KeyHasher for Md5Hasher {
    fn digest(&self, key: &[u8]) -> Result<Fingerprint> {
        use md5::{Digest, Md5};

        let mut hasher = Md5::new();
        hasher.update(key);
        let result = hasher.finalize();

        let mut fingerprint = [0u8; FINGERPRINT_LEN];
        fingerprint.copy_from_slice(&result);
        Ok(fingerprint)
    }
}

/// Fold a fingerprint down to a directory group index.
///
/// XOR-folds the four little-endian 32-bit words, rotating the
/// accumulator between folds so word order matters, then reduces modulo
/// `group_count`. `group_count` must be non-zero.
pub(crate) fn group_index(fingerprint: &Fingerprint, group_count: u32) -> u32 {
    debug_assert!(group_count > 0);

    let mut hash: u32 = 0;
    for chunk in fingerprint.chunks_exact(4) {
        let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        hash = hash.wrapping_add(word ^ hash.rotate_left(13));
    }
    hash % group_count
}

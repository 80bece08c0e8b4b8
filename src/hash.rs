//! Key fingerprints.
//!
//! Two hashes with two jobs: a 32-bit djb2 fingerprint selects memory
//! partitions and hash buckets, and a SHA-256 hex digest disperses keys
//! across the disk-tier directory namespace, where collision resistance
//! actually matters to avoid cross-key aliasing on disk.

use sha2::{Digest, Sha256};

/// 32-bit djb2 fingerprint: seeded at 5381, `h = h * 33 + byte` per byte.
#[inline]
pub fn djb2(key: &[u8]) -> u32 {
    let mut h: u32 = 5381;
    for &b in key {
        h = h.wrapping_mul(33).wrapping_add(u32::from(b));
    }
    h
}

/// Lowercase 64-character SHA-256 hex digest of `key`.
pub fn sha256_hex(key: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key);
    format!("{:x}", hasher.finalize())
}

/// Index of the memory partition responsible for `key`.
#[inline]
pub fn partition_index(key: &[u8], partitions: usize) -> usize {
    debug_assert!(partitions > 0);
    (djb2(key) as usize) % partitions
}

/// Bucket index within a partition's hash table. `buckets` must be a power
/// of two.
#[inline]
pub fn bucket_index(key: &[u8], buckets: usize) -> usize {
    debug_assert!(buckets.is_power_of_two());
    (djb2(key) as usize) & (buckets - 1)
}

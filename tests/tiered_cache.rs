//! Tier-orchestration scenarios: spill, promotion, partition isolation, and
//! cross-tier residency.

use podcache::hash::partition_index;
use podcache::prelude::*;
use tempfile::TempDir;

const KIB: usize = 1024;

fn cache(total: usize, partitions: usize) -> (TempDir, TieredCache) {
    let root = TempDir::new().unwrap();
    let cache = TieredCache::new(total, partitions, root.path()).unwrap();
    (root, cache)
}

fn value(len: usize, fill: u8) -> Vec<u8> {
    vec![fill; len]
}

/// Filling a 200 KiB partition with five 60 KiB entries: after k4 the
/// partition holds {k2,k3,k4} with k1 on disk, after k5 it holds {k3,k4,k5}
/// with {k1,k2} on disk.
#[test]
fn sequential_inserts_spill_in_lru_order() {
    let (_root, cache) = cache(200 * KIB, 1);

    for (i, key) in [&b"k1"[..], b"k2", b"k3", b"k4"].iter().enumerate() {
        cache.put(key, &value(60 * KIB, b'1' + i as u8)).unwrap();
    }
    assert!(!cache.memory_contains(b"k1"));
    assert!(cache.disk().contains(b"k1"));
    for key in [&b"k2"[..], b"k3", b"k4"] {
        assert!(cache.memory_contains(key));
        assert!(!cache.disk().contains(key));
    }
    assert_eq!(cache.partition_len(0), 3);

    cache.put(b"k5", &value(60 * KIB, b'5')).unwrap();
    for key in [&b"k1"[..], b"k2"] {
        assert!(!cache.memory_contains(key));
        assert!(cache.disk().contains(key));
    }
    for key in [&b"k3"[..], b"k4", b"k5"] {
        assert!(cache.memory_contains(key));
    }
    assert_eq!(cache.disk().len(), 2);
}

/// Continuing the spill scenario: reading k1 promotes it back into memory
/// with the original bytes, displaces the then-tail, and removes the disk
/// copy.
#[test]
fn disk_read_promotes_and_displaces_current_tail() {
    let (_root, cache) = cache(200 * KIB, 1);
    let original = value(60 * KIB, b'1');

    cache.put(b"k1", &original).unwrap();
    for (key, fill) in [(&b"k2"[..], b'2'), (b"k3", b'3'), (b"k4", b'4'), (b"k5", b'5')] {
        cache.put(key, &value(60 * KIB, fill)).unwrap();
    }
    // Memory now {k3,k4,k5}, disk {k1,k2}.

    let read_back = cache.get(b"k1").unwrap().expect("k1 must be served from disk");
    assert_eq!(read_back, original);

    assert!(cache.memory_contains(b"k1"));
    assert!(!cache.disk().contains(b"k1"));
    // k3 was the tail at promotion time and went to disk in its place.
    assert!(!cache.memory_contains(b"k3"));
    assert!(cache.disk().contains(b"k3"));
    assert_eq!(cache.partition_len(0), 3);
}

/// Two keys in different partitions: overflowing one partition never evicts
/// from the other.
#[test]
fn partitions_are_isolated() {
    const PARTITIONS: usize = 4;
    let (_root, cache) = cache(40 * KIB, PARTITIONS); // 10 KiB each

    // Probe for keys landing in two distinct partitions.
    let keys: Vec<Vec<u8>> = (0..64u32).map(|i| format!("probe-{i}").into_bytes()).collect();
    let target = partition_index(&keys[0], PARTITIONS);
    let other_key = keys
        .iter()
        .find(|k| partition_index(k, PARTITIONS) != target)
        .expect("64 probes must span more than one partition");

    cache.put(other_key, &value(KIB, b'x')).unwrap();

    // Overflow the target partition several times over.
    let mut stuffed = 0u32;
    for (i, key) in keys.iter().enumerate() {
        if partition_index(key, PARTITIONS) == target {
            cache.put(key, &value(4 * KIB, b'0' + (i % 10) as u8)).unwrap();
            stuffed += 1;
        }
    }
    assert!(stuffed >= 3, "need enough keys to overflow the partition");

    // The other partition never spilled.
    assert!(cache.memory_contains(other_key));
    assert_eq!(
        cache.partition_usage(partition_index(other_key, PARTITIONS)).0,
        KIB
    );
}

/// Round-trip: any value that fits the partition is returned intact no
/// matter how many distinct keys were written in between.
#[test]
fn round_trip_survives_interleaved_writes() {
    let (_root, cache) = cache(8 * KIB, 1);
    let wanted = value(3 * KIB, b'w');
    cache.put(b"wanted", &wanted).unwrap();

    for i in 0..32u32 {
        cache
            .put(format!("filler-{i}").as_bytes(), &value(2 * KIB, b'f'))
            .unwrap();
    }

    assert_eq!(cache.get(b"wanted").unwrap(), Some(wanted));
}

/// After any sequence of operations no key is resident in memory and on
/// disk at the same time.
#[test]
fn no_dual_residency_after_mixed_operations() {
    let (_root, cache) = cache(4 * KIB, 2);
    let keys: Vec<Vec<u8>> = (0..24u32).map(|i| format!("key-{i}").into_bytes()).collect();

    for (i, key) in keys.iter().enumerate() {
        cache.put(key, &value(KIB, b'a' + (i % 26) as u8)).unwrap();
        if i % 3 == 0 {
            let _ = cache.get(&keys[i / 2]).unwrap();
        }
        if i % 7 == 0 {
            cache.evict(&keys[i / 3]);
        }
    }

    for key in &keys {
        assert!(
            !(cache.memory_contains(key) && cache.disk().contains(key)),
            "dual residency for {:?}",
            String::from_utf8_lossy(key)
        );
    }
}

/// The LRU victim is determined at the moment of the spill: after touching
/// `a`, inserting a fourth entry displaces `b`.
#[test]
fn touched_entries_survive_the_next_spill() {
    let (_root, cache) = cache(3 * KIB, 1);
    cache.put(b"a", &value(KIB, b'a')).unwrap();
    cache.put(b"b", &value(KIB, b'b')).unwrap();
    cache.put(b"c", &value(KIB, b'c')).unwrap();

    cache.get(b"a").unwrap();
    cache.put(b"d", &value(KIB, b'd')).unwrap();

    assert!(cache.memory_contains(b"a"));
    assert!(!cache.memory_contains(b"b"));
    assert!(cache.disk().contains(b"b"));
}

/// Values above the partition budget are refused outright; spilling could
/// never admit them.
#[test]
fn oversized_values_are_refused() {
    let (_root, cache) = cache(2 * KIB, 2); // 1 KiB per partition
    let too_big = value(KIB + 1, b'x');
    assert!(matches!(
        cache.put(b"big", &too_big),
        Err(StoreError::TooLarge)
    ));
    assert_eq!(cache.get(b"big").unwrap(), None);
    assert!(cache.disk().is_empty());
}

/// Deleting a spilled key removes it from disk; deleting again reports a
/// miss.
#[test]
fn evict_spans_both_tiers() {
    let (_root, cache) = cache(2 * KIB, 1);
    cache.put(b"a", &value(KIB, b'a')).unwrap();
    cache.put(b"b", &value(KIB, b'b')).unwrap();
    cache.put(b"c", &value(KIB, b'c')).unwrap(); // spills a

    assert!(cache.disk().contains(b"a"));
    assert!(cache.evict(b"a"));
    assert!(!cache.disk().contains(b"a"));
    assert!(!cache.evict(b"a"));
    assert_eq!(cache.get(b"a").unwrap(), None);
}

/// Dropping the cache removes the disk tier's base directory entirely.
#[test]
fn shutdown_cleans_the_disk_tier() {
    let root = TempDir::new().unwrap();
    let base = {
        let cache = TieredCache::new(2 * KIB, 1, root.path()).unwrap();
        cache.put(b"a", &value(KIB, b'a')).unwrap();
        cache.put(b"b", &value(KIB, b'b')).unwrap();
        cache.put(b"c", &value(KIB, b'c')).unwrap();
        assert!(cache.disk().base_dir().exists());
        cache.disk().base_dir().to_path_buf()
    };
    assert!(!base.exists());
    // The configured parent directory itself is untouched.
    assert!(root.path().is_dir());
}

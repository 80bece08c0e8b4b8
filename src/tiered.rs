//! Two-tier cache orchestration.
//!
//! A [`TieredCache`] owns `P` independently-locked [`MemoryPartition`]s and
//! one [`DiskStore`]. Keys are routed by djb2 fingerprint; each partition
//! receives `total_capacity / P` bytes of budget.
//!
//! ```text
//!                         ┌──────────────────┐
//!         key ──djb2──►   │  partition i     │──┐
//!                         ├──────────────────┤  │  Full: spill tail
//!                         │  partition ...   │  ▼
//!                         ├──────────────────┤ ┌──────────────┐
//!                         │  partition P-1   │ │  DiskStore   │
//!                         └──────────────────┘ └──────────────┘
//!                                  ▲  promote on disk hit  │
//!                                  └────────────────────────┘
//! ```
//!
//! Tier rules:
//!
//! - **Spill** always targets the tail of the key's own partition, never
//!   another partition. The victim is written to disk before it is unlinked,
//!   and the incoming put is retried until admitted.
//! - **Promotion** targets the partition computed from the key's djb2 — the
//!   same partition that spilled it. After a successful promotion the disk
//!   copy is deleted: no key is resident in both tiers at once.
//! - The orchestrator holds **no lock of its own**; between a memory miss
//!   and the disk read another thread may promote the key, in which case the
//!   disk read sees it already gone. A `None` result is authoritative only
//!   for the moment of the call.

use std::path::Path;

use tracing::{debug, warn};

use crate::disk::DiskStore;
use crate::error::StoreError;
use crate::hash::partition_index;
use crate::partition::{MemoryPartition, PutOutcome};

/// Upper bound on the partition count.
pub const MAX_PARTITIONS: usize = 64;

/// The tiered cache: `P` memory partitions backed by one disk store.
pub struct TieredCache {
    partitions: Vec<MemoryPartition>,
    disk: DiskStore,
}

impl TieredCache {
    /// Creates `partitions` memory partitions of `total_capacity /
    /// partitions` bytes each, plus the disk tier under `fs_root`.
    ///
    /// # Panics
    ///
    /// Panics if `partitions` is zero or above [`MAX_PARTITIONS`]; the
    /// configuration layer clamps the value before it gets here.
    pub fn new(
        total_capacity: usize,
        partitions: usize,
        fs_root: &Path,
    ) -> Result<Self, StoreError> {
        assert!(
            (1..=MAX_PARTITIONS).contains(&partitions),
            "partition count out of range"
        );
        let per_partition = total_capacity / partitions;
        let partitions = (0..partitions)
            .map(|_| MemoryPartition::new(per_partition))
            .collect();
        let disk = DiskStore::create(fs_root)?;
        Ok(TieredCache { partitions, disk })
    }

    /// Stores `key` → `value`, spilling LRU entries to disk as needed.
    ///
    /// Returns [`StoreError::TooLarge`] when the value can never fit its
    /// partition, and [`StoreError::Spill`] when writing a victim to disk
    /// fails (the memory tier is left unchanged in that case).
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let partition = self.partition_for(key);
        if value.len() > partition.capacity_bytes() {
            return Err(StoreError::TooLarge);
        }
        self.put_with_spill(partition, key, value)
    }

    /// Looks up `key` in memory, then on disk. A disk hit is promoted back
    /// into memory and the disk copy removed; when promotion fails the
    /// value is still returned and the disk copy stays.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let partition = self.partition_for(key);
        if let Some(value) = partition.get(key)? {
            return Ok(Some(value));
        }
        let Some(value) = self.disk.get(key)? else {
            return Ok(None);
        };

        if value.len() <= partition.capacity_bytes() {
            match self.put_with_spill(partition, key, &value) {
                Ok(()) => {
                    self.disk.evict(key);
                    debug!(key_len = key.len(), "promoted disk entry to memory");
                }
                Err(err) => {
                    warn!(%err, "promotion failed, leaving entry on disk");
                }
            }
        }
        Ok(Some(value))
    }

    /// Removes `key` from whichever tier holds it. Returns whether an entry
    /// was removed.
    pub fn evict(&self, key: &[u8]) -> bool {
        if self.partition_for(key).evict(key) {
            return true;
        }
        self.disk.evict(key)
    }

    /// Number of memory partitions.
    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// `(used_bytes, capacity_bytes)` for partition `index`.
    pub fn partition_usage(&self, index: usize) -> (usize, usize) {
        let p = &self.partitions[index];
        (p.used_bytes(), p.capacity_bytes())
    }

    /// Number of entries resident in partition `index`.
    pub fn partition_len(&self, index: usize) -> usize {
        self.partitions[index].len()
    }

    /// Whether `key` is resident in its memory partition.
    pub fn memory_contains(&self, key: &[u8]) -> bool {
        self.partition_for(key).contains(key)
    }

    /// The disk tier.
    pub fn disk(&self) -> &DiskStore {
        &self.disk
    }

    #[inline]
    fn partition_for(&self, key: &[u8]) -> &MemoryPartition {
        &self.partitions[partition_index(key, self.partitions.len())]
    }

    /// The normative spill loop: on `Full`, write the tail to disk, unlink
    /// it, and retry until the entry is admitted. A tail that is the
    /// incoming key itself is popped without a disk write — the put is
    /// replacing it, and spilling would strand a stale copy on disk.
    fn put_with_spill(
        &self,
        partition: &MemoryPartition,
        key: &[u8],
        value: &[u8],
    ) -> Result<(), StoreError> {
        loop {
            match partition.put(key, value)? {
                PutOutcome::Inserted | PutOutcome::Updated => return Ok(()),
                PutOutcome::Full => {
                    let Some(victim) = partition.peek_tail() else {
                        // Nothing left to spill and still over budget.
                        return Err(StoreError::TooLarge);
                    };
                    if victim.key != key {
                        self.disk
                            .put(&victim.key, &victim.value)
                            .map_err(into_spill)?;
                        debug!(
                            victim_len = victim.value.len(),
                            "spilled tail entry to disk"
                        );
                    }
                    partition.pop_tail();
                }
            }
        }
    }
}

impl std::fmt::Debug for TieredCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredCache")
            .field("partitions", &self.partitions.len())
            .field("disk_entries", &self.disk.len())
            .finish_non_exhaustive()
    }
}

fn into_spill(err: StoreError) -> StoreError {
    match err {
        StoreError::Disk(io) => StoreError::Spill(io),
        other => other,
    }
}

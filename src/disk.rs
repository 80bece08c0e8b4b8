//! Content-addressable disk overflow store.
//!
//! Spill victims from the memory tier land here. Each key maps to a leaf
//! directory derived from its SHA-256 digest: the 64 hex characters are cut
//! into four 16-character path segments under a per-run base directory.
//!
//! ```text
//!   <fs_root>/<8-hex-random>/            base, created once per run
//!     └── 9f86d081884c7d65/             hex[ 0..16]
//!          └── 9a2feaa0c55ad015/        hex[16..32]
//!               └── a3bf4f1b2b0b822c/   hex[32..48]
//!                    └── d15d6c15b0f00a08/   hex[48..64]  (leaf)
//!                         ├── value.dat      raw bytes
//!                         └── time.dat       decimal epoch seconds
//! ```
//!
//! The disk tier is ephemeral scratch space: the base directory is removed
//! recursively when the store is destroyed, and nothing survives a restart.
//!
//! Alongside the filesystem the store keeps a registry of leaf paths that
//! currently hold data. Correctness of `get`/`put`/`evict` never depends on
//! it (paths derive from the key); it exists so present disk keys can be
//! enumerated.
//!
//! A single coarse mutex serializes all operations, so a reader can never
//! observe a half-written `value.dat` for a key another thread is writing.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::hash::sha256_hex;

const SEGMENT_LEN: usize = 16;
const VALUE_FILE: &str = "value.dat";
const TIME_FILE: &str = "time.dat";

/// The on-disk overflow tier.
pub struct DiskStore {
    base: PathBuf,
    registry: Mutex<Vec<PathBuf>>,
}

impl DiskStore {
    /// Creates the store under `<root>/<8-hex-random-suffix>/`.
    ///
    /// The suffix randomizes per run so concurrent or crashed instances
    /// never collide on the same tree.
    pub fn create(root: &Path) -> Result<Self, StoreError> {
        let suffix: u32 = rand::thread_rng().gen();
        let base = root.join(format!("{suffix:08x}"));
        fs::create_dir_all(&base)?;
        debug!(base = %base.display(), "disk store created");
        Ok(DiskStore {
            base,
            registry: Mutex::new(Vec::new()),
        })
    }

    /// The per-run base directory.
    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    /// Writes `value` (plus a creation timestamp) under the leaf for `key`,
    /// returning the leaf path.
    ///
    /// An existing leaf for the key is torn down first so the new leaf is
    /// always created fresh. On failure no partially populated leaf is left
    /// behind (best effort).
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<PathBuf, StoreError> {
        let leaf = self.leaf_dir(key);
        let mut registry = self.registry.lock();

        if leaf.is_dir() {
            fs::remove_dir_all(&leaf)?;
        }
        // Intermediate segments may be shared with other keys; only the
        // leaf itself must be fresh.
        if let Some(parent) = leaf.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::create_dir(&leaf)?;

        let populate = || -> std::io::Result<()> {
            fs::write(leaf.join(VALUE_FILE), value)?;
            fs::write(leaf.join(TIME_FILE), unix_time_secs().to_string())?;
            Ok(())
        };
        if let Err(err) = populate() {
            let _ = fs::remove_dir_all(&leaf);
            return Err(StoreError::Disk(err));
        }

        if !registry.iter().any(|p| p == &leaf) {
            registry.push(leaf.clone());
        }
        debug!(leaf = %leaf.display(), bytes = value.len(), "disk put");
        Ok(leaf)
    }

    /// Reads the value stored for `key`, or `None` when the key has no leaf.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.leaf_dir(key).join(VALUE_FILE);
        let _registry = self.registry.lock();
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::Disk(err)),
        }
    }

    /// Whether a value is currently stored for `key`.
    pub fn contains(&self, key: &[u8]) -> bool {
        let path = self.leaf_dir(key).join(VALUE_FILE);
        let _registry = self.registry.lock();
        path.is_file()
    }

    /// Removes the leaf for `key` and prunes now-empty ancestor segments.
    ///
    /// Pruning stops at the first ancestor that refuses to go (other keys
    /// may share path prefixes). Returns `true` iff the leaf was removed.
    pub fn evict(&self, key: &[u8]) -> bool {
        let leaf = self.leaf_dir(key);
        let mut registry = self.registry.lock();

        let _ = fs::remove_file(leaf.join(VALUE_FILE));
        let _ = fs::remove_file(leaf.join(TIME_FILE));
        let removed = fs::remove_dir(&leaf).is_ok();
        if removed {
            let mut dir = leaf.parent();
            while let Some(d) = dir {
                if d == self.base || fs::remove_dir(d).is_err() {
                    break;
                }
                dir = d.parent();
            }
            debug!(leaf = %leaf.display(), "disk evict");
        }
        registry.retain(|p| p != &leaf);
        removed
    }

    /// Number of leaves currently registered.
    pub fn len(&self) -> usize {
        self.registry.lock().len()
    }

    /// Whether the registry holds no leaves.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the registered leaf paths.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.registry.lock().clone()
    }

    /// Recursively removes the base directory and everything under it.
    ///
    /// The registry is not trusted to enumerate cleanup targets; the whole
    /// tree goes. Idempotent.
    pub fn destroy(&self) {
        let mut registry = self.registry.lock();
        registry.clear();
        match fs::remove_dir_all(&self.base) {
            Ok(()) => debug!(base = %self.base.display(), "disk store destroyed"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => {
                warn!(base = %self.base.display(), %err, "failed to remove disk store base");
            }
        }
    }

    fn leaf_dir(&self, key: &[u8]) -> PathBuf {
        let hex = sha256_hex(key);
        let mut path = self.base.clone();
        for i in 0..4 {
            path.push(&hex[i * SEGMENT_LEN..(i + 1) * SEGMENT_LEN]);
        }
        path
    }
}

impl Drop for DiskStore {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn unix_time_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

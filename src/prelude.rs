//! Convenience re-exports of the commonly used podcache types.

pub use crate::config::ServerConfig;
pub use crate::disk::DiskStore;
pub use crate::error::{InvariantError, ProtocolError, StoreError};
pub use crate::partition::{MemoryPartition, PutOutcome, TailEntry};
pub use crate::server::{Server, ShutdownHandle};
pub use crate::tiered::TieredCache;

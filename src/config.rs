//! Environment-driven server configuration.
//!
//! The server is configured exclusively through `PODCACHE_*` environment
//! variables; there are no CLI arguments. Out-of-range or unparseable values
//! fall back to the default with a warning.
//!
//! | Variable                | Default | Range       | Effect                          |
//! |-------------------------|---------|-------------|---------------------------------|
//! | `PODCACHE_SIZE`         | 100     | 1..=4096    | Total memory capacity in MiB    |
//! | `PODCACHE_SERVER_PORT`  | 6379    | 1024..=65535| Listening TCP port              |
//! | `PODCACHE_PARTITIONS`   | 1       | 1..=64      | Number of memory partitions     |
//! | `PODCACHE_FSROOT`       | `./`    | path        | Parent dir for the disk tier    |

use std::path::PathBuf;

use tracing::warn;

pub const DEFAULT_SIZE_MB: u64 = 100;
pub const DEFAULT_PORT: u64 = 6379;
pub const DEFAULT_PARTITIONS: u64 = 1;
pub const DEFAULT_FSROOT: &str = "./";

/// Server configuration resolved from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Total in-memory capacity in MiB, split evenly across partitions.
    pub size_mb: u64,
    /// Listening TCP port.
    pub port: u16,
    /// Number of memory partitions.
    pub partitions: usize,
    /// Parent directory for the disk-tier base directory.
    pub fs_root: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            size_mb: DEFAULT_SIZE_MB,
            port: DEFAULT_PORT as u16,
            partitions: DEFAULT_PARTITIONS as usize,
            fs_root: PathBuf::from(DEFAULT_FSROOT),
        }
    }
}

impl ServerConfig {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Self {
        Self {
            size_mb: env_int("PODCACHE_SIZE", DEFAULT_SIZE_MB, 1, 4096),
            port: env_int("PODCACHE_SERVER_PORT", DEFAULT_PORT, 1024, 65535) as u16,
            partitions: env_int("PODCACHE_PARTITIONS", DEFAULT_PARTITIONS, 1, 64) as usize,
            fs_root: std::env::var_os("PODCACHE_FSROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FSROOT)),
        }
    }

    /// Total memory capacity in bytes.
    #[inline]
    pub fn capacity_bytes(&self) -> usize {
        self.size_mb as usize * 1024 * 1024
    }
}

/// Reads an integer environment variable, falling back to `default` (with a
/// warning) when the value is missing, unparseable, or outside `[min, max]`.
fn env_int(name: &str, default: u64, min: u64, max: u64) -> u64 {
    let Some(raw) = std::env::var_os(name) else {
        return default;
    };
    match raw.to_str().and_then(|s| s.parse::<u64>().ok()) {
        Some(v) if (min..=max).contains(&v) => v,
        _ => {
            warn!(
                var = name,
                value = ?raw,
                default,
                "invalid configuration value, using default"
            );
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test uses its own variable name so parallel test threads cannot
    // step on each other's environment.

    #[test]
    fn env_int_missing_uses_default() {
        assert_eq!(env_int("PODCACHE_TEST_MISSING", 100, 1, 4096), 100);
    }

    #[test]
    fn env_int_in_range_is_used() {
        std::env::set_var("PODCACHE_TEST_IN_RANGE", "512");
        assert_eq!(env_int("PODCACHE_TEST_IN_RANGE", 100, 1, 4096), 512);
    }

    #[test]
    fn env_int_out_of_range_falls_back() {
        std::env::set_var("PODCACHE_TEST_TOO_BIG", "5000");
        assert_eq!(env_int("PODCACHE_TEST_TOO_BIG", 100, 1, 4096), 100);

        std::env::set_var("PODCACHE_TEST_TOO_SMALL", "0");
        assert_eq!(env_int("PODCACHE_TEST_TOO_SMALL", 100, 1, 4096), 100);
    }

    #[test]
    fn env_int_garbage_falls_back() {
        std::env::set_var("PODCACHE_TEST_GARBAGE", "12abc");
        assert_eq!(env_int("PODCACHE_TEST_GARBAGE", 6379, 1024, 65535), 6379);

        std::env::set_var("PODCACHE_TEST_NEGATIVE", "-5");
        assert_eq!(env_int("PODCACHE_TEST_NEGATIVE", 6379, 1024, 65535), 6379);
    }

    #[test]
    fn defaults_match_documented_table() {
        let config = ServerConfig::default();
        assert_eq!(config.size_mb, 100);
        assert_eq!(config.port, 6379);
        assert_eq!(config.partitions, 1);
        assert_eq!(config.fs_root, PathBuf::from("./"));
        assert_eq!(config.capacity_bytes(), 100 * 1024 * 1024);
    }
}

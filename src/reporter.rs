//! Periodic cache status reporting.
//!
//! A background thread that logs per-partition usage every ten seconds.
//! Best-effort: it carries no correctness contract and follows the server's
//! running flag for shutdown.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::info;

use crate::tiered::TieredCache;

const REPORT_INTERVAL: Duration = Duration::from_secs(10);
/// Wake-up granularity, so shutdown is noticed well before the next report.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Spawns the status-reporter thread.
pub fn spawn(
    cache: Arc<TieredCache>,
    running: Arc<AtomicBool>,
) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("podcache-status".into())
        .spawn(move || run(&cache, &running))
}

fn run(cache: &TieredCache, running: &AtomicBool) {
    let mut since_report = Duration::ZERO;
    while running.load(Ordering::SeqCst) {
        thread::sleep(POLL_INTERVAL);
        since_report += POLL_INTERVAL;
        if since_report < REPORT_INTERVAL {
            continue;
        }
        since_report = Duration::ZERO;
        report(cache);
    }
}

fn report(cache: &TieredCache) {
    for index in 0..cache.partition_count() {
        let (used, capacity) = cache.partition_usage(index);
        let usage_pct = if capacity == 0 {
            0.0
        } else {
            used as f64 / capacity as f64 * 100.0
        };
        info!(
            partition = index,
            used_bytes = used,
            capacity_bytes = capacity,
            usage_pct = format_args!("{usage_pct:.1}"),
            "cache status"
        );
    }
}

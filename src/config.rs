//! Store configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_DEMOTE_DELAY: Duration = Duration::from_secs(10);

pub const DEFAULT_RETENTION: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_RETENTION_MONITOR_INTERVAL: Duration = Duration::from_secs(60);

pub const DEFAULT_HALT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_HALT_LOCK_TTL: Duration = Duration::from_secs(30);
pub const DEFAULT_HALT_LOCK_MONITOR_INTERVAL: Duration = Duration::from_secs(5);

pub const DEFAULT_BEGIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Tunable store behaviour. The defaults are suitable for production; tests
/// shrink the delays.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreOptions {
    /// Pause between lease-loop iterations after a failure or disconnect.
    pub reconnect_delay: Duration,
    /// Pause after a manual demotion before contending for the lease again.
    pub demote_delay: Duration,

    /// How long applied LTX files are kept on disk.
    pub retention: Duration,
    /// How often retention is enforced. Zero disables the monitor.
    pub retention_monitor_interval: Duration,

    /// Budget for acquiring the write lock when granting a HALT lock.
    pub halt_acquire_timeout: Duration,
    /// Lifetime of a granted HALT lock.
    pub halt_lock_ttl: Duration,
    /// How often expired HALT locks are swept.
    pub halt_lock_monitor_interval: Duration,

    /// Budget for write-lock acquisition at transaction begin.
    pub begin_timeout: Duration,

    /// Compress LTX bodies with LZ4 when producing files.
    pub compress: bool,

    /// Verify the full database checksum after every apply. Expensive;
    /// intended for tests.
    pub strict_verify: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            demote_delay: DEFAULT_DEMOTE_DELAY,
            retention: DEFAULT_RETENTION,
            retention_monitor_interval: DEFAULT_RETENTION_MONITOR_INTERVAL,
            halt_acquire_timeout: DEFAULT_HALT_ACQUIRE_TIMEOUT,
            halt_lock_ttl: DEFAULT_HALT_LOCK_TTL,
            halt_lock_monitor_interval: DEFAULT_HALT_LOCK_MONITOR_INTERVAL,
            begin_timeout: DEFAULT_BEGIN_TIMEOUT,
            compress: false,
            strict_verify: false,
        }
    }
}

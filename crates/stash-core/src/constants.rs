//! Pipeline defaults.
//!
//! Every value here can be overridden through [`crate::Config::from_env`].

use std::time::Duration;

/// Maximum accepted payload size (10 MiB).
pub const DEFAULT_MAX_FILE_SIZE: usize = 10 * 1024 * 1024;

/// Extensions accepted by the validator, without the leading dot.
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "txt", "png", "jpg", "jpeg",
];

/// Files older than this are removed by the retention sweeper.
pub const DEFAULT_RETENTION_DAYS: u64 = 30;

/// Time between two retention sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

pub const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;

/// Base unit of the linear retry backoff: attempt `i` waits `i * base`.
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound for a single object store call.
pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_PRIMARY_BUCKET: &str = "attachments";
pub const DEFAULT_QUARANTINE_BUCKET: &str = "attachments-quarantine";

pub const DEFAULT_CLAMAV_PORT: u16 = 3310;

/// Number of leading bytes inspected when sniffing content type.
pub const SNIFF_WINDOW: usize = 8192;

/// Seconds in a day, for converting retention days to a [`Duration`].
pub const SECS_PER_DAY: u64 = 24 * 60 * 60;

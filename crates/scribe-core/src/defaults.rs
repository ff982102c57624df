//! Default values and tunable constants shared across scribe crates.
//!
//! Environment-variable overrides follow the pattern `SCRIBE_<NAME>`; helpers
//! that read them live next to the constant they shadow.

/// Target size of each multipart upload part (10 MiB).
///
/// S3-compatible stores require every part except the last to be at least
/// 5 MiB, so this must never be lowered below that.
pub const PART_SIZE_BYTES: i64 = 10 * 1024 * 1024;

/// How long an upload session stays usable after initiation (24 hours).
pub const UPLOAD_SESSION_TTL_SECS: i64 = 24 * 60 * 60;

/// Presigned part URL validity window (15 minutes).
pub const PRESIGNED_URL_TTL_SECS: u64 = 15 * 60;

/// Bounded retries for transient object-store failures.
pub const STORAGE_MAX_RETRIES: u32 = 3;

/// Base backoff between storage retries in milliseconds (doubled per attempt).
pub const STORAGE_RETRY_BACKOFF_MS: u64 = 250;

/// Job worker polling interval when the queue is empty.
pub const JOB_POLL_INTERVAL_MS: u64 = 500;

/// Maximum jobs a worker processes concurrently.
pub const JOB_MAX_CONCURRENT: usize = 4;

/// Stale-upload sweep interval (5 minutes).
pub const UPLOAD_SWEEP_INTERVAL_SECS: u64 = 300;

/// Maximum sessions expired per sweep batch.
pub const UPLOAD_SWEEP_BATCH: i64 = 50;

/// Event bus broadcast buffer capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Per-request timeout for transcription engine calls (30 minutes — the
/// engine processes whole files synchronously).
pub const ENGINE_TIMEOUT_SECS: u64 = 30 * 60;

//! Structured logging field name constants for scribe.
//!
//! All crates use these constants for consistent structured logging fields so
//! log aggregation tools can query by standardized names across subsystems.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Invariant violations (double quota release), degraded service |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration (parts recorded, segments ingested) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Correlation ID propagated across request → job → sub-calls.
/// Format: UUIDv7 (time-ordered).
pub const REQUEST_ID: &str = "request_id";

/// Subsystem originating the log event.
/// Values: "api", "db", "storage", "engine", "jobs"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "uploads", "quota", "worker", "s3", "pool"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "initiate", "complete_upload", "try_reserve", "claim_next"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Upload session UUID being operated on.
pub const UPLOAD_ID: &str = "upload_id";

/// Transcription job UUID being processed.
pub const JOB_ID: &str = "job_id";

/// Transcript segment UUID being edited.
pub const SEGMENT_ID: &str = "segment_id";

/// Opaque owner/user identifier.
pub const USER_ID: &str = "user_id";

/// Object store key.
pub const OBJECT_KEY: &str = "object_key";

/// Multipart part number.
pub const PART_NUMBER: &str = "part_number";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of parts recorded / expected.
pub const PART_COUNT: &str = "part_count";

/// Number of segments ingested.
pub const SEGMENT_COUNT: &str = "segment_count";

/// File size in bytes.
pub const FILE_SIZE: &str = "file_size_bytes";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Plan limit name on quota denials.
pub const LIMIT: &str = "limit";

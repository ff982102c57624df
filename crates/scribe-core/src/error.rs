//! Error types for the scribe backend.

use serde::Serialize;
use thiserror::Error;

/// Result type alias using scribe's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Which plan limit a quota denial hit.
///
/// Carried by [`Error::PlanLimitExceeded`] so callers (and the API layer)
/// can tell the user exactly what to upgrade or wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    FileSize,
    FileDuration,
    ConcurrentJobs,
    DailyJobs,
    Translation,
}

impl LimitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitKind::FileSize => "file_size",
            LimitKind::FileDuration => "file_duration",
            LimitKind::ConcurrentJobs => "concurrent_jobs",
            LimitKind::DailyJobs => "daily_jobs",
            LimitKind::Translation => "translation",
        }
    }
}

/// Core error type for scribe operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Malformed or out-of-range input (part number, file size, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource not found (or not owned by the caller)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Upload session not found
    #[error("Upload session not found: {0}")]
    SessionNotFound(uuid::Uuid),

    /// Transcription job not found
    #[error("Job not found: {0}")]
    JobNotFound(uuid::Uuid),

    /// State conflict: incomplete completion, duplicate finalize, stale edit version
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Quota denial, carries which limit was hit
    #[error("Plan limit exceeded ({}): {message}", .limit.as_str())]
    PlanLimitExceeded { limit: LimitKind, message: String },

    /// Engine-side failure surfaced to the job's Failed state
    #[error("Transcription error: {0}")]
    Transcription(String),

    /// Object store operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Retryable object store failure (timeout / 5xx after bounded retries)
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Caller does not own the referenced resource / missing principal
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a quota denial.
    pub fn limit(limit: LimitKind, message: impl Into<String>) -> Self {
        Error::PlanLimitExceeded {
            limit,
            message: message.into(),
        }
    }

    /// Whether the caller may retry the operation unchanged.
    ///
    /// Quota and validation errors are deterministic; only transient storage
    /// failures qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::StorageUnavailable(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_display_validation() {
        let err = Error::Validation("part number out of range".to_string());
        assert_eq!(err.to_string(), "Validation error: part number out of range");
    }

    #[test]
    fn test_error_display_session_not_found() {
        let id = Uuid::nil();
        let err = Error::SessionNotFound(id);
        assert_eq!(err.to_string(), format!("Upload session not found: {}", id));
    }

    #[test]
    fn test_error_display_job_not_found() {
        let id = Uuid::new_v4();
        let err = Error::JobNotFound(id);
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn test_error_display_conflict() {
        let err = Error::Conflict("upload incomplete: 2 of 3 parts".to_string());
        assert_eq!(
            err.to_string(),
            "Conflict: upload incomplete: 2 of 3 parts"
        );
    }

    #[test]
    fn test_error_display_plan_limit() {
        let err = Error::limit(LimitKind::ConcurrentJobs, "limit of 1 reached");
        assert_eq!(
            err.to_string(),
            "Plan limit exceeded (concurrent_jobs): limit of 1 reached"
        );
    }

    #[test]
    fn test_limit_kind_strings_are_unique() {
        let kinds = [
            LimitKind::FileSize,
            LimitKind::FileDuration,
            LimitKind::ConcurrentJobs,
            LimitKind::DailyJobs,
            LimitKind::Translation,
        ];
        let mut strings: Vec<&str> = kinds.iter().map(|k| k.as_str()).collect();
        strings.sort();
        strings.dedup();
        assert_eq!(strings.len(), kinds.len());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::StorageUnavailable("timeout".into()).is_retryable());
        assert!(!Error::Storage("malformed part".into()).is_retryable());
        assert!(!Error::Validation("bad input".into()).is_retryable());
        assert!(!Error::limit(LimitKind::DailyJobs, "10 reached").is_retryable());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}

//! Core data model for uploads, jobs, and transcript segments.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Upload sessions
// ============================================================================

/// Lifecycle state of a multipart upload session.
///
/// `Completed` is only reachable once every part number in
/// `[1, total_parts]` has a recorded tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadSessionStatus {
    Open,
    Completing,
    Completed,
    Aborted,
    Expired,
}

impl UploadSessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadSessionStatus::Open => "open",
            UploadSessionStatus::Completing => "completing",
            UploadSessionStatus::Completed => "completed",
            UploadSessionStatus::Aborted => "aborted",
            UploadSessionStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "open" => UploadSessionStatus::Open,
            "completing" => UploadSessionStatus::Completing,
            "completed" => UploadSessionStatus::Completed,
            "aborted" => UploadSessionStatus::Aborted,
            "expired" => UploadSessionStatus::Expired,
            _ => UploadSessionStatus::Expired, // fallback
        }
    }

    /// Terminal states accept no further mutation.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadSessionStatus::Completed
                | UploadSessionStatus::Aborted
                | UploadSessionStatus::Expired
        )
    }
}

/// A chunked upload session against the object store.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub id: Uuid,
    pub owner_id: String,
    pub object_key: String,
    /// Remote multipart upload identifier issued by the object store.
    pub store_upload_id: Option<String>,
    pub file_name: String,
    pub content_type: String,
    pub file_size_bytes: i64,
    pub part_size_bytes: i64,
    pub total_parts: i32,
    pub status: UploadSessionStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl UploadSession {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && self.expires_at <= now
    }
}

/// One recorded part of a multipart upload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPart {
    pub part_number: i32,
    pub etag: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Result of initiating an upload session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatedUpload {
    pub upload_id: Uuid,
    pub object_key: String,
    pub part_size_bytes: i64,
    pub total_parts: i32,
    pub expires_at: DateTime<Utc>,
}

/// A presigned part-upload URL with its validity window.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedPartUrl {
    pub part_number: i32,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Number of parts a file of `file_size_bytes` splits into.
pub fn total_parts(file_size_bytes: i64, part_size_bytes: i64) -> i32 {
    debug_assert!(part_size_bytes > 0);
    ((file_size_bytes + part_size_bytes - 1) / part_size_bytes) as i32
}

// ============================================================================
// Transcription jobs
// ============================================================================

/// Transcription job lifecycle state.
///
/// Terminal states: `Completed`, `Failed`, `Cancelled`. Every transition into
/// a terminal state releases the job's quota reservation exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => JobStatus::Pending,
            "queued" => JobStatus::Queued,
            "processing" => JobStatus::Processing,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            "cancelled" => JobStatus::Cancelled,
            _ => JobStatus::Pending, // fallback
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// States a given target status may legally be entered from.
    pub fn valid_sources(target: JobStatus) -> &'static [JobStatus] {
        match target {
            JobStatus::Pending => &[],
            JobStatus::Queued => &[JobStatus::Pending],
            JobStatus::Processing => &[JobStatus::Queued],
            JobStatus::Completed => &[JobStatus::Processing],
            JobStatus::Failed => &[JobStatus::Processing],
            JobStatus::Cancelled => &[
                JobStatus::Pending,
                JobStatus::Queued,
                JobStatus::Processing,
            ],
        }
    }
}

/// Translation hand-off state recorded on a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslationStatus {
    Pending,
    Translating,
    Completed,
    Failed,
}

impl TranslationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranslationStatus::Pending => "pending",
            TranslationStatus::Translating => "translating",
            TranslationStatus::Completed => "completed",
            TranslationStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "pending" => TranslationStatus::Pending,
            "translating" => TranslationStatus::Translating,
            "completed" => TranslationStatus::Completed,
            "failed" => TranslationStatus::Failed,
            _ => TranslationStatus::Pending, // fallback
        }
    }
}

/// A transcription job over a finalized media object.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptionJob {
    pub id: Uuid,
    pub user_id: String,
    pub media_object_key: String,
    pub status: JobStatus,
    /// True while the job holds a quota slot; flipped exactly once when the
    /// job reaches a terminal state.
    pub quota_reserved: bool,
    pub priority: i32,
    pub duration_seconds: f64,
    pub language: Option<String>,
    pub error_message: Option<String>,
    pub translation_status: Option<TranslationStatus>,
    pub translation_language: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Transcript segments
// ============================================================================

/// One ordered segment of a transcript.
///
/// `original_text` is set once at ingestion and never overwritten; all edits
/// go through `current_text` with an optimistic version counter.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptSegment {
    pub id: Uuid,
    pub job_id: Uuid,
    pub sequence_index: i32,
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub original_text: String,
    pub current_text: String,
    pub version: i32,
    pub last_edited_by: Option<String>,
    pub last_edited_at: Option<DateTime<Utc>>,
}

/// Segment content produced by the transcription engine, before persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentDraft {
    pub sequence_index: i32,
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub text: String,
}

// ============================================================================
// Usage reporting
// ============================================================================

/// Read-only usage statistics for a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub used_minutes_this_month: f64,
    pub jobs_created_today: i32,
    pub active_jobs: i32,
}

// ============================================================================
// Quota reservation
// ============================================================================

/// Single-use token representing capacity consumed by one job.
///
/// Returned by a successful quota reservation and consumed exactly once —
/// either bound to a created job (whose terminal transition releases it) or
/// released directly when job creation fails after the reservation.
#[must_use = "a reservation holds a quota slot until bound to a job or released"]
#[derive(Debug)]
pub struct Reservation {
    pub user_id: String,
    pub jobs_created_today: i32,
    pub active_jobs: i32,
}

//! Job admission, cancellation, translation hand-off, and usage reporting.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use scribe_core::{
    Error, EventBus, PlanGuard, PlanLimits, PlanTier, Result, ServerEvent, TranscriptSegment,
    TranscriptionJob, UploadSessionStatus, UsageStats,
};
use scribe_db::{Database, NewJob};

/// Usage report combining live counters with the caller's limit snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageResponse {
    pub plan_type: PlanTier,
    pub usage: UsageStats,
    pub limits: PlanLimits,
}

/// A job together with its ordered transcript segments.
#[derive(Debug, Clone, Serialize)]
pub struct JobDetail {
    #[serde(flatten)]
    pub job: TranscriptionJob,
    pub segments: Vec<TranscriptSegment>,
}

/// Service for transcription job operations.
#[derive(Clone)]
pub struct JobService {
    db: Database,
    bus: Arc<EventBus>,
}

impl JobService {
    pub fn new(db: Database, bus: Arc<EventBus>) -> Self {
        Self { db, bus }
    }

    /// Admit a job for a finalized upload.
    ///
    /// The session supplies the object key and the verified byte size; the
    /// caller supplies the probed duration. Admission itself (size, duration,
    /// concurrent, daily) happens atomically in the repository.
    pub async fn create(
        &self,
        user_id: &str,
        limits: &PlanLimits,
        upload_id: Uuid,
        duration_seconds: f64,
        language: Option<String>,
    ) -> Result<TranscriptionJob> {
        if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
            return Err(Error::Validation(
                "durationSeconds must be positive".into(),
            ));
        }

        let session = self.db.uploads.fetch_owned(upload_id, user_id).await?;
        if session.status != UploadSessionStatus::Completed {
            return Err(Error::Validation(format!(
                "upload session is {}, expected completed",
                session.status.as_str()
            )));
        }

        let job = self
            .db
            .jobs
            .create(
                NewJob {
                    user_id: user_id.to_string(),
                    media_object_key: session.object_key,
                    file_size_bytes: session.file_size_bytes,
                    duration_seconds,
                    language,
                },
                limits,
            )
            .await?;

        self.bus.emit(ServerEvent::JobQueued {
            job_id: job.id,
            user_id: job.user_id.clone(),
            object_key: job.media_object_key.clone(),
        });
        Ok(job)
    }

    /// Fetch a job with its transcript.
    pub async fn get(&self, user_id: &str, job_id: Uuid) -> Result<JobDetail> {
        let job = self.db.jobs.get_owned(job_id, user_id).await?;
        let segments = self.db.segments.list(job_id).await?;
        Ok(JobDetail { job, segments })
    }

    /// Cancel a job; duplicates are a no-op.
    pub async fn cancel(&self, user_id: &str, job_id: Uuid) -> Result<TranscriptionJob> {
        let job = self.db.jobs.cancel(job_id, user_id).await?;
        self.bus.emit(ServerEvent::JobCancelled { job_id: job.id });
        Ok(job)
    }

    /// Queue a translation hand-off for an external collaborator.
    pub async fn translate(
        &self,
        user_id: &str,
        limits: &PlanLimits,
        job_id: Uuid,
        target_language: &str,
    ) -> Result<TranscriptionJob> {
        let target_language = target_language.trim();
        if target_language.is_empty() || target_language.len() > 16 {
            return Err(Error::Validation("targetLanguage must be a language code".into()));
        }
        PlanGuard::ensure_translation_allowed(limits)?;

        let job = self
            .db
            .jobs
            .mark_translation_pending(job_id, user_id, target_language)
            .await?;

        info!(
            subsystem = "api",
            component = "jobs",
            op = "translate",
            job_id = %job.id,
            target_language,
            "Translation hand-off queued"
        );
        self.bus.emit(ServerEvent::TranslationQueued {
            job_id: job.id,
            target_language: target_language.to_string(),
        });
        Ok(job)
    }

    /// Edit a transcript segment with optimistic concurrency.
    pub async fn update_segment(
        &self,
        user_id: &str,
        job_id: Uuid,
        segment_id: Uuid,
        text: &str,
        expected_version: i32,
    ) -> Result<TranscriptSegment> {
        let segment = self
            .db
            .segments
            .update(job_id, segment_id, user_id, text, expected_version)
            .await?;
        self.bus.emit(ServerEvent::SegmentUpdated {
            job_id,
            segment_id,
            version: segment.version,
        });
        Ok(segment)
    }

    /// Revert a transcript segment to its machine-generated original.
    pub async fn revert_segment(
        &self,
        user_id: &str,
        job_id: Uuid,
        segment_id: Uuid,
    ) -> Result<TranscriptSegment> {
        let segment = self.db.segments.revert(job_id, segment_id, user_id).await?;
        self.bus.emit(ServerEvent::SegmentUpdated {
            job_id,
            segment_id,
            version: segment.version,
        });
        Ok(segment)
    }

    /// Read-only usage report for the caller.
    pub async fn usage(
        &self,
        user_id: &str,
        tier: PlanTier,
        limits: PlanLimits,
    ) -> Result<UsageResponse> {
        let usage = self.db.quota.snapshot(user_id).await?;
        Ok(UsageResponse {
            plan_type: tier,
            usage,
            limits,
        })
    }
}

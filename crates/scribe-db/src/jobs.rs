//! Transcription job repository: admission, claiming, and lifecycle
//! transitions.
//!
//! Every status change is a guarded `UPDATE ... WHERE status = ANY(...)`
//! returning the row, so racing transitions (user cancel vs. engine
//! completion) resolve to exactly one winner; the loser observes the terminal
//! state and gets a typed conflict. Terminal transitions release the quota
//! reservation inside the same transaction.

use std::sync::Arc;

use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tokio::sync::Notify;
use tracing::{error, info};
use uuid::Uuid;

use scribe_core::{
    Error, JobStatus, PlanGuard, PlanLimits, Result, TranscriptOutput, TranscriptionJob,
    TranslationStatus,
};

use crate::{quota, segments};

/// Parameters for admitting a new transcription job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub user_id: String,
    pub media_object_key: String,
    pub file_size_bytes: i64,
    pub duration_seconds: f64,
    pub language: Option<String>,
}

const JOB_COLUMNS: &str = "id, user_id, media_object_key, status::text, quota_reserved, \
     priority, duration_seconds, language, error_message, translation_status, \
     translation_language, created_at, started_at, completed_at";

fn parse_job_row(row: PgRow) -> TranscriptionJob {
    TranscriptionJob {
        id: row.get("id"),
        user_id: row.get("user_id"),
        media_object_key: row.get("media_object_key"),
        status: JobStatus::parse(row.get("status")),
        quota_reserved: row.get("quota_reserved"),
        priority: row.get("priority"),
        duration_seconds: row.get("duration_seconds"),
        language: row.get("language"),
        error_message: row.get("error_message"),
        translation_status: row
            .get::<Option<String>, _>("translation_status")
            .as_deref()
            .map(TranslationStatus::parse),
        translation_language: row.get("translation_language"),
        created_at: row.get("created_at"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
    }
}

/// PostgreSQL transcription job repository.
pub struct PgTranscriptionJobRepository {
    pool: PgPool,
    /// Notify handle for event-driven worker wake.
    notify: Arc<Notify>,
}

impl PgTranscriptionJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            notify: Arc::new(Notify::new()),
        }
    }

    /// Get the job notification handle for event-driven worker waking.
    pub fn job_notify(&self) -> Arc<Notify> {
        self.notify.clone()
    }

    /// Admit and persist a new job in `Queued` state.
    ///
    /// File size and duration are checked first (deterministic denials before
    /// any write), then the concurrent/daily reservation and the job insert
    /// run in one transaction — if the insert fails the reservation rolls
    /// back with it, so no slot is ever leaked.
    pub async fn create(&self, req: NewJob, limits: &PlanLimits) -> Result<TranscriptionJob> {
        PlanGuard::ensure_file_size(limits, req.file_size_bytes)?;
        PlanGuard::ensure_duration(limits, req.duration_seconds)?;

        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let reservation = quota::try_reserve(&mut tx, &req.user_id, limits).await?;

        let job_id = Uuid::now_v7();
        let now = Utc::now();

        // The insert is guarded against a concurrent active job for the same
        // media object (also enforced by a partial unique index).
        let row = sqlx::query(&format!(
            "INSERT INTO transcription_job
                 (id, user_id, media_object_key, status, quota_reserved, priority,
                  duration_seconds, language, created_at)
             SELECT $1, $2, $3, 'queued'::job_status, TRUE, $4, $5, $6, $7
             WHERE NOT EXISTS (
                 SELECT 1 FROM transcription_job
                 WHERE media_object_key = $3
                   AND status IN ('pending'::job_status, 'queued'::job_status,
                                  'processing'::job_status)
             )
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(job_id)
        .bind(&req.user_id)
        .bind(&req.media_object_key)
        .bind(limits.priority)
        .bind(req.duration_seconds)
        .bind(&req.language)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let Some(row) = row else {
            // Rollback also undoes the reservation increments.
            drop(reservation);
            return Err(Error::Conflict(format!(
                "a transcription job for {} is already pending or processing",
                req.media_object_key
            )));
        };

        tx.commit().await.map_err(Error::Database)?;
        self.notify.notify_waiters();

        info!(
            subsystem = "db",
            component = "jobs",
            op = "create",
            job_id = %job_id,
            user_id = %req.user_id,
            object_key = %req.media_object_key,
            active_jobs = reservation.active_jobs,
            "Transcription job admitted"
        );
        Ok(parse_job_row(row))
    }

    /// Claim the next queued job for processing (`Queued -> Processing`).
    ///
    /// Uses `FOR UPDATE SKIP LOCKED` so concurrent workers never claim the
    /// same job. Higher-priority plans are claimed first.
    pub async fn claim_next(&self) -> Result<Option<TranscriptionJob>> {
        let row = sqlx::query(&format!(
            "UPDATE transcription_job
             SET status = 'processing'::job_status, started_at = $1
             WHERE id = (
                 SELECT id FROM transcription_job
                 WHERE status = 'queued'::job_status
                 ORDER BY priority DESC, created_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(parse_job_row))
    }

    /// Record a successful engine run: `Processing -> Completed`, segment
    /// ingestion, monthly-minutes accounting, and quota release — atomically.
    ///
    /// Returns the completed job and the number of segments ingested.
    pub async fn complete(
        &self,
        job_id: Uuid,
        output: &TranscriptOutput,
    ) -> Result<(TranscriptionJob, usize)> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let row = sqlx::query(&format!(
            "UPDATE transcription_job
             SET status = 'completed'::job_status,
                 completed_at = $2,
                 duration_seconds = CASE WHEN $3 > 0 THEN $3 ELSE duration_seconds END,
                 language = COALESCE($4, language)
             WHERE id = $1 AND status = 'processing'::job_status
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(job_id)
        .bind(Utc::now())
        .bind(output.duration_seconds)
        .bind(&output.language)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let Some(row) = row else {
            drop(tx);
            return Err(self.invalid_transition(job_id, JobStatus::Completed).await);
        };
        let job = parse_job_row(row);

        self.release_terminal(&mut tx, job_id).await?;
        let ingested = segments::insert_drafts(&mut tx, job_id, &output.segments).await?;
        quota::add_monthly_minutes(&mut tx, &job.user_id, job.duration_seconds / 60.0).await?;

        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "db",
            component = "jobs",
            op = "complete",
            job_id = %job_id,
            segment_count = ingested,
            "Transcription job completed"
        );
        Ok((job, ingested))
    }

    /// Record an engine failure: `Processing -> Failed` with quota release.
    pub async fn fail(&self, job_id: Uuid, error_message: &str) -> Result<TranscriptionJob> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let row = sqlx::query(&format!(
            "UPDATE transcription_job
             SET status = 'failed'::job_status, completed_at = $2, error_message = $3
             WHERE id = $1 AND status = 'processing'::job_status
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(job_id)
        .bind(Utc::now())
        .bind(error_message)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let Some(row) = row else {
            drop(tx);
            return Err(self.invalid_transition(job_id, JobStatus::Failed).await);
        };

        self.release_terminal(&mut tx, job_id).await?;
        tx.commit().await.map_err(Error::Database)?;
        Ok(parse_job_row(row))
    }

    /// Cancel a job from any non-terminal state.
    ///
    /// Duplicate cancels are a no-op; cancelling a job that already completed
    /// or failed is an invalid-transition conflict (the earlier transition
    /// won).
    pub async fn cancel(&self, job_id: Uuid, user_id: &str) -> Result<TranscriptionJob> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let row = sqlx::query(&format!(
            "UPDATE transcription_job
             SET status = 'cancelled'::job_status, completed_at = $3
             WHERE id = $1 AND user_id = $2
               AND status IN ('pending'::job_status, 'queued'::job_status,
                              'processing'::job_status)
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(job_id)
        .bind(user_id)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let Some(row) = row else {
            drop(tx);
            let job = self.get_owned(job_id, user_id).await?;
            return match job.status {
                JobStatus::Cancelled => Ok(job),
                other => Err(Error::Conflict(format!(
                    "cannot cancel: job already {}",
                    other.as_str()
                ))),
            };
        };

        self.release_terminal(&mut tx, job_id).await?;
        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "db",
            component = "jobs",
            op = "cancel",
            job_id = %job_id,
            "Transcription job cancelled"
        );
        Ok(parse_job_row(row))
    }

    /// Fetch a job owned by `user_id`.
    pub async fn get_owned(&self, job_id: Uuid, user_id: &str) -> Result<TranscriptionJob> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM transcription_job WHERE id = $1 AND user_id = $2"
        ))
        .bind(job_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(parse_job_row).ok_or(Error::JobNotFound(job_id))
    }

    /// Record a translation hand-off request on a completed job.
    pub async fn mark_translation_pending(
        &self,
        job_id: Uuid,
        user_id: &str,
        target_language: &str,
    ) -> Result<TranscriptionJob> {
        let row = sqlx::query(&format!(
            "UPDATE transcription_job
             SET translation_status = 'pending', translation_language = $3
             WHERE id = $1 AND user_id = $2 AND status = 'completed'::job_status
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(job_id)
        .bind(user_id)
        .bind(target_language)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(row) => Ok(parse_job_row(row)),
            None => {
                let job = self.get_owned(job_id, user_id).await?;
                Err(Error::Validation(format!(
                    "cannot translate: job is {}",
                    job.status.as_str()
                )))
            }
        }
    }

    /// Release the job's reservation as part of a terminal transition.
    ///
    /// The guarded status UPDATE guarantees this runs exactly once per job;
    /// a job found without its reservation at this point is an invariant
    /// violation that must be visible to operators, never swallowed.
    async fn release_terminal(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: Uuid,
    ) -> Result<()> {
        let released = quota::release_for_job(tx, job_id).await?;
        if !released {
            error!(
                subsystem = "db",
                component = "jobs",
                job_id = %job_id,
                "Job reached a terminal state without holding its quota reservation"
            );
        }
        Ok(())
    }

    /// Build the conflict error for a transition whose guard matched no row.
    async fn invalid_transition(&self, job_id: Uuid, target: JobStatus) -> Error {
        let current: Option<(String,)> =
            match sqlx::query_as("SELECT status::text FROM transcription_job WHERE id = $1")
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await
            {
                Ok(row) => row,
                Err(e) => return Error::Database(e),
            };

        match current {
            Some((status,)) => Error::Conflict(format!(
                "invalid transition to {}: job is {}",
                target.as_str(),
                status
            )),
            None => Error::JobNotFound(job_id),
        }
    }
}

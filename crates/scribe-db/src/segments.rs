//! Transcript segment repository: ingestion, optimistic edits, and reverts.
//!
//! `original_text` is written exactly once at ingestion and never updated by
//! any statement in this module. Edits are serialized per segment by the
//! version check — no cross-segment locking, segments are independent.

use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use scribe_core::{Error, JobStatus, Result, SegmentDraft, TranscriptSegment};

const SEGMENT_COLUMNS: &str = "id, job_id, sequence_index, start_seconds, end_seconds, \
     original_text, current_text, version, last_edited_by, last_edited_at";

fn parse_segment_row(row: PgRow) -> TranscriptSegment {
    TranscriptSegment {
        id: row.get("id"),
        job_id: row.get("job_id"),
        sequence_index: row.get("sequence_index"),
        start_seconds: row.get("start_seconds"),
        end_seconds: row.get("end_seconds"),
        original_text: row.get("original_text"),
        current_text: row.get("current_text"),
        version: row.get("version"),
        last_edited_by: row.get("last_edited_by"),
        last_edited_at: row.get("last_edited_at"),
    }
}

/// Insert engine output for a job. `current_text` starts equal to
/// `original_text`; both come from the machine-generated draft.
pub(crate) async fn insert_drafts(
    conn: &mut PgConnection,
    job_id: Uuid,
    drafts: &[SegmentDraft],
) -> Result<usize> {
    for draft in drafts {
        sqlx::query(
            "INSERT INTO transcript_segment
                 (id, job_id, sequence_index, start_seconds, end_seconds,
                  original_text, current_text, version)
             VALUES ($1, $2, $3, $4, $5, $6, $6, 1)",
        )
        .bind(Uuid::now_v7())
        .bind(job_id)
        .bind(draft.sequence_index)
        .bind(draft.start_seconds)
        .bind(draft.end_seconds)
        .bind(&draft.text)
        .execute(&mut *conn)
        .await
        .map_err(Error::Database)?;
    }
    Ok(drafts.len())
}

/// PostgreSQL transcript segment repository.
pub struct PgSegmentRepository {
    pool: PgPool,
}

impl PgSegmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// List a job's segments in transcript order.
    pub async fn list(&self, job_id: Uuid) -> Result<Vec<TranscriptSegment>> {
        let rows = sqlx::query(&format!(
            "SELECT {SEGMENT_COLUMNS} FROM transcript_segment
             WHERE job_id = $1 ORDER BY sequence_index"
        ))
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(parse_segment_row).collect())
    }

    /// Apply an edit with optimistic concurrency.
    ///
    /// The version check detects concurrent edits by two sessions: a stale
    /// `expected_version` fails with `Conflict` and mutates nothing — the
    /// caller re-fetches and retries.
    pub async fn update(
        &self,
        job_id: Uuid,
        segment_id: Uuid,
        editor: &str,
        new_text: &str,
        expected_version: i32,
    ) -> Result<TranscriptSegment> {
        self.ensure_editable(job_id, editor).await?;

        let row = sqlx::query(&format!(
            "UPDATE transcript_segment
             SET current_text = $4, version = version + 1,
                 last_edited_by = $5, last_edited_at = $6
             WHERE id = $1 AND job_id = $2 AND version = $3
             RETURNING {SEGMENT_COLUMNS}"
        ))
        .bind(segment_id)
        .bind(job_id)
        .bind(expected_version)
        .bind(new_text)
        .bind(editor)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        match row {
            Some(row) => {
                let segment = parse_segment_row(row);
                debug!(
                    subsystem = "db",
                    component = "segments",
                    op = "update",
                    segment_id = %segment_id,
                    version = segment.version,
                    "Segment edited"
                );
                Ok(segment)
            }
            None => Err(self.stale_or_missing(job_id, segment_id, expected_version).await),
        }
    }

    /// Revert a segment to its machine-generated original.
    ///
    /// Recorded idempotent event: the version bumps and audit fields update
    /// even when the text is already original, so the version counter stays a
    /// total order over every mutation attempt.
    pub async fn revert(
        &self,
        job_id: Uuid,
        segment_id: Uuid,
        editor: &str,
    ) -> Result<TranscriptSegment> {
        self.ensure_editable(job_id, editor).await?;

        let row = sqlx::query(&format!(
            "UPDATE transcript_segment
             SET current_text = original_text, version = version + 1,
                 last_edited_by = $3, last_edited_at = $4
             WHERE id = $1 AND job_id = $2
             RETURNING {SEGMENT_COLUMNS}"
        ))
        .bind(segment_id)
        .bind(job_id)
        .bind(editor)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(parse_segment_row).ok_or_else(|| {
            Error::NotFound(format!("segment {} not found in job {}", segment_id, job_id))
        })
    }

    /// Verify the job exists, belongs to the editor, and is completed.
    async fn ensure_editable(&self, job_id: Uuid, editor: &str) -> Result<()> {
        let row: Option<(String, String)> = sqlx::query_as(
            "SELECT user_id, status::text FROM transcription_job WHERE id = $1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        let Some((owner, status)) = row else {
            return Err(Error::JobNotFound(job_id));
        };
        if owner != editor {
            // Do not leak existence of other users' jobs.
            return Err(Error::JobNotFound(job_id));
        }
        if JobStatus::parse(&status) != JobStatus::Completed {
            return Err(Error::Validation(format!(
                "cannot edit transcript: job is {}",
                status
            )));
        }
        Ok(())
    }

    /// Distinguish a stale version from a missing segment after a failed CAS.
    async fn stale_or_missing(
        &self,
        job_id: Uuid,
        segment_id: Uuid,
        expected_version: i32,
    ) -> Error {
        let current: Option<(i32,)> = match sqlx::query_as(
            "SELECT version FROM transcript_segment WHERE id = $1 AND job_id = $2",
        )
        .bind(segment_id)
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        {
            Ok(row) => row,
            Err(e) => return Error::Database(e),
        };

        match current {
            Some((version,)) => Error::Conflict(format!(
                "stale segment version: expected {}, current {}",
                expected_version, version
            )),
            None => Error::NotFound(format!(
                "segment {} not found in job {}",
                segment_id, job_id
            )),
        }
    }
}

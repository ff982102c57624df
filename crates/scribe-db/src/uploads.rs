//! Upload session repository.
//!
//! Completion is serialized per session through a `FOR UPDATE` row lock plus
//! the `open -> completing` status flip, so the object-store finalize call can
//! only ever be issued by the single caller that won the flip.

use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use scribe_core::{Error, Result, UploadPart, UploadSession, UploadSessionStatus};

/// Parameters for creating a new upload session.
#[derive(Debug, Clone)]
pub struct NewUploadSession {
    pub owner_id: String,
    pub object_key: String,
    pub store_upload_id: String,
    pub file_name: String,
    pub content_type: String,
    pub file_size_bytes: i64,
    pub part_size_bytes: i64,
    pub total_parts: i32,
    pub ttl_secs: i64,
}

/// Outcome of starting a completion attempt.
#[derive(Debug)]
pub enum CompletionStart {
    /// This caller won the `open -> completing` flip and must run the
    /// finalize call, then settle the session with
    /// [`PgUploadSessionRepository::finish_completion`] or
    /// [`PgUploadSessionRepository::reopen`].
    Started {
        session: UploadSession,
        parts: Vec<UploadPart>,
    },
    /// The session already finalized; the stored key is returned unchanged.
    AlreadyCompleted { object_key: String },
}

const SESSION_COLUMNS: &str = "id, owner_id, object_key, store_upload_id, file_name, \
     content_type, file_size_bytes, part_size_bytes, total_parts, status::text, \
     created_at, expires_at, completed_at";

fn parse_session_row(row: PgRow) -> UploadSession {
    UploadSession {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        object_key: row.get("object_key"),
        store_upload_id: row.get("store_upload_id"),
        file_name: row.get("file_name"),
        content_type: row.get("content_type"),
        file_size_bytes: row.get("file_size_bytes"),
        part_size_bytes: row.get("part_size_bytes"),
        total_parts: row.get("total_parts"),
        status: UploadSessionStatus::parse(row.get("status")),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
        completed_at: row.get("completed_at"),
    }
}

/// PostgreSQL upload session repository.
pub struct PgUploadSessionRepository {
    pool: PgPool,
}

impl PgUploadSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create an `Open` session with an expiry.
    pub async fn create(&self, req: NewUploadSession) -> Result<UploadSession> {
        let id = Uuid::now_v7();
        let now = Utc::now();
        let expires_at = now + Duration::seconds(req.ttl_secs);

        let row = sqlx::query(&format!(
            "INSERT INTO upload_session
                 (id, owner_id, object_key, store_upload_id, file_name, content_type,
                  file_size_bytes, part_size_bytes, total_parts, status, created_at, expires_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'open'::upload_status, $10, $11)
             RETURNING {SESSION_COLUMNS}"
        ))
        .bind(id)
        .bind(&req.owner_id)
        .bind(&req.object_key)
        .bind(&req.store_upload_id)
        .bind(&req.file_name)
        .bind(&req.content_type)
        .bind(req.file_size_bytes)
        .bind(req.part_size_bytes)
        .bind(req.total_parts)
        .bind(now)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        info!(
            subsystem = "db",
            component = "uploads",
            op = "create",
            upload_id = %id,
            user_id = %req.owner_id,
            part_count = req.total_parts,
            file_size_bytes = req.file_size_bytes,
            "Upload session created"
        );
        Ok(parse_session_row(row))
    }

    /// Fetch a session owned by `owner_id`, lazily expiring an overdue `Open`
    /// session on access.
    ///
    /// Returns `SessionNotFound` for unknown sessions and for sessions owned
    /// by someone else (existence is not leaked).
    pub async fn fetch_owned(&self, id: Uuid, owner_id: &str) -> Result<UploadSession> {
        sqlx::query(
            "UPDATE upload_session SET status = 'expired'::upload_status
             WHERE id = $1 AND owner_id = $2 AND status = 'open'::upload_status
               AND expires_at <= $3",
        )
        .bind(id)
        .bind(owner_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM upload_session WHERE id = $1 AND owner_id = $2"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(parse_session_row).ok_or(Error::SessionNotFound(id))
    }

    /// Record a completed part. Idempotent: re-recording a part number
    /// overwrites its tag without changing part accounting.
    pub async fn record_part(
        &self,
        id: Uuid,
        owner_id: &str,
        part_number: i32,
        etag: &str,
    ) -> Result<()> {
        if etag.trim().is_empty() {
            return Err(Error::Validation("part tag must not be empty".into()));
        }

        let session = self.fetch_owned(id, owner_id).await?;
        ensure_open(&session)?;
        ensure_part_in_range(part_number, session.total_parts)?;

        sqlx::query(
            "INSERT INTO upload_part (session_id, part_number, etag, uploaded_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (session_id, part_number)
             DO UPDATE SET etag = EXCLUDED.etag, uploaded_at = EXCLUDED.uploaded_at",
        )
        .bind(id)
        .bind(part_number)
        .bind(etag)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "uploads",
            op = "record_part",
            upload_id = %id,
            part_number,
            "Part recorded"
        );
        Ok(())
    }

    /// All recorded parts of a session, ordered by part number.
    pub async fn parts(&self, id: Uuid) -> Result<Vec<UploadPart>> {
        let rows = sqlx::query(
            "SELECT part_number, etag, uploaded_at FROM upload_part
             WHERE session_id = $1 ORDER BY part_number",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| UploadPart {
                part_number: row.get("part_number"),
                etag: row.get("etag"),
                uploaded_at: row.get("uploaded_at"),
            })
            .collect())
    }

    /// Start a completion attempt.
    ///
    /// Locks the session row, verifies every part number in
    /// `[1, total_parts]` has a recorded tag, and flips `open -> completing`.
    /// A session missing parts stays `Open` and the caller gets `Conflict`;
    /// a session already `Completing` gets `Conflict` without a second
    /// finalize; a `Completed` session returns its object key unchanged.
    pub async fn begin_completion(&self, id: Uuid, owner_id: &str) -> Result<CompletionStart> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM upload_session
             WHERE id = $1 AND owner_id = $2 FOR UPDATE"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let session = row.map(parse_session_row).ok_or(Error::SessionNotFound(id))?;

        let now = Utc::now();
        if session.status == UploadSessionStatus::Open && session.expires_at <= now {
            sqlx::query(
                "UPDATE upload_session SET status = 'expired'::upload_status WHERE id = $1",
            )
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
            tx.commit().await.map_err(Error::Database)?;
            return Err(Error::SessionNotFound(id));
        }

        match session.status {
            UploadSessionStatus::Completed => {
                tx.commit().await.map_err(Error::Database)?;
                Ok(CompletionStart::AlreadyCompleted {
                    object_key: session.object_key,
                })
            }
            UploadSessionStatus::Completing => Err(Error::Conflict(
                "upload completion already in progress".into(),
            )),
            UploadSessionStatus::Aborted | UploadSessionStatus::Expired => Err(Error::Conflict(
                format!("upload session is {}", session.status.as_str()),
            )),
            UploadSessionStatus::Open => {
                let parts: Vec<(i32, String, DateTime<Utc>)> = sqlx::query_as(
                    "SELECT part_number, etag, uploaded_at FROM upload_part
                     WHERE session_id = $1 ORDER BY part_number",
                )
                .bind(id)
                .fetch_all(&mut *tx)
                .await
                .map_err(Error::Database)?;

                if parts.len() < session.total_parts as usize {
                    // Rolls back; the session stays Open for retry.
                    return Err(Error::Conflict(format!(
                        "upload incomplete: {} of {} parts recorded",
                        parts.len(),
                        session.total_parts
                    )));
                }

                sqlx::query(
                    "UPDATE upload_session SET status = 'completing'::upload_status WHERE id = $1",
                )
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(Error::Database)?;
                tx.commit().await.map_err(Error::Database)?;

                Ok(CompletionStart::Started {
                    session,
                    parts: parts
                        .into_iter()
                        .map(|(part_number, etag, uploaded_at)| UploadPart {
                            part_number,
                            etag,
                            uploaded_at,
                        })
                        .collect(),
                })
            }
        }
    }

    /// Settle a successful finalize: `completing -> completed`.
    pub async fn finish_completion(&self, id: Uuid) -> Result<UploadSession> {
        let row = sqlx::query(&format!(
            "UPDATE upload_session
             SET status = 'completed'::upload_status, completed_at = $2
             WHERE id = $1 AND status = 'completing'::upload_status
             RETURNING {SESSION_COLUMNS}"
        ))
        .bind(id)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(parse_session_row).ok_or_else(|| {
            Error::Internal(format!("session {} left completing state unexpectedly", id))
        })
    }

    /// Settle a failed finalize: `completing -> open`, leaving the session
    /// safely retryable.
    pub async fn reopen(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE upload_session SET status = 'open'::upload_status
             WHERE id = $1 AND status = 'completing'::upload_status",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    /// Abort a session from any non-terminal state. Idempotent: aborting an
    /// already aborted or expired session is a no-op.
    pub async fn abort(&self, id: Uuid, owner_id: &str) -> Result<UploadSession> {
        let row = sqlx::query(&format!(
            "UPDATE upload_session SET status = 'aborted'::upload_status
             WHERE id = $1 AND owner_id = $2
               AND status IN ('open'::upload_status, 'completing'::upload_status)
             RETURNING {SESSION_COLUMNS}"
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        if let Some(row) = row {
            return Ok(parse_session_row(row));
        }

        let session = self.fetch_owned(id, owner_id).await?;
        match session.status {
            UploadSessionStatus::Aborted | UploadSessionStatus::Expired => Ok(session),
            UploadSessionStatus::Completed => Err(Error::Conflict(
                "cannot abort a completed upload".into(),
            )),
            // The CAS above raced another transition; report the conflict.
            other => Err(Error::Conflict(format!(
                "upload session is {}",
                other.as_str()
            ))),
        }
    }

    /// Expire overdue `Open` sessions in one batch, returning them so the
    /// caller can abort their remote multipart uploads.
    pub async fn sweep_expired(&self, limit: i64) -> Result<Vec<UploadSession>> {
        let rows = sqlx::query(&format!(
            "UPDATE upload_session SET status = 'expired'::upload_status
             WHERE id IN (
                 SELECT id FROM upload_session
                 WHERE status = 'open'::upload_status AND expires_at <= $1
                 ORDER BY expires_at
                 LIMIT $2
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {SESSION_COLUMNS}"
        ))
        .bind(Utc::now())
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(parse_session_row).collect())
    }
}

fn ensure_open(session: &UploadSession) -> Result<()> {
    match session.status {
        UploadSessionStatus::Open => Ok(()),
        UploadSessionStatus::Expired => Err(Error::SessionNotFound(session.id)),
        other => Err(Error::Conflict(format!(
            "upload session is {}",
            other.as_str()
        ))),
    }
}

fn ensure_part_in_range(part_number: i32, total_parts: i32) -> Result<()> {
    if part_number < 1 || part_number > total_parts {
        return Err(Error::Validation(format!(
            "part number {} out of range [1, {}]",
            part_number, total_parts
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_range_bounds() {
        assert!(ensure_part_in_range(1, 3).is_ok());
        assert!(ensure_part_in_range(3, 3).is_ok());
        assert!(matches!(
            ensure_part_in_range(0, 3),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            ensure_part_in_range(4, 3),
            Err(Error::Validation(_))
        ));
    }
}

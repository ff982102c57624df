//! Upload coordination: multipart sessions against the object store.
//!
//! The repository serializes session state (the `open -> completing` flip);
//! this service owns the conversation with the object store — opening the
//! remote multipart upload, presigning part URLs, and running the single
//! finalize call for the completion winner.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use scribe_core::defaults::{PART_SIZE_BYTES, PRESIGNED_URL_TTL_SECS, UPLOAD_SESSION_TTL_SECS};
use scribe_core::{
    total_parts, Error, EventBus, InitiatedUpload, ObjectStore, PartTag, PlanGuard, PlanLimits,
    PresignedPartUrl, Result, ServerEvent, UploadSession, UploadSessionStatus,
};
use scribe_db::{CompletionStart, Database, NewUploadSession};

/// Coordinates multipart upload sessions between clients, the session store,
/// and the remote object store.
#[derive(Clone)]
pub struct UploadCoordinator {
    db: Database,
    store: Arc<dyn ObjectStore>,
    bus: Arc<EventBus>,
}

impl UploadCoordinator {
    pub fn new(db: Database, store: Arc<dyn ObjectStore>, bus: Arc<EventBus>) -> Self {
        Self { db, store, bus }
    }

    /// Open a new upload session and presign a URL for every part.
    ///
    /// File size is checked against the plan here, before any remote call —
    /// it is known long before duration, and admission re-checks it later.
    pub async fn initiate(
        &self,
        owner_id: &str,
        limits: &PlanLimits,
        file_name: &str,
        content_type: &str,
        file_size_bytes: i64,
    ) -> Result<(InitiatedUpload, Vec<PresignedPartUrl>)> {
        if file_size_bytes <= 0 {
            return Err(Error::Validation("fileSizeBytes must be positive".into()));
        }
        if content_type.trim().is_empty() {
            return Err(Error::Validation("contentType must not be empty".into()));
        }
        let file_name = sanitize_file_name(file_name)?;
        PlanGuard::ensure_file_size(limits, file_size_bytes)?;

        let object_key = format!("uploads/{}/{}/{}", owner_id, Uuid::now_v7(), file_name);
        let parts = total_parts(file_size_bytes, PART_SIZE_BYTES);

        let store_upload_id = self
            .store
            .initiate_multipart(&object_key, content_type)
            .await?;

        let session = self
            .db
            .uploads
            .create(NewUploadSession {
                owner_id: owner_id.to_string(),
                object_key,
                store_upload_id,
                file_name,
                content_type: content_type.to_string(),
                file_size_bytes,
                part_size_bytes: PART_SIZE_BYTES,
                total_parts: parts,
                ttl_secs: UPLOAD_SESSION_TTL_SECS,
            })
            .await?;

        let part_urls = self.presign_all(&session).await?;
        Ok((
            InitiatedUpload {
                upload_id: session.id,
                object_key: session.object_key,
                part_size_bytes: session.part_size_bytes,
                total_parts: session.total_parts,
                expires_at: session.expires_at,
            },
            part_urls,
        ))
    }

    /// Presign a fresh URL for one part (clients refresh as URLs expire).
    pub async fn part_url(
        &self,
        owner_id: &str,
        upload_id: Uuid,
        part_number: i32,
    ) -> Result<PresignedPartUrl> {
        let session = self.db.uploads.fetch_owned(upload_id, owner_id).await?;
        ensure_open(&session)?;
        if part_number < 1 || part_number > session.total_parts {
            return Err(Error::Validation(format!(
                "part number {} out of range [1, {}]",
                part_number, session.total_parts
            )));
        }
        self.presign_one(&session, part_number).await
    }

    /// Record a confirmed part tag. Idempotent for client retries.
    pub async fn record_part(
        &self,
        owner_id: &str,
        upload_id: Uuid,
        part_number: i32,
        etag: &str,
    ) -> Result<()> {
        self.db
            .uploads
            .record_part(upload_id, owner_id, part_number, etag)
            .await
    }

    /// Complete the upload, finalizing against the object store at most once.
    ///
    /// The winner of the repository's status flip runs the finalize call;
    /// concurrent duplicates observe `Completing` (conflict) or `Completed`
    /// (same object key). A transient store failure reopens the session so
    /// the client can retry.
    pub async fn complete(&self, owner_id: &str, upload_id: Uuid) -> Result<String> {
        match self.db.uploads.begin_completion(upload_id, owner_id).await? {
            CompletionStart::AlreadyCompleted { object_key } => Ok(object_key),
            CompletionStart::Started { session, parts } => {
                let store_upload_id = session.store_upload_id.clone().ok_or_else(|| {
                    Error::Internal(format!("session {} has no store upload id", session.id))
                })?;
                let tags: Vec<PartTag> = parts
                    .iter()
                    .map(|p| (p.part_number, p.etag.clone()))
                    .collect();

                match self
                    .store
                    .complete_multipart(&session.object_key, &store_upload_id, &tags)
                    .await
                {
                    Ok(()) => {
                        let completed = self.db.uploads.finish_completion(session.id).await?;
                        info!(
                            subsystem = "api",
                            component = "uploads",
                            op = "complete",
                            upload_id = %session.id,
                            object_key = %completed.object_key,
                            part_count = tags.len(),
                            "Upload finalized"
                        );
                        self.bus.emit(ServerEvent::UploadCompleted {
                            upload_id: session.id,
                            object_key: completed.object_key.clone(),
                        });
                        Ok(completed.object_key)
                    }
                    Err(e) => {
                        if let Err(reopen_err) = self.db.uploads.reopen(session.id).await {
                            warn!(
                                upload_id = %session.id,
                                error = %reopen_err,
                                "Failed to reopen session after finalize failure"
                            );
                        }
                        Err(e)
                    }
                }
            }
        }
    }

    /// Abort the session and discard uploaded parts. Idempotent.
    pub async fn abort(&self, owner_id: &str, upload_id: Uuid) -> Result<()> {
        let session = self.db.uploads.abort(upload_id, owner_id).await?;
        if let Some(store_upload_id) = session.store_upload_id.as_deref() {
            // Best-effort: the sweep retries storage cleanup later if this
            // fails, the session is already terminal.
            if let Err(e) = self
                .store
                .abort_multipart(&session.object_key, store_upload_id)
                .await
            {
                warn!(
                    upload_id = %session.id,
                    error = %e,
                    "Failed to abort remote multipart upload"
                );
            }
        }
        Ok(())
    }

    async fn presign_all(&self, session: &UploadSession) -> Result<Vec<PresignedPartUrl>> {
        let mut urls = Vec::with_capacity(session.total_parts as usize);
        for part_number in 1..=session.total_parts {
            urls.push(self.presign_one(session, part_number).await?);
        }
        Ok(urls)
    }

    async fn presign_one(
        &self,
        session: &UploadSession,
        part_number: i32,
    ) -> Result<PresignedPartUrl> {
        let store_upload_id = session.store_upload_id.as_deref().ok_or_else(|| {
            Error::Internal(format!("session {} has no store upload id", session.id))
        })?;
        let ttl = Duration::from_secs(PRESIGNED_URL_TTL_SECS);
        let url = self
            .store
            .presign_part(&session.object_key, store_upload_id, part_number, ttl)
            .await?;
        Ok(PresignedPartUrl {
            part_number,
            url,
            expires_at: Utc::now() + chrono::Duration::seconds(PRESIGNED_URL_TTL_SECS as i64),
        })
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

/// Keep the final path segment only and reject empty names.
fn sanitize_file_name(name: &str) -> Result<String> {
    let cleaned = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        return Err(Error::Validation("fileName must not be empty".into()));
    }
    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_file_name_strips_paths() {
        assert_eq!(sanitize_file_name("a.mp3").unwrap(), "a.mp3");
        assert_eq!(sanitize_file_name("dir/a.mp3").unwrap(), "a.mp3");
        assert_eq!(sanitize_file_name("..\\..\\a.mp3").unwrap(), "a.mp3");
    }

    #[test]
    fn test_sanitize_file_name_rejects_empty() {
        assert!(sanitize_file_name("").is_err());
        assert!(sanitize_file_name("   ").is_err());
        assert!(sanitize_file_name("uploads/").is_err());
        assert!(sanitize_file_name("..").is_err());
    }
}

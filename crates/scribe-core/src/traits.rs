//! Trait seams for external collaborators.
//!
//! The object store and the speech-recognition engine live outside this
//! system; these traits are the whole surface the core depends on, so tests
//! and alternative deployments can swap implementations.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;
use crate::models::SegmentDraft;

/// A recorded multipart part handed to the finalize call: (part number, tag).
pub type PartTag = (i32, String);

/// Object store providing presigned-URL multipart upload semantics.
///
/// Clients upload bytes directly against presigned URLs; this service never
/// proxies media. Implementations must treat `abort_multipart` on an unknown
/// upload as success (cleanup is best-effort and idempotent).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Open a multipart upload for `key`, returning the store's upload id.
    async fn initiate_multipart(&self, key: &str, content_type: &str) -> Result<String>;

    /// Produce a time-limited, pre-authorized URL for uploading one part.
    async fn presign_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        ttl: Duration,
    ) -> Result<String>;

    /// Assemble the uploaded parts into the final object.
    ///
    /// `parts` must cover every part number in order with its confirmed tag.
    async fn complete_multipart(&self, key: &str, upload_id: &str, parts: &[PartTag])
        -> Result<()>;

    /// Discard an in-progress multipart upload and its stored parts.
    async fn abort_multipart(&self, key: &str, upload_id: &str) -> Result<()>;

    /// Delete a finalized object.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Full output of one engine run over a media object.
#[derive(Debug, Clone)]
pub struct TranscriptOutput {
    pub language: Option<String>,
    pub duration_seconds: f64,
    pub segments: Vec<SegmentDraft>,
}

/// Speech-recognition engine boundary.
///
/// Ingests a finalized object key and eventually supplies ordered segments
/// with text and timing. Failures surface as `Error::Transcription` and move
/// the job to `Failed`.
#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    async fn transcribe(
        &self,
        object_key: &str,
        language_hint: Option<&str>,
    ) -> Result<TranscriptOutput>;
}

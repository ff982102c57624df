//! In-memory object store for tests.
//!
//! Tracks multipart state and counts finalize calls so tests can assert the
//! at-most-once finalize property directly.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use scribe_core::{Error, ObjectStore, PartTag, Result};

#[derive(Default)]
struct State {
    /// upload_id -> target key for in-flight multipart uploads.
    uploads: HashMap<String, String>,
    /// Finalized object keys.
    objects: HashSet<String>,
    /// upload_ids that were aborted.
    aborted: HashSet<String>,
    finalize_calls: usize,
}

/// In-memory [`ObjectStore`] test double.
#[derive(Default)]
pub struct InMemoryObjectStore {
    state: Mutex<State>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times `complete_multipart` performed a finalize.
    pub async fn finalize_calls(&self) -> usize {
        self.state.lock().await.finalize_calls
    }

    /// Whether a finalized object exists for `key`.
    pub async fn contains_object(&self, key: &str) -> bool {
        self.state.lock().await.objects.contains(key)
    }

    /// Whether the given multipart upload was aborted.
    pub async fn was_aborted(&self, upload_id: &str) -> bool {
        self.state.lock().await.aborted.contains(upload_id)
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn initiate_multipart(&self, key: &str, _content_type: &str) -> Result<String> {
        let upload_id = format!("mem-{}", Uuid::new_v4());
        let mut state = self.state.lock().await;
        state.uploads.insert(upload_id.clone(), key.to_string());
        Ok(upload_id)
    }

    async fn presign_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        ttl: Duration,
    ) -> Result<String> {
        Ok(format!(
            "memory://{}?partNumber={}&uploadId={}&expires={}",
            key,
            part_number,
            upload_id,
            ttl.as_secs()
        ))
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartTag],
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.uploads.contains_key(upload_id) {
            return Err(Error::Storage(format!(
                "unknown multipart upload {}",
                upload_id
            )));
        }
        for (index, (part_number, etag)) in parts.iter().enumerate() {
            if *part_number != index as i32 + 1 {
                return Err(Error::Storage(format!(
                    "part list not contiguous at position {}",
                    index
                )));
            }
            if etag.is_empty() {
                return Err(Error::Storage(format!("part {} has empty tag", part_number)));
            }
        }
        state.uploads.remove(upload_id);
        state.objects.insert(key.to_string());
        state.finalize_calls += 1;
        Ok(())
    }

    async fn abort_multipart(&self, _key: &str, upload_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        state.uploads.remove(upload_id);
        state.aborted.insert(upload_id.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.state.lock().await.objects.remove(key);
        Ok(())
    }
}

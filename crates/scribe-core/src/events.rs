//! Server event types and the broadcast event bus.
//!
//! Aggregates events from the API layer and the job worker into a single
//! broadcast channel. Downstream consumers (the external engine hand-off,
//! notification fan-out, telemetry) subscribe independently.

use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Unified server event, serialized as JSON with a `type` tag field.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// A multipart upload was finalized into an object.
    UploadCompleted { upload_id: Uuid, object_key: String },
    /// A transcription job passed admission and entered the queue.
    JobQueued {
        job_id: Uuid,
        user_id: String,
        object_key: String,
    },
    /// The worker claimed a job and handed it to the engine.
    JobStarted { job_id: Uuid },
    /// Engine output was ingested and the job completed.
    JobCompleted {
        job_id: Uuid,
        segment_count: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_ms: Option<i64>,
    },
    /// The engine (or ingestion) failed.
    JobFailed { job_id: Uuid, error: String },
    /// The user cancelled a job before it reached a terminal state.
    JobCancelled { job_id: Uuid },
    /// A translation hand-off was queued for an external collaborator.
    TranslationQueued {
        job_id: Uuid,
        target_language: String,
    },
    /// A transcript segment was edited or reverted.
    SegmentUpdated {
        job_id: Uuid,
        segment_id: Uuid,
        version: i32,
    },
}

impl ServerEvent {
    /// Namespaced event type name (e.g. `"job.completed"`).
    pub fn event_type(&self) -> &'static str {
        match self {
            ServerEvent::UploadCompleted { .. } => "upload.completed",
            ServerEvent::JobQueued { .. } => "job.queued",
            ServerEvent::JobStarted { .. } => "job.started",
            ServerEvent::JobCompleted { .. } => "job.completed",
            ServerEvent::JobFailed { .. } => "job.failed",
            ServerEvent::JobCancelled { .. } => "job.cancelled",
            ServerEvent::TranslationQueued { .. } => "translation.queued",
            ServerEvent::SegmentUpdated { .. } => "segment.updated",
        }
    }
}

/// Broadcast-based event bus for distributing server events.
///
/// Slow receivers that fall behind receive a `Lagged` error and miss events —
/// acceptable for real-time streams where freshness matters more than
/// completeness.
pub struct EventBus {
    tx: broadcast::Sender<ServerEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all subscribers. With no subscribers the event is
    /// silently dropped.
    pub fn emit(&self, event: ServerEvent) {
        tracing::debug!(
            event_type = %event.event_type(),
            subscriber_count = self.tx.receiver_count(),
            "EventBus emit"
        );
        let _ = self.tx.send(event);
    }

    /// Subscribe to receive events. Each subscriber gets an independent stream.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.tx.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_subscribe() {
        let bus = EventBus::new(32);
        let mut rx = bus.subscribe();

        bus.emit(ServerEvent::JobStarted { job_id: Uuid::nil() });

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, ServerEvent::JobStarted { .. }));
        assert_eq!(event.event_type(), "job.started");
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new(32);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(ServerEvent::UploadCompleted {
            upload_id: Uuid::nil(),
            object_key: "uploads/u1/x/a.mp3".into(),
        });

        assert!(matches!(
            rx1.recv().await.unwrap(),
            ServerEvent::UploadCompleted { .. }
        ));
        assert!(matches!(
            rx2.recv().await.unwrap(),
            ServerEvent::UploadCompleted { .. }
        ));
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_ok() {
        let bus = EventBus::new(32);
        bus.emit(ServerEvent::JobCancelled { job_id: Uuid::nil() });
    }

    #[test]
    fn test_event_json_carries_type_tag() {
        let event = ServerEvent::JobFailed {
            job_id: Uuid::nil(),
            error: "engine timeout".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"JobFailed"#));
        assert!(json.contains("engine timeout"));
    }

    #[test]
    fn test_optional_duration_skipped_when_none() {
        let event = ServerEvent::JobCompleted {
            job_id: Uuid::nil(),
            segment_count: 3,
            duration_ms: None,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("duration_ms"));
    }

    #[test]
    fn test_event_type_names_unique() {
        let names = [
            ServerEvent::UploadCompleted {
                upload_id: Uuid::nil(),
                object_key: String::new(),
            }
            .event_type(),
            ServerEvent::JobQueued {
                job_id: Uuid::nil(),
                user_id: String::new(),
                object_key: String::new(),
            }
            .event_type(),
            ServerEvent::JobStarted { job_id: Uuid::nil() }.event_type(),
            ServerEvent::JobCompleted {
                job_id: Uuid::nil(),
                segment_count: 0,
                duration_ms: None,
            }
            .event_type(),
            ServerEvent::JobFailed {
                job_id: Uuid::nil(),
                error: String::new(),
            }
            .event_type(),
            ServerEvent::JobCancelled { job_id: Uuid::nil() }.event_type(),
            ServerEvent::TranslationQueued {
                job_id: Uuid::nil(),
                target_language: String::new(),
            }
            .event_type(),
            ServerEvent::SegmentUpdated {
                job_id: Uuid::nil(),
                segment_id: Uuid::nil(),
                version: 0,
            }
            .event_type(),
        ];
        let mut unique = names.to_vec();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), names.len());
    }
}

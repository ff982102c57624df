//! Execution of a single claimed transcription job.

use std::time::Instant;

use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

use scribe_core::{Error, EventBus, ServerEvent, TranscriptionJob, TranscriptionProvider};
use scribe_db::Database;

use crate::worker::WorkerEvent;

/// Drive one claimed (already `Processing`) job to a terminal state.
///
/// The terminal transition itself releases the quota reservation; if the user
/// cancelled while the engine was running, the guarded transition loses with
/// a conflict and the cancellation's terminal state (and its single release)
/// stands.
#[instrument(
    skip_all,
    fields(subsystem = "jobs", component = "runner", job_id = %job.id)
)]
pub async fn execute(
    db: &Database,
    engine: &dyn TranscriptionProvider,
    bus: &EventBus,
    event_tx: &broadcast::Sender<WorkerEvent>,
    job: TranscriptionJob,
) {
    let start = Instant::now();
    let _ = event_tx.send(WorkerEvent::JobStarted { job_id: job.id });
    bus.emit(ServerEvent::JobStarted { job_id: job.id });

    let result = engine
        .transcribe(&job.media_object_key, job.language.as_deref())
        .await;

    match result {
        Ok(output) => match db.jobs.complete(job.id, &output).await {
            Ok((_, segment_count)) => {
                let duration_ms = start.elapsed().as_millis() as i64;
                info!(
                    segment_count,
                    duration_ms, "Transcription job completed"
                );
                let _ = event_tx.send(WorkerEvent::JobCompleted {
                    job_id: job.id,
                    segment_count,
                });
                bus.emit(ServerEvent::JobCompleted {
                    job_id: job.id,
                    segment_count,
                    duration_ms: Some(duration_ms),
                });
            }
            Err(Error::Conflict(reason)) => {
                // The job left Processing while the engine ran (user cancel
                // won the race). The engine output is discarded.
                info!(reason = %reason, "Completion superseded by concurrent transition");
            }
            Err(e) => {
                warn!(error = %e, "Failed to persist completed transcription");
                fail_job(db, event_tx, bus, job.id, &e.to_string()).await;
            }
        },
        Err(e) => {
            warn!(error = %e, "Engine transcription failed");
            fail_job(db, event_tx, bus, job.id, &e.to_string()).await;
        }
    }
}

async fn fail_job(
    db: &Database,
    event_tx: &broadcast::Sender<WorkerEvent>,
    bus: &EventBus,
    job_id: uuid::Uuid,
    error: &str,
) {
    match db.jobs.fail(job_id, error).await {
        Ok(_) => {
            let _ = event_tx.send(WorkerEvent::JobFailed {
                job_id,
                error: error.to_string(),
            });
            bus.emit(ServerEvent::JobFailed {
                job_id,
                error: error.to_string(),
            });
        }
        Err(Error::Conflict(reason)) => {
            info!(reason = %reason, "Failure superseded by concurrent transition");
        }
        Err(e) => {
            // The job stays Processing; operators must see this.
            tracing::error!(error = %e, "Failed to record job failure");
        }
    }
}

//! Job worker: claims queued transcription jobs and processes them
//! concurrently.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use scribe_core::{EventBus, TranscriptionProvider};
use scribe_db::Database;

use crate::runner;
use crate::DEFAULT_POLL_INTERVAL_MS;

/// Configuration for the job worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Polling interval in milliseconds when the queue is empty.
    pub poll_interval_ms: u64,
    /// Maximum number of concurrently processed jobs.
    pub max_concurrent_jobs: usize,
    /// Whether to enable job processing.
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_concurrent_jobs: scribe_core::defaults::JOB_MAX_CONCURRENT,
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `JOB_WORKER_ENABLED` | `true` | Enable/disable job processing |
    /// | `JOB_MAX_CONCURRENT` | `4` | Max concurrent jobs |
    /// | `JOB_POLL_INTERVAL_MS` | `500` | Polling interval when queue is empty |
    pub fn from_env() -> Self {
        let enabled = std::env::var("JOB_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let max_concurrent_jobs = std::env::var("JOB_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(scribe_core::defaults::JOB_MAX_CONCURRENT)
            .max(1);

        let poll_interval_ms = std::env::var("JOB_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);

        Self {
            poll_interval_ms,
            max_concurrent_jobs,
            enabled,
        }
    }

    /// Set maximum concurrent jobs.
    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max;
        self
    }

    /// Enable or disable job processing.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Event emitted by the job worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    JobStarted { job_id: Uuid },
    JobCompleted { job_id: Uuid, segment_count: usize },
    JobFailed { job_id: Uuid, error: String },
    WorkerStarted,
    WorkerStopped,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
}

impl WorkerHandle {
    /// Signal the worker to shut down gracefully.
    pub async fn shutdown(&self) -> scribe_core::Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| scribe_core::Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Worker that drives queued transcription jobs through the engine.
pub struct TranscriptionWorker {
    db: Database,
    engine: Arc<dyn TranscriptionProvider>,
    bus: Arc<EventBus>,
    config: WorkerConfig,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl TranscriptionWorker {
    pub fn new(
        db: Database,
        engine: Arc<dyn TranscriptionProvider>,
        bus: Arc<EventBus>,
        config: WorkerConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(scribe_core::defaults::EVENT_BUS_CAPACITY);
        Self {
            db,
            engine,
            bus,
            config,
            event_tx,
        }
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
        }
    }

    /// Run the worker loop with concurrent job processing.
    ///
    /// Claims up to `max_concurrent_jobs` at a time. Sleeps only when the
    /// queue is empty, and wakes early when a new job is admitted (the
    /// repository's notify handle).
    #[instrument(skip(self, shutdown_rx), fields(subsystem = "jobs", component = "worker"))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Job worker is disabled, not starting");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent = self.config.max_concurrent_jobs,
            "Job worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let notify = self.db.jobs.job_notify();

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Job worker received shutdown signal");
                break;
            }

            let mut claimed = 0;
            let mut tasks = tokio::task::JoinSet::new();

            for _ in 0..self.config.max_concurrent_jobs {
                match self.db.jobs.claim_next().await {
                    Ok(Some(job)) => {
                        claimed += 1;
                        let db = self.db.clone();
                        let engine = self.engine.clone();
                        let bus = self.bus.clone();
                        let event_tx = self.event_tx.clone();
                        tasks.spawn(async move {
                            runner::execute(&db, engine.as_ref(), &bus, &event_tx, job).await;
                        });
                    }
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to claim next job");
                        break;
                    }
                }
            }

            if claimed == 0 {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Job worker received shutdown signal");
                        break;
                    }
                    _ = notify.notified() => {}
                    _ = sleep(poll_interval) => {}
                }
            } else {
                debug!(claimed, "Processing concurrent job batch");
                while tasks.join_next().await.is_some() {}
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_config_defaults() {
        let config = WorkerConfig::default();
        assert!(config.enabled);
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
        assert_eq!(
            config.max_concurrent_jobs,
            scribe_core::defaults::JOB_MAX_CONCURRENT
        );
    }

    #[test]
    fn test_worker_config_builders() {
        let config = WorkerConfig::default()
            .with_max_concurrent(8)
            .with_enabled(false);
        assert_eq!(config.max_concurrent_jobs, 8);
        assert!(!config.enabled);
    }
}

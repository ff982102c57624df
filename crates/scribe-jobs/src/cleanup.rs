//! Periodic sweep of stale upload sessions.
//!
//! Sessions that passed their expiry without completing are moved to
//! `Expired` in bounded batches; the remote multipart upload is aborted so
//! the store releases the partial storage. Abort failures are logged and
//! retried on the next sweep (the session is already expired, so no client
//! can resume it).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

use scribe_core::defaults::{UPLOAD_SWEEP_BATCH, UPLOAD_SWEEP_INTERVAL_SECS};
use scribe_core::ObjectStore;
use scribe_db::Database;

/// Configuration for the upload sweeper.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    pub interval: Duration,
    pub batch_size: i64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(UPLOAD_SWEEP_INTERVAL_SECS),
            batch_size: UPLOAD_SWEEP_BATCH,
        }
    }
}

/// Handle for stopping a running sweeper.
pub struct SweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl SweeperHandle {
    pub async fn shutdown(&self) -> scribe_core::Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| scribe_core::Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }
}

/// Background sweeper for expired upload sessions.
pub struct UploadSweeper {
    db: Database,
    store: Arc<dyn ObjectStore>,
    config: SweeperConfig,
}

impl UploadSweeper {
    pub fn new(db: Database, store: Arc<dyn ObjectStore>, config: SweeperConfig) -> Self {
        Self { db, store, config }
    }

    /// Start the periodic sweep loop.
    pub fn start(self) -> SweeperHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        tokio::spawn(async move {
            info!(
                subsystem = "jobs",
                component = "sweeper",
                interval_secs = self.config.interval.as_secs(),
                "Upload sweeper started"
            );
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!(subsystem = "jobs", component = "sweeper", "Upload sweeper stopped");
                        break;
                    }
                    _ = sleep(self.config.interval) => {
                        self.sweep_once().await;
                    }
                }
            }
        });
        SweeperHandle { shutdown_tx }
    }

    /// One sweep pass: expire a batch of overdue sessions and abort their
    /// remote uploads.
    #[instrument(skip(self), fields(subsystem = "jobs", component = "sweeper", op = "sweep"))]
    pub async fn sweep_once(&self) {
        let expired = match self.db.uploads.sweep_expired(self.config.batch_size).await {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!(error = %e, "Upload sweep query failed");
                return;
            }
        };

        if expired.is_empty() {
            return;
        }
        info!(count = expired.len(), "Expiring stale upload sessions");

        for session in expired {
            if let Some(store_upload_id) = session.store_upload_id.as_deref() {
                if let Err(e) = self
                    .store
                    .abort_multipart(&session.object_key, store_upload_id)
                    .await
                {
                    warn!(
                        upload_id = %session.id,
                        object_key = %session.object_key,
                        error = %e,
                        "Failed to abort remote upload for expired session"
                    );
                }
            }
        }
    }
}

//! # scribe-jobs
//!
//! Background processing for the scribe transcription backend:
//! - [`TranscriptionWorker`] claims queued jobs and drives them through the
//!   engine to a terminal state.
//! - [`UploadSweeper`] expires stale upload sessions and aborts their remote
//!   multipart uploads.

pub mod cleanup;
pub mod runner;
pub mod worker;

pub use cleanup::{SweeperConfig, SweeperHandle, UploadSweeper};
pub use worker::{TranscriptionWorker, WorkerConfig, WorkerEvent, WorkerHandle};

/// Default polling interval in milliseconds when the queue is empty.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = scribe_core::defaults::JOB_POLL_INTERVAL_MS;

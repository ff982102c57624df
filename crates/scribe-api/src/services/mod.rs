//! Orchestration services sitting between the HTTP handlers and the
//! repositories/external stores.

pub mod jobs;
pub mod uploads;

pub use jobs::JobService;
pub use uploads::UploadCoordinator;

//! Shared application state.

use std::sync::Arc;

use scribe_core::{EventBus, ObjectStore, PlanResolver};
use scribe_db::Database;

use crate::services::{JobService, UploadCoordinator};

/// Global rate limiter type (direct quota, not keyed — per-instance cap).
pub type GlobalRateLimiter = governor::RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub uploads: UploadCoordinator,
    pub jobs: JobService,
    pub plans: PlanResolver,
    pub bus: Arc<EventBus>,
    /// Global rate limiter (None if rate limiting is disabled).
    pub rate_limiter: Option<Arc<GlobalRateLimiter>>,
}

impl AppState {
    pub fn new(
        db: Database,
        store: Arc<dyn ObjectStore>,
        bus: Arc<EventBus>,
        rate_limiter: Option<Arc<GlobalRateLimiter>>,
    ) -> Self {
        let plans = PlanResolver;
        Self {
            uploads: UploadCoordinator::new(db.clone(), store, bus.clone()),
            jobs: JobService::new(db.clone(), bus.clone()),
            db,
            plans,
            bus,
            rate_limiter,
        }
    }
}

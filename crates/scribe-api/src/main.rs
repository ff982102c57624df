//! scribe-api - HTTP API server for the scribe transcription backend.

use std::net::SocketAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::Router;
use governor::{Quota, RateLimiter};
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use scribe_api::handlers;
use scribe_api::state::{AppState, GlobalRateLimiter};
use scribe_core::{EventBus, ObjectStore};
use scribe_db::Database;
use scribe_engine::{EngineConfig, HttpTranscriptionProvider};
use scribe_jobs::{SweeperConfig, TranscriptionWorker, UploadSweeper, WorkerConfig};
use scribe_storage::{S3Config, S3ObjectStore};

/// Generates time-ordered UUIDv7 request correlation IDs.
///
/// UUIDv7 embeds a Unix timestamp, so IDs sort chronologically — useful for
/// log correlation and debugging production incidents.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Reject requests over the global rate cap before they reach a handler.
async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(limiter) = &state.rate_limiter {
        if limiter.check().is_err() {
            return (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded").into_response();
        }
    }
    next.run(request).await
}

async fn healthz() -> &'static str {
    "ok"
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/uploads", post(handlers::uploads::initiate))
        .route(
            "/uploads/:id/parts/:n/url",
            get(handlers::uploads::part_url),
        )
        .route(
            "/uploads/:id/parts/:n/complete",
            post(handlers::uploads::record_part),
        )
        .route("/uploads/:id/complete", post(handlers::uploads::complete))
        .route("/uploads/:id/abort", post(handlers::uploads::abort))
        .route("/usage/me", get(handlers::usage::me))
        .route("/jobs", post(handlers::jobs::create))
        .route("/jobs/:id", get(handlers::jobs::get))
        .route("/jobs/:id/cancel", post(handlers::jobs::cancel))
        .route("/jobs/:id/translate", post(handlers::jobs::translate))
        .route(
            "/jobs/:id/segments/:segment_id",
            patch(handlers::segments::update),
        )
        .route(
            "/jobs/:id/segments/:segment_id/revert",
            post(handlers::segments::revert),
        )
        .route("/healthz", get(healthz))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuidV7))
        .layer(CorsLayer::permissive())
        // JSON control plane only; media bytes go directly to the store.
        .layer(RequestBodyLimitLayer::new(256 * 1024))
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to install shutdown signal handler");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "scribe_api=info,scribe_db=info,scribe_jobs=info,scribe_storage=info,tower_http=info"
                .into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database_url =
        std::env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL is not set"))?;
    let bind_addr: SocketAddr = std::env::var("SCRIBE_BIND")
        .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        .parse()?;

    let db = Database::connect(&database_url).await?;
    db.migrate().await?;
    info!(subsystem = "api", "Database connected and migrated");

    let store: Arc<dyn ObjectStore> = Arc::new(S3ObjectStore::new(S3Config::from_env()?)?);
    let engine = Arc::new(HttpTranscriptionProvider::new(EngineConfig::from_env()?)?);
    let bus = Arc::new(EventBus::new(scribe_core::defaults::EVENT_BUS_CAPACITY));

    let worker = TranscriptionWorker::new(
        db.clone(),
        engine,
        bus.clone(),
        WorkerConfig::from_env(),
    )
    .start();
    let sweeper =
        UploadSweeper::new(db.clone(), store.clone(), SweeperConfig::default()).start();

    let rate_limiter: Option<Arc<GlobalRateLimiter>> = std::env::var("RATE_LIMIT_RPS")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .and_then(NonZeroU32::new)
        .map(|rps| Arc::new(RateLimiter::direct(Quota::per_second(rps))));

    let state = AppState::new(db, store, bus, rate_limiter);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!(subsystem = "api", addr = %bind_addr, "scribe-api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(subsystem = "api", "Shutting down background workers");
    worker.shutdown().await.ok();
    sweeper.shutdown().await.ok();
    Ok(())
}

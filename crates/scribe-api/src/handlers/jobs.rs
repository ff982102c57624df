//! Transcription job endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use scribe_core::TranscriptionJob;

use crate::auth::AuthPrincipal;
use crate::error::ApiError;
use crate::services::jobs::JobDetail;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobBody {
    pub upload_id: Uuid,
    pub duration_seconds: f64,
    #[serde(default)]
    pub language: Option<String>,
}

/// `POST /jobs`
pub async fn create(
    State(state): State<AppState>,
    principal: AuthPrincipal,
    Json(body): Json<CreateJobBody>,
) -> Result<(StatusCode, Json<TranscriptionJob>), ApiError> {
    let limits = state.plans.limits(principal.tier);
    let job = state
        .jobs
        .create(
            &principal.user_id,
            &limits,
            body.upload_id,
            body.duration_seconds,
            body.language,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// `GET /jobs/{id}`
pub async fn get(
    State(state): State<AppState>,
    principal: AuthPrincipal,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobDetail>, ApiError> {
    let detail = state.jobs.get(&principal.user_id, job_id).await?;
    Ok(Json(detail))
}

/// `POST /jobs/{id}/cancel`
pub async fn cancel(
    State(state): State<AppState>,
    principal: AuthPrincipal,
    Path(job_id): Path<Uuid>,
) -> Result<Json<TranscriptionJob>, ApiError> {
    let job = state.jobs.cancel(&principal.user_id, job_id).await?;
    Ok(Json(job))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslateBody {
    pub target_language: String,
}

/// `POST /jobs/{id}/translate` — enqueue only, a collaborator translates.
pub async fn translate(
    State(state): State<AppState>,
    principal: AuthPrincipal,
    Path(job_id): Path<Uuid>,
    Json(body): Json<TranslateBody>,
) -> Result<(StatusCode, Json<TranscriptionJob>), ApiError> {
    let limits = state.plans.limits(principal.tier);
    let job = state
        .jobs
        .translate(&principal.user_id, &limits, job_id, &body.target_language)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

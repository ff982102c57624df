//! Transcript segment edit endpoints.

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use scribe_core::TranscriptSegment;

use crate::auth::AuthPrincipal;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSegmentBody {
    pub text: String,
    pub expected_version: i32,
}

/// `PATCH /jobs/{jobId}/segments/{segmentId}`
pub async fn update(
    State(state): State<AppState>,
    principal: AuthPrincipal,
    Path((job_id, segment_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UpdateSegmentBody>,
) -> Result<Json<TranscriptSegment>, ApiError> {
    let segment = state
        .jobs
        .update_segment(
            &principal.user_id,
            job_id,
            segment_id,
            &body.text,
            body.expected_version,
        )
        .await?;
    Ok(Json(segment))
}

/// `POST /jobs/{jobId}/segments/{segmentId}/revert`
pub async fn revert(
    State(state): State<AppState>,
    principal: AuthPrincipal,
    Path((job_id, segment_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<TranscriptSegment>, ApiError> {
    let segment = state
        .jobs
        .revert_segment(&principal.user_id, job_id, segment_id)
        .await?;
    Ok(Json(segment))
}

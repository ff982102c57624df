//! Upload session endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use scribe_core::{InitiatedUpload, PresignedPartUrl};

use crate::auth::AuthPrincipal;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateUploadBody {
    pub file_name: String,
    pub content_type: String,
    pub file_size_bytes: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateUploadResponse {
    #[serde(flatten)]
    pub upload: InitiatedUpload,
    pub part_urls: Vec<PresignedPartUrl>,
}

/// `POST /uploads`
pub async fn initiate(
    State(state): State<AppState>,
    principal: AuthPrincipal,
    Json(body): Json<InitiateUploadBody>,
) -> Result<(StatusCode, Json<InitiateUploadResponse>), ApiError> {
    let limits = state.plans.limits(principal.tier);
    let (upload, part_urls) = state
        .uploads
        .initiate(
            &principal.user_id,
            &limits,
            &body.file_name,
            &body.content_type,
            body.file_size_bytes,
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(InitiateUploadResponse { upload, part_urls }),
    ))
}

/// `GET /uploads/{id}/parts/{n}/url`
pub async fn part_url(
    State(state): State<AppState>,
    principal: AuthPrincipal,
    Path((upload_id, part_number)): Path<(Uuid, i32)>,
) -> Result<Json<PresignedPartUrl>, ApiError> {
    let url = state
        .uploads
        .part_url(&principal.user_id, upload_id, part_number)
        .await?;
    Ok(Json(url))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPartBody {
    pub e_tag: String,
}

/// `POST /uploads/{id}/parts/{n}/complete`
pub async fn record_part(
    State(state): State<AppState>,
    principal: AuthPrincipal,
    Path((upload_id, part_number)): Path<(Uuid, i32)>,
    Json(body): Json<RecordPartBody>,
) -> Result<StatusCode, ApiError> {
    state
        .uploads
        .record_part(&principal.user_id, upload_id, part_number, &body.e_tag)
        .await?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteUploadResponse {
    pub object_key: String,
}

/// `POST /uploads/{id}/complete`
pub async fn complete(
    State(state): State<AppState>,
    principal: AuthPrincipal,
    Path(upload_id): Path<Uuid>,
) -> Result<Json<CompleteUploadResponse>, ApiError> {
    let object_key = state.uploads.complete(&principal.user_id, upload_id).await?;
    Ok(Json(CompleteUploadResponse { object_key }))
}

/// `POST /uploads/{id}/abort`
pub async fn abort(
    State(state): State<AppState>,
    principal: AuthPrincipal,
    Path(upload_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.uploads.abort(&principal.user_id, upload_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initiate_body_parses_camel_case() {
        let body: InitiateUploadBody = serde_json::from_str(
            r#"{"fileName":"a.mp3","contentType":"audio/mpeg","fileSizeBytes":26214400}"#,
        )
        .unwrap();
        assert_eq!(body.file_name, "a.mp3");
        assert_eq!(body.file_size_bytes, 26_214_400);
    }

    #[test]
    fn test_record_part_body_parses_etag() {
        let body: RecordPartBody = serde_json::from_str(r#"{"eTag":"\"abc123\""}"#).unwrap();
        assert_eq!(body.e_tag, "\"abc123\"");
    }
}

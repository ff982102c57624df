//! Usage reporting endpoint.

use axum::extract::State;
use axum::Json;

use crate::auth::AuthPrincipal;
use crate::error::ApiError;
use crate::services::jobs::UsageResponse;
use crate::state::AppState;

/// `GET /usage/me`
pub async fn me(
    State(state): State<AppState>,
    principal: AuthPrincipal,
) -> Result<Json<UsageResponse>, ApiError> {
    let limits = state.plans.limits(principal.tier);
    let usage = state
        .jobs
        .usage(&principal.user_id, principal.tier, limits)
        .await?;
    Ok(Json(usage))
}

//! Authenticated principal extraction.
//!
//! Identity and billing are external collaborators: upstream middleware has
//! already validated the caller and resolves their subscription. This layer
//! receives the results as trusted headers — an opaque user id in
//! `x-user-id` and the plan tier in `x-plan` (defaulting to free).

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use scribe_core::{Error, PlanTier};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const PLAN_HEADER: &str = "x-plan";

/// The already-validated caller of a request.
#[derive(Debug, Clone)]
pub struct AuthPrincipal {
    pub user_id: String,
    pub tier: PlanTier,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthPrincipal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ApiError(Error::Unauthorized("missing user identity".into())))?
            .to_string();

        let tier = parts
            .headers
            .get(PLAN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(PlanTier::parse)
            .unwrap_or(PlanTier::Free);

        Ok(AuthPrincipal { user_id, tier })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    async fn extract(request: Request<()>) -> Result<AuthPrincipal, ApiError> {
        let (mut parts, _) = request.into_parts();
        AuthPrincipal::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_missing_user_header_is_unauthorized() {
        let request = Request::builder().body(()).unwrap();
        let err = extract(request).await.unwrap_err();
        assert!(matches!(err.0, Error::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_blank_user_header_is_unauthorized() {
        let request = Request::builder()
            .header(USER_ID_HEADER, "   ")
            .body(())
            .unwrap();
        assert!(extract(request).await.is_err());
    }

    #[tokio::test]
    async fn test_plan_defaults_to_free() {
        let request = Request::builder()
            .header(USER_ID_HEADER, "user-1")
            .body(())
            .unwrap();
        let principal = extract(request).await.unwrap();
        assert_eq!(principal.user_id, "user-1");
        assert_eq!(principal.tier, PlanTier::Free);
    }

    #[tokio::test]
    async fn test_pro_plan_header() {
        let request = Request::builder()
            .header(USER_ID_HEADER, "user-1")
            .header(PLAN_HEADER, "pro")
            .body(())
            .unwrap();
        let principal = extract(request).await.unwrap();
        assert_eq!(principal.tier, PlanTier::Pro);
    }
}

//! Authentication extractors for Axum

use async_trait::async_trait;
use axum::{
    extract::{Extension, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use std::sync::Arc;
use tracing::{debug, error, warn};

use super::models::LocalUser;
use super::session::SessionError;
use crate::common::{ApiError, AppState};

/// Authenticated user extractor
///
/// Validates the bearer session token and loads the user it names.
#[derive(Debug)]
pub struct AuthedUser {
    pub user: LocalUser,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Extension(app_state): Extension<Arc<AppState>> =
            Extension::from_request_parts(parts, state)
                .await
                .map_err(|_| ApiError::InternalServer("missing app state".to_string()))?;

        let token = match parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
        {
            Some(t) => t,
            None => {
                warn!("Authentication failed: missing Authorization header");
                return Err(ApiError::Unauthorized("missing auth".into()));
            }
        };

        // Handle "Bearer <token>" format or raw token
        let bare_token = token.strip_prefix("Bearer ").unwrap_or(token).trim();

        let claims = app_state.sessions.validate(bare_token).map_err(|e| {
            match e {
                SessionError::Expired => warn!("Session token expired"),
                _ => warn!(error = %e, "Session token validation failed"),
            }
            ApiError::Unauthorized("invalid token".into())
        })?;

        let user = app_state
            .sign_in
            .resolver()
            .find_by_id(&claims.user_id)
            .await
            .map_err(|e| {
                error!(
                    error = %e,
                    user_id = %claims.user_id,
                    "Database error during user lookup in authentication"
                );
                ApiError::DatabaseError(e)
            })?;

        match user {
            Some(user) => {
                debug!(user_id = %user.id, "User authentication successful via extractor");
                Ok(AuthedUser { user })
            }
            None => {
                warn!(user_id = %claims.user_id, "Authentication failed: user not found in database");
                Err(ApiError::Unauthorized("user not found".into()))
            }
        }
    }
}

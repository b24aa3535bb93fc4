//! Authentication handlers

use axum::extract::{Extension, Json};
use std::sync::Arc;
use tracing::{debug, info};

use super::extractors::AuthedUser;
use super::models::{AuthRequest, AuthRequestValidator, LocalUser, SignInResponse};
use crate::common::{safe_token_log, ApiError, AppState, Validator};

/// POST /auth/oauth
/// Signs a user in with a third-party identity token
///
/// # Request Body
/// ```json
/// {
///   "provider": "apple",
///   "identity_token": "<provider id token>",
///   "provider_user_id": "<provider subject>",
///   "email": "optional@example.com"
/// }
/// ```
///
/// # Response
/// ```json
/// {
///   "user": { ... },
///   "token": "<session jwt>"
/// }
/// ```
pub async fn oauth_signin(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<AuthRequest>,
) -> Result<Json<SignInResponse>, ApiError> {
    info!(provider = %payload.provider, "🔐 Received OAuth sign-in request");
    debug!(
        identity_token = %safe_token_log(&payload.identity_token),
        "Identity token received"
    );

    AuthRequestValidator
        .validate(&payload)
        .into_result()
        .map_err(ApiError::from)?;

    let response = state.sign_in.sign_in(&payload).await?;
    Ok(Json(response))
}

/// GET /auth/me
/// Returns the user behind the presented session token
///
/// # Response
/// ```json
/// {
///   "user": { ... }
/// }
/// ```
pub async fn me_handler(authed: AuthedUser) -> Result<Json<serde_json::Value>, ApiError> {
    let user: LocalUser = authed.user;
    Ok(Json(serde_json::json!({ "user": user })))
}

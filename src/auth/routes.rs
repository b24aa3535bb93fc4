//! Authentication routes

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers;

/// Creates and returns the authentication router
///
/// # Routes
/// - `POST /auth/oauth` - Sign in with a provider identity token
/// - `GET /auth/me` - Current user for a session token
pub fn auth_routes() -> Router {
    Router::new()
        .route("/auth/oauth", post(handlers::oauth_signin))
        .route("/auth/me", get(handlers::me_handler))
}

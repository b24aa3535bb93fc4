// Application state shared across handlers

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::auth::{OAuthSignInHandler, SessionIssuer};

/// Application state containing the database pool and the sign-in components
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub sign_in: OAuthSignInHandler,
    pub sessions: Arc<SessionIssuer>,
}

// src/health.rs
//! Liveness probe backed by a store round-trip

use axum::{extract::Extension, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error};

use crate::common::{ApiError, AppState};

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
}

/// GET /health
pub async fn health_check(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<HealthStatus>, ApiError> {
    sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&state.db)
        .await
        .map_err(|e| {
            error!(error = %e, "Database health check failed");
            ApiError::DatabaseError(e)
        })?;

    debug!("Health check passed");
    Ok(Json(HealthStatus { status: "ok" }))
}

pub fn health_routes() -> Router {
    Router::new().route("/health", get(health_check))
}

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::state::AppState;

/// Health check routes, mounted at the root (not under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

/// GET /health
///
/// Liveness plus a database connectivity probe.
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let database = match netfleet_db::health_check(&state.pool).await {
        Ok(()) => "ok",
        Err(e) => {
            tracing::error!(error = %e, "Database health check failed");
            "unavailable"
        }
    };

    Json(json!({
        "status": "ok",
        "database": database,
    }))
}

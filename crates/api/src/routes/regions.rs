//! Handlers for the `/regions` resource: administration of worker-pool
//! routing targets, including the health endpoint used by the external
//! monitor.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{Json, Router};
use netfleet_core::error::CoreError;
use netfleet_core::types::DbId;
use netfleet_db::models::region::{CreateRegion, UpdateRegion};
use netfleet_db::models::status::RegionHealth;
use netfleet_db::repositories::RegionRepo;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;
use crate::tenant::Tenant;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/regions", get(list_regions).post(create_region))
        .route(
            "/regions/{id}",
            get(get_region).put(update_region).delete(delete_region),
        )
        .route("/regions/{id}/health", put(set_health))
}

/// GET /api/v1/regions
async fn list_regions(
    Tenant(tenant_id): Tenant,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let regions = RegionRepo::list(&state.pool, tenant_id).await?;
    Ok(Json(DataResponse { data: regions }))
}

/// POST /api/v1/regions
///
/// Create a region in `healthy` state. Identifiers are unique per tenant.
async fn create_region(
    Tenant(tenant_id): Tenant,
    State(state): State<AppState>,
    Json(input): Json<CreateRegion>,
) -> AppResult<impl IntoResponse> {
    if input.identifier.trim().is_empty() {
        return Err(AppError::Core(CoreError::InvalidRequest(
            "Region identifier must not be empty".to_string(),
        )));
    }

    let region = RegionRepo::create(&state.pool, tenant_id, &input).await?;
    tracing::info!(region_id = region.id, identifier = %region.identifier, "Region created");
    Ok((StatusCode::CREATED, Json(DataResponse { data: region })))
}

/// GET /api/v1/regions/{id}
async fn get_region(
    Tenant(tenant_id): Tenant,
    State(state): State<AppState>,
    Path(region_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let region = RegionRepo::find(&state.pool, tenant_id, region_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Region",
            id: region_id,
        }))?;
    Ok(Json(DataResponse { data: region }))
}

/// PUT /api/v1/regions/{id}
async fn update_region(
    Tenant(tenant_id): Tenant,
    State(state): State<AppState>,
    Path(region_id): Path<DbId>,
    Json(input): Json<UpdateRegion>,
) -> AppResult<impl IntoResponse> {
    let region = RegionRepo::update(&state.pool, tenant_id, region_id, &input)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Region",
            id: region_id,
        }))?;
    Ok(Json(DataResponse { data: region }))
}

/// DELETE /api/v1/regions/{id}
async fn delete_region(
    Tenant(tenant_id): Tenant,
    State(state): State<AppState>,
    Path(region_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let deleted = RegionRepo::delete(&state.pool, tenant_id, region_id).await?;
    if !deleted {
        return Err(AppError::Core(CoreError::NotFound {
            entity: "Region",
            id: region_id,
        }));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Body of `PUT /api/v1/regions/{id}/health`.
#[derive(Debug, Deserialize)]
pub struct SetHealthRequest {
    /// `"healthy"`, `"degraded"`, or `"offline"`.
    pub status: String,
}

/// PUT /api/v1/regions/{id}/health
///
/// Called by the external health monitor. Affects routing of *future*
/// jobs only; in-flight jobs keep their assignment.
async fn set_health(
    Tenant(tenant_id): Tenant,
    State(state): State<AppState>,
    Path(region_id): Path<DbId>,
    Json(input): Json<SetHealthRequest>,
) -> AppResult<impl IntoResponse> {
    let health = match input.status.as_str() {
        "healthy" => RegionHealth::Healthy,
        "degraded" => RegionHealth::Degraded,
        "offline" => RegionHealth::Offline,
        other => {
            return Err(AppError::Core(CoreError::InvalidRequest(format!(
                "Unknown health status: \"{other}\""
            ))));
        }
    };

    let region = RegionRepo::set_health(&state.pool, tenant_id, region_id, health)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Region",
            id: region_id,
        }))?;

    tracing::info!(region_id, health = %health, "Region health updated");
    Ok(Json(DataResponse { data: region }))
}

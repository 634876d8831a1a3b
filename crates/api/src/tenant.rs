//! Tenant extraction.
//!
//! Authentication and authorization live upstream of this service; the
//! gateway forwards the resolved tenant in the `X-Tenant-Id` header.
//! Every handler takes [`Tenant`] and every query is scoped by it.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use netfleet_core::types::TenantId;

use crate::error::AppError;

/// Header carrying the authenticated tenant id.
pub const TENANT_HEADER: &str = "x-tenant-id";

/// The requesting tenant, extracted from [`TENANT_HEADER`].
#[derive(Debug, Clone, Copy)]
pub struct Tenant(pub TenantId);

impl<S> FromRequestParts<S> for Tenant
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(TENANT_HEADER)
            .ok_or_else(|| AppError::BadRequest(format!("Missing {TENANT_HEADER} header")))?;

        let tenant_id = value
            .to_str()
            .ok()
            .and_then(|s| s.parse::<TenantId>().ok())
            .ok_or_else(|| {
                AppError::BadRequest(format!("{TENANT_HEADER} must be a numeric tenant id"))
            })?;

        Ok(Tenant(tenant_id))
    }
}

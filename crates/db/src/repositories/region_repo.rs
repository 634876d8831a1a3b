//! Repository for the `regions` table.
//!
//! Regions are administrator-managed; health is written by an external
//! monitor through [`RegionRepo::set_health`]. The router only reads.

use netfleet_core::types::DbId;
use sqlx::PgPool;

use crate::models::region::{CreateRegion, Region, UpdateRegion};
use crate::models::status::RegionHealth;

/// Column list for `regions` queries.
const COLUMNS: &str =
    "id, tenant_id, identifier, priority, enabled, health_id, created_at, updated_at";

/// CRUD and health updates for worker-pool routing targets.
pub struct RegionRepo;

impl RegionRepo {
    /// Create a region in `healthy` state.
    pub async fn create(
        pool: &PgPool,
        tenant_id: DbId,
        input: &CreateRegion,
    ) -> Result<Region, sqlx::Error> {
        let query = format!(
            "INSERT INTO regions (tenant_id, identifier, priority, enabled, health_id) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Region>(&query)
            .bind(tenant_id)
            .bind(&input.identifier)
            .bind(input.priority)
            .bind(input.enabled)
            .bind(RegionHealth::Healthy.id())
            .fetch_one(pool)
            .await
    }

    /// Find a region by id within a tenant.
    pub async fn find(
        pool: &PgPool,
        tenant_id: DbId,
        id: DbId,
    ) -> Result<Option<Region>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM regions WHERE id = $1 AND tenant_id = $2");
        sqlx::query_as::<_, Region>(&query)
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(pool)
            .await
    }

    /// All of a tenant's regions, ordered for stable display.
    pub async fn list(pool: &PgPool, tenant_id: DbId) -> Result<Vec<Region>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM regions WHERE tenant_id = $1 ORDER BY identifier ASC"
        );
        sqlx::query_as::<_, Region>(&query)
            .bind(tenant_id)
            .fetch_all(pool)
            .await
    }

    /// The regions referenced by a set of ids, tenant-scoped. Used by the
    /// router to snapshot the regions of a job's resolved hosts.
    pub async fn list_by_ids(
        pool: &PgPool,
        tenant_id: DbId,
        ids: &[DbId],
    ) -> Result<Vec<Region>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!(
            "SELECT {COLUMNS} FROM regions \
             WHERE tenant_id = $1 AND id = ANY($2) \
             ORDER BY identifier ASC"
        );
        sqlx::query_as::<_, Region>(&query)
            .bind(tenant_id)
            .bind(ids)
            .fetch_all(pool)
            .await
    }

    /// Update routing attributes. Returns `None` if the region does not
    /// exist in this tenant.
    pub async fn update(
        pool: &PgPool,
        tenant_id: DbId,
        id: DbId,
        input: &UpdateRegion,
    ) -> Result<Option<Region>, sqlx::Error> {
        let query = format!(
            "UPDATE regions \
             SET priority = COALESCE($3, priority), \
                 enabled = COALESCE($4, enabled), \
                 updated_at = NOW() \
             WHERE id = $1 AND tenant_id = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Region>(&query)
            .bind(id)
            .bind(tenant_id)
            .bind(input.priority)
            .bind(input.enabled)
            .fetch_optional(pool)
            .await
    }

    /// Record the health reported by the external monitor.
    pub async fn set_health(
        pool: &PgPool,
        tenant_id: DbId,
        id: DbId,
        health: RegionHealth,
    ) -> Result<Option<Region>, sqlx::Error> {
        let query = format!(
            "UPDATE regions SET health_id = $3, updated_at = NOW() \
             WHERE id = $1 AND tenant_id = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Region>(&query)
            .bind(id)
            .bind(tenant_id)
            .bind(health.id())
            .fetch_optional(pool)
            .await
    }

    /// Delete a region. Devices referencing it fall back to no region via
    /// the FK's `ON DELETE SET NULL`.
    pub async fn delete(pool: &PgPool, tenant_id: DbId, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM regions WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

//! Read-only queries against the device directory.
//!
//! Every query binds the tenant id; a device id belonging to another
//! tenant never resolves, even when supplied directly. Result ordering is
//! `(hostname, id)` so the same filter against unchanged inventory always
//! yields the same host list.

use netfleet_core::filter::TargetFilter;
use netfleet_core::types::DbId;
use sqlx::PgPool;

use crate::models::device::DeviceWithCredential;

/// Column list for device resolution queries (device joined with its
/// sealed credential).
const COLUMNS: &str = "\
    d.id, d.tenant_id, d.hostname, d.address, d.platform, d.role, d.site, \
    d.vendor, d.tags, d.region_id, c.username, c.secret_nonce, c.secret_ciphertext";

const FROM: &str = "devices d JOIN device_credentials c ON c.id = d.credential_id";

/// Tenant-scoped device directory reads for the inventory resolver.
pub struct DeviceRepo;

impl DeviceRepo {
    /// Enabled devices matching an explicit id list.
    ///
    /// Ids from other tenants are silently absent from the result, not an
    /// error; the resolver treats a shrunken result as "those targets do
    /// not exist".
    pub async fn by_ids(
        pool: &PgPool,
        tenant_id: DbId,
        ids: &[DbId],
    ) -> Result<Vec<DeviceWithCredential>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = format!(
            "SELECT {COLUMNS} FROM {FROM} \
             WHERE d.tenant_id = $1 AND d.id = ANY($2) AND d.enabled \
             ORDER BY d.hostname ASC, d.id ASC"
        );
        sqlx::query_as::<_, DeviceWithCredential>(&query)
            .bind(tenant_id)
            .bind(ids)
            .fetch_all(pool)
            .await
    }

    /// Enabled devices matching the filter's conjunctive attribute
    /// criteria. Callers must only invoke this when
    /// [`TargetFilter::has_attribute_criteria`] holds.
    pub async fn by_attributes(
        pool: &PgPool,
        tenant_id: DbId,
        filter: &TargetFilter,
    ) -> Result<Vec<DeviceWithCredential>, sqlx::Error> {
        let mut conditions = vec!["d.tenant_id = $1".to_string(), "d.enabled".to_string()];
        let mut bind_idx: u32 = 2;

        if filter.site.is_some() {
            conditions.push(format!("d.site = ${bind_idx}"));
            bind_idx += 1;
        }
        if filter.role.is_some() {
            conditions.push(format!("d.role = ${bind_idx}"));
            bind_idx += 1;
        }
        if filter.vendor.is_some() {
            conditions.push(format!("d.vendor = ${bind_idx}"));
            bind_idx += 1;
        }
        if !filter.tags.is_empty() {
            // Array containment: the device must carry every filter tag.
            conditions.push(format!("d.tags @> ${bind_idx}"));
        }

        let query = format!(
            "SELECT {COLUMNS} FROM {FROM} \
             WHERE {} \
             ORDER BY d.hostname ASC, d.id ASC",
            conditions.join(" AND "),
        );

        let mut q = sqlx::query_as::<_, DeviceWithCredential>(&query).bind(tenant_id);
        if let Some(site) = &filter.site {
            q = q.bind(site);
        }
        if let Some(role) = &filter.role {
            q = q.bind(role);
        }
        if let Some(vendor) = &filter.vendor {
            q = q.bind(vendor);
        }
        if !filter.tags.is_empty() {
            q = q.bind(&filter.tags);
        }

        q.fetch_all(pool).await
    }
}

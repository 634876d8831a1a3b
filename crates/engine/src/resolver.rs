//! Inventory resolution: target filter to connection-ready hosts.
//!
//! Resolution is deterministic (the same filter against unchanged
//! inventory yields the same host set in the same order) and strictly
//! tenant-scoped: explicit device ids from other tenants simply do not
//! resolve. An empty result is a valid outcome, not an error.

use netfleet_core::error::CoreError;
use netfleet_core::filter::TargetFilter;
use netfleet_core::host::{ConnectionCredentials, HostDescriptor};
use netfleet_core::secrets::CredentialVault;
use netfleet_core::types::DbId;
use netfleet_db::models::device::DeviceWithCredential;
use netfleet_db::repositories::DeviceRepo;
use netfleet_db::DbPool;

/// Resolves target filters against the device directory and unseals
/// connection credentials.
pub struct InventoryResolver {
    pool: DbPool,
    vault: CredentialVault,
}

impl InventoryResolver {
    pub fn new(pool: DbPool, vault: CredentialVault) -> Self {
        Self { pool, vault }
    }

    /// Resolve a filter to host descriptors, in `(hostname, id)` order.
    ///
    /// Explicit ids and attribute matches are unioned and de-duplicated.
    /// Directory query failures surface as [`CoreError::Resolution`]; the
    /// caller finalizes the job as failed with that reason.
    pub async fn resolve(
        &self,
        tenant_id: DbId,
        filter: &TargetFilter,
    ) -> Result<Vec<HostDescriptor>, CoreError> {
        filter.validate()?;

        let mut devices = Vec::new();
        if !filter.device_ids.is_empty() {
            devices.extend(
                DeviceRepo::by_ids(&self.pool, tenant_id, &filter.device_ids)
                    .await
                    .map_err(directory_err)?,
            );
        }
        if filter.has_attribute_criteria() {
            devices.extend(
                DeviceRepo::by_attributes(&self.pool, tenant_id, filter)
                    .await
                    .map_err(directory_err)?,
            );
        }

        merge_devices(devices)
            .into_iter()
            .map(|device| self.unseal(device))
            .collect()
    }

    fn unseal(&self, device: DeviceWithCredential) -> Result<HostDescriptor, CoreError> {
        let secret = self
            .vault
            .open(&device.secret_nonce, &device.secret_ciphertext)
            .map_err(|_| {
                CoreError::Resolution(format!(
                    "Credential unsealing failed for device {}",
                    device.hostname
                ))
            })?;

        Ok(HostDescriptor {
            device_id: device.id,
            hostname: device.hostname,
            address: device.address,
            platform: device.platform,
            role: device.role,
            site: device.site,
            vendor: device.vendor,
            tags: device.tags,
            region_id: device.region_id,
            credentials: ConnectionCredentials {
                username: device.username,
                secret,
            },
        })
    }
}

fn directory_err(e: sqlx::Error) -> CoreError {
    CoreError::Resolution(format!("Device directory query failed: {e}"))
}

/// Union of the id and attribute query results: de-duplicated by device id,
/// ordered by `(hostname, id)`.
fn merge_devices(mut devices: Vec<DeviceWithCredential>) -> Vec<DeviceWithCredential> {
    devices.sort_by(|a, b| a.hostname.cmp(&b.hostname).then_with(|| a.id.cmp(&b.id)));
    // Same id implies same hostname, so duplicates are adjacent after the
    // sort above.
    devices.dedup_by_key(|d| d.id);
    devices
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

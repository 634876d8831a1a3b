//! Region routing: which worker pool executes a job.
//!
//! The decision is made once, at dispatch time, from the regions referenced
//! by the job's resolved hosts. A region going offline mid-execution never
//! re-routes an in-flight job.

use std::collections::HashSet;

use netfleet_core::host::HostDescriptor;
use netfleet_core::types::DbId;
use netfleet_db::models::region::Region;
use netfleet_db::repositories::RegionRepo;
use netfleet_db::DbPool;

/// Identifier of the tenant-independent fallback worker pool.
pub const DEFAULT_POOL: &str = "default";

/// Outcome of a routing decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionChoice {
    /// Route to the named region's worker pool.
    Region(String),
    /// No routable region among the resolved hosts; use the default pool.
    DefaultPool,
}

impl RegionChoice {
    /// The queue identifier workers subscribe to.
    pub fn identifier(&self) -> &str {
        match self {
            RegionChoice::Region(identifier) => identifier,
            RegionChoice::DefaultPool => DEFAULT_POOL,
        }
    }
}

/// Pick the region for a job from a snapshot of candidate regions.
///
/// Among the regions referenced by the hosts that are enabled and not
/// offline, the highest `priority` wins; ties break to the lowest
/// `identifier` lexicographically so the decision is deterministic.
/// Degraded regions remain eligible, only `offline` is excluded.
pub fn select_region(regions: &[Region], hosts: &[HostDescriptor]) -> RegionChoice {
    let referenced: HashSet<DbId> = hosts.iter().filter_map(|h| h.region_id).collect();

    regions
        .iter()
        .filter(|r| referenced.contains(&r.id) && r.is_routable())
        .max_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                // Reversed: on equal priority the lexicographically
                // smaller identifier must win the max.
                .then_with(|| b.identifier.cmp(&a.identifier))
        })
        .map(|r| RegionChoice::Region(r.identifier.clone()))
        .unwrap_or(RegionChoice::DefaultPool)
}

/// Repository-backed router used by the dispatcher.
pub struct RegionRouter {
    pool: DbPool,
}

impl RegionRouter {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Snapshot the regions referenced by `hosts` and select one.
    pub async fn select(
        &self,
        tenant_id: DbId,
        hosts: &[HostDescriptor],
    ) -> Result<RegionChoice, sqlx::Error> {
        let referenced: Vec<DbId> = hosts
            .iter()
            .filter_map(|h| h.region_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        if referenced.is_empty() {
            return Ok(RegionChoice::DefaultPool);
        }

        let regions = RegionRepo::list_by_ids(&self.pool, tenant_id, &referenced).await?;
        Ok(select_region(&regions, hosts))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use netfleet_core::host::ConnectionCredentials;
    use netfleet_db::models::status::RegionHealth;

    fn region(id: DbId, identifier: &str, priority: i32, enabled: bool, health: RegionHealth) -> Region {
        Region {
            id,
            tenant_id: 1,
            identifier: identifier.to_string(),
            priority,
            enabled,
            health_id: health.id(),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    fn host(device_id: DbId, region_id: Option<DbId>) -> HostDescriptor {
        HostDescriptor {
            device_id,
            hostname: format!("sw{device_id}"),
            address: format!("10.0.0.{device_id}"),
            platform: "eos".to_string(),
            role: None,
            site: None,
            vendor: None,
            tags: Vec::new(),
            region_id,
            credentials: ConnectionCredentials {
                username: "svc".to_string(),
                secret: "x".to_string(),
            },
        }
    }

    #[test]
    fn highest_priority_wins() {
        let regions = vec![
            region(1, "emea", 10, true, RegionHealth::Healthy),
            region(2, "apac", 20, true, RegionHealth::Healthy),
        ];
        let hosts = vec![host(1, Some(1)), host(2, Some(2))];
        assert_eq!(
            select_region(&regions, &hosts),
            RegionChoice::Region("apac".to_string())
        );
    }

    #[test]
    fn priority_tie_breaks_to_lowest_identifier() {
        let regions = vec![
            region(1, "emea", 10, true, RegionHealth::Healthy),
            region(2, "apac", 10, true, RegionHealth::Healthy),
        ];
        let hosts = vec![host(1, Some(1)), host(2, Some(2))];
        assert_eq!(
            select_region(&regions, &hosts),
            RegionChoice::Region("apac".to_string())
        );
    }

    #[test]
    fn disabled_region_falls_back_to_default() {
        let regions = vec![region(1, "emea", 10, false, RegionHealth::Healthy)];
        let hosts = vec![host(1, Some(1))];
        assert_eq!(select_region(&regions, &hosts), RegionChoice::DefaultPool);
    }

    #[test]
    fn offline_region_excluded_degraded_kept() {
        let regions = vec![
            region(1, "emea", 20, true, RegionHealth::Offline),
            region(2, "apac", 10, true, RegionHealth::Degraded),
        ];
        let hosts = vec![host(1, Some(1)), host(2, Some(2))];
        assert_eq!(
            select_region(&regions, &hosts),
            RegionChoice::Region("apac".to_string())
        );
    }

    #[test]
    fn hosts_without_regions_use_default_pool() {
        let regions = vec![region(1, "emea", 10, true, RegionHealth::Healthy)];
        let hosts = vec![host(1, None), host(2, None)];
        assert_eq!(select_region(&regions, &hosts), RegionChoice::DefaultPool);
    }

    #[test]
    fn unreferenced_region_is_not_selected() {
        // Region 9 is routable but none of the hosts belong to it.
        let regions = vec![
            region(9, "aaaa", 99, true, RegionHealth::Healthy),
            region(1, "emea", 1, true, RegionHealth::Healthy),
        ];
        let hosts = vec![host(1, Some(1))];
        assert_eq!(
            select_region(&regions, &hosts),
            RegionChoice::Region("emea".to_string())
        );
    }

    #[test]
    fn default_pool_identifier_is_stable() {
        assert_eq!(RegionChoice::DefaultPool.identifier(), DEFAULT_POOL);
    }
}

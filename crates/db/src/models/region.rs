//! Region (worker pool routing target) row model and DTOs.

use netfleet_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::status::{RegionHealth, StatusId};

/// A row from the `regions` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Region {
    pub id: DbId,
    pub tenant_id: DbId,
    /// Routing key; also the queue name workers subscribe to.
    pub identifier: String,
    /// Higher wins when several regions are eligible for one job.
    pub priority: i32,
    pub enabled: bool,
    pub health_id: StatusId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Region {
    pub fn health(&self) -> Option<RegionHealth> {
        RegionHealth::from_id(self.health_id)
    }

    /// Eligible to receive new jobs: enabled and not offline.
    pub fn is_routable(&self) -> bool {
        self.enabled && self.health() != Some(RegionHealth::Offline)
    }
}

/// DTO for creating a region.
#[derive(Debug, Deserialize)]
pub struct CreateRegion {
    pub identifier: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// DTO for updating a region's routing attributes.
#[derive(Debug, Deserialize)]
pub struct UpdateRegion {
    pub priority: Option<i32>,
    pub enabled: Option<bool>,
}

//! Device directory row models, as consumed by the inventory resolver.
//!
//! The directory is administered elsewhere; this crate only reads it.

use netfleet_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `devices` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Device {
    pub id: DbId,
    pub tenant_id: DbId,
    pub hostname: String,
    pub address: String,
    pub platform: String,
    pub role: Option<String>,
    pub site: Option<String>,
    pub vendor: Option<String>,
    pub tags: Vec<String>,
    pub region_id: Option<DbId>,
    pub credential_id: DbId,
    pub enabled: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A device joined with its sealed credential, as returned by the
/// resolution queries. The secret stays sealed until the resolver opens it.
#[derive(Debug, Clone, FromRow)]
pub struct DeviceWithCredential {
    pub id: DbId,
    pub tenant_id: DbId,
    pub hostname: String,
    pub address: String,
    pub platform: String,
    pub role: Option<String>,
    pub site: Option<String>,
    pub vendor: Option<String>,
    pub tags: Vec<String>,
    pub region_id: Option<DbId>,
    pub username: String,
    pub secret_nonce: Vec<u8>,
    pub secret_ciphertext: Vec<u8>,
}

//! Connection-ready host descriptors produced by the inventory resolver.

use crate::types::DbId;

/// Decrypted connection credentials for one device.
///
/// `Debug` is implemented by hand so secrets never land in logs or panic
/// messages.
#[derive(Clone)]
pub struct ConnectionCredentials {
    pub username: String,
    pub secret: String,
}

impl std::fmt::Debug for ConnectionCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionCredentials")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// One resolved target device, carrying everything a device operation needs
/// to connect: address, decrypted credentials, and routing/platform metadata.
#[derive(Debug, Clone)]
pub struct HostDescriptor {
    pub device_id: DbId,
    /// Display name used in log entries and outcome records.
    pub hostname: String,
    /// Management address (IP or DNS name).
    pub address: String,
    /// Platform driver hint (e.g. `"ios-xe"`, `"eos"`, `"junos"`).
    pub platform: String,
    pub role: Option<String>,
    pub site: Option<String>,
    pub vendor: Option<String>,
    pub tags: Vec<String>,
    /// Region assignment used by the router; `None` means the device has no
    /// region and contributes nothing to the routing decision.
    pub region_id: Option<DbId>,
    pub credentials: ConnectionCredentials,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_secret() {
        let creds = ConnectionCredentials {
            username: "admin".to_string(),
            secret: "hunter2".to_string(),
        };
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}

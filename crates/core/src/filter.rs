//! Declarative target filter consumed by the inventory resolver.
//!
//! A filter selects devices by explicit id and/or by conjunctive attribute
//! match. All criteria are implicitly scoped to the submitting tenant; a
//! device id belonging to another tenant never resolves, even when supplied
//! directly.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::DbId;

/// Maximum number of explicit device ids in one filter.
const MAX_DEVICE_IDS: usize = 1_000;

/// Maximum number of tag criteria in one filter.
const MAX_TAGS: usize = 32;

/// Maximum length of a single attribute value or tag.
const MAX_VALUE_LEN: usize = 128;

/// Structured device selection criteria.
///
/// Explicit `device_ids` are unioned with the attribute match; attribute
/// criteria (`site`, `role`, `vendor`, `tags`) combine conjunctively.
/// An entirely empty filter is structurally invalid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetFilter {
    /// Explicit device ids to include.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub device_ids: Vec<DbId>,

    /// Match devices assigned to this site.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,

    /// Match devices with this role (e.g. `"access-switch"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Match devices from this vendor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,

    /// Match devices carrying every one of these tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl TargetFilter {
    /// True when the filter carries attribute criteria (as opposed to, or in
    /// addition to, explicit device ids).
    pub fn has_attribute_criteria(&self) -> bool {
        self.site.is_some() || self.role.is_some() || self.vendor.is_some() || !self.tags.is_empty()
    }

    /// Structural validation, applied at submission time.
    ///
    /// Rules:
    /// - At least one criterion must be present.
    /// - No more than `MAX_DEVICE_IDS` explicit ids, no duplicates.
    /// - Attribute values and tags must be non-empty and within
    ///   `MAX_VALUE_LEN` characters; at most `MAX_TAGS` tags, no duplicates.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.device_ids.is_empty() && !self.has_attribute_criteria() {
            return Err(CoreError::InvalidRequest(
                "Target filter must name at least one device id or attribute criterion".to_string(),
            ));
        }

        if self.device_ids.len() > MAX_DEVICE_IDS {
            return Err(CoreError::InvalidRequest(format!(
                "Target filter may name at most {MAX_DEVICE_IDS} explicit device ids"
            )));
        }
        let mut seen_ids = std::collections::HashSet::with_capacity(self.device_ids.len());
        for id in &self.device_ids {
            if !seen_ids.insert(*id) {
                return Err(CoreError::InvalidRequest(format!(
                    "Duplicate device id in target filter: {id}"
                )));
            }
        }

        for (name, value) in [
            ("site", &self.site),
            ("role", &self.role),
            ("vendor", &self.vendor),
        ] {
            if let Some(value) = value {
                validate_value(name, value)?;
            }
        }

        if self.tags.len() > MAX_TAGS {
            return Err(CoreError::InvalidRequest(format!(
                "Target filter may carry at most {MAX_TAGS} tags"
            )));
        }
        let mut seen_tags = std::collections::HashSet::with_capacity(self.tags.len());
        for tag in &self.tags {
            validate_value("tag", tag)?;
            if !seen_tags.insert(tag.as_str()) {
                return Err(CoreError::InvalidRequest(format!(
                    "Duplicate tag in target filter: \"{tag}\""
                )));
            }
        }

        Ok(())
    }
}

fn validate_value(name: &str, value: &str) -> Result<(), CoreError> {
    if value.is_empty() {
        return Err(CoreError::InvalidRequest(format!(
            "Target filter {name} must not be empty"
        )));
    }
    if value.len() > MAX_VALUE_LEN {
        return Err(CoreError::InvalidRequest(format!(
            "Target filter {name} exceeds {MAX_VALUE_LEN} characters"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn empty_filter_rejected() {
        let filter = TargetFilter::default();
        assert_matches!(filter.validate(), Err(CoreError::InvalidRequest(_)));
    }

    #[test]
    fn explicit_ids_only_is_valid() {
        let filter = TargetFilter {
            device_ids: vec![1, 2, 3],
            ..Default::default()
        };
        assert!(filter.validate().is_ok());
        assert!(!filter.has_attribute_criteria());
    }

    #[test]
    fn attribute_only_is_valid() {
        let filter = TargetFilter {
            site: Some("fra1".to_string()),
            role: Some("core-router".to_string()),
            ..Default::default()
        };
        assert!(filter.validate().is_ok());
        assert!(filter.has_attribute_criteria());
    }

    #[test]
    fn duplicate_device_id_rejected() {
        let filter = TargetFilter {
            device_ids: vec![7, 7],
            ..Default::default()
        };
        assert_matches!(filter.validate(), Err(CoreError::InvalidRequest(_)));
    }

    #[test]
    fn duplicate_tag_rejected() {
        let filter = TargetFilter {
            tags: vec!["edge".to_string(), "edge".to_string()],
            ..Default::default()
        };
        assert_matches!(filter.validate(), Err(CoreError::InvalidRequest(_)));
    }

    #[test]
    fn empty_attribute_value_rejected() {
        let filter = TargetFilter {
            site: Some(String::new()),
            ..Default::default()
        };
        assert_matches!(filter.validate(), Err(CoreError::InvalidRequest(_)));
    }

    #[test]
    fn too_many_ids_rejected() {
        let filter = TargetFilter {
            device_ids: (0..1_001).collect(),
            ..Default::default()
        };
        assert_matches!(filter.validate(), Err(CoreError::InvalidRequest(_)));
    }

    #[test]
    fn serde_roundtrip_preserves_criteria() {
        let filter = TargetFilter {
            device_ids: vec![4],
            vendor: Some("arista".to_string()),
            tags: vec!["edge".to_string()],
            ..Default::default()
        };
        let json = serde_json::to_value(&filter).expect("serialize");
        let back: TargetFilter = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back.device_ids, vec![4]);
        assert_eq!(back.vendor.as_deref(), Some("arista"));
        assert_eq!(back.tags, vec!["edge"]);
    }
}

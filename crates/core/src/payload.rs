//! Job types and their operation payloads.
//!
//! The payload is a tagged union keyed by job type, so each executor path is
//! exhaustively checked instead of pattern-matching an untyped blob. The tag
//! value is the job type's wire name.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::DbId;

/// Maximum number of commands in one run-commands job.
const MAX_COMMANDS: usize = 64;

/// Maximum length of a single command line.
const MAX_COMMAND_LEN: usize = 4_096;

// ---------------------------------------------------------------------------
// JobType
// ---------------------------------------------------------------------------

/// Closed set of orchestrated job types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    RunCommands,
    ConfigBackup,
    ConfigDeployPreview,
    ConfigDeployCommit,
    ComplianceCheck,
    TopologyDiscovery,
    WorkflowStep,
}

impl JobType {
    /// Wire name, as stored in the `jobs.job_type` column and used as the
    /// payload tag.
    pub fn as_str(self) -> &'static str {
        match self {
            JobType::RunCommands => "run-commands",
            JobType::ConfigBackup => "config-backup",
            JobType::ConfigDeployPreview => "config-deploy-preview",
            JobType::ConfigDeployCommit => "config-deploy-commit",
            JobType::ComplianceCheck => "compliance-check",
            JobType::TopologyDiscovery => "topology-discovery",
            JobType::WorkflowStep => "workflow-step",
        }
    }

    /// Parse a wire name. Unknown names are an [`CoreError::InvalidRequest`].
    pub fn parse(name: &str) -> Result<Self, CoreError> {
        match name {
            "run-commands" => Ok(JobType::RunCommands),
            "config-backup" => Ok(JobType::ConfigBackup),
            "config-deploy-preview" => Ok(JobType::ConfigDeployPreview),
            "config-deploy-commit" => Ok(JobType::ConfigDeployCommit),
            "compliance-check" => Ok(JobType::ComplianceCheck),
            "topology-discovery" => Ok(JobType::TopologyDiscovery),
            "workflow-step" => Ok(JobType::WorkflowStep),
            other => Err(CoreError::InvalidRequest(format!(
                "Unknown job type: \"{other}\""
            ))),
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// OperationPayload
// ---------------------------------------------------------------------------

/// Typed operation input, one variant per job type.
///
/// The serde tag matches [`JobType::as_str`], so a payload deserialized from
/// a job row always agrees with the row's `job_type` column.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OperationPayload {
    /// Run a list of read-only commands against each host.
    RunCommands { commands: Vec<String> },

    /// Capture the running configuration of each host.
    ConfigBackup,

    /// Render and diff a candidate configuration without committing it.
    ConfigDeployPreview { candidate: String },

    /// Commit a candidate configuration.
    ConfigDeployCommit {
        candidate: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comment: Option<String>,
    },

    /// Evaluate a named compliance ruleset against each host.
    ComplianceCheck { ruleset: String },

    /// Discover neighbor adjacencies via the listed protocols.
    TopologyDiscovery { protocols: Vec<String> },

    /// Execute one step of a visual workflow.
    WorkflowStep {
        workflow_id: DbId,
        step: String,
        #[serde(default)]
        input: serde_json::Value,
    },
}

impl OperationPayload {
    /// The job type this payload belongs to.
    pub fn job_type(&self) -> JobType {
        match self {
            OperationPayload::RunCommands { .. } => JobType::RunCommands,
            OperationPayload::ConfigBackup => JobType::ConfigBackup,
            OperationPayload::ConfigDeployPreview { .. } => JobType::ConfigDeployPreview,
            OperationPayload::ConfigDeployCommit { .. } => JobType::ConfigDeployCommit,
            OperationPayload::ComplianceCheck { .. } => JobType::ComplianceCheck,
            OperationPayload::TopologyDiscovery { .. } => JobType::TopologyDiscovery,
            OperationPayload::WorkflowStep { .. } => JobType::WorkflowStep,
        }
    }

    /// Structural validation, applied at submission time.
    pub fn validate(&self) -> Result<(), CoreError> {
        match self {
            OperationPayload::RunCommands { commands } => {
                if commands.is_empty() {
                    return Err(CoreError::InvalidRequest(
                        "run-commands payload must contain at least one command".to_string(),
                    ));
                }
                if commands.len() > MAX_COMMANDS {
                    return Err(CoreError::InvalidRequest(format!(
                        "run-commands payload may contain at most {MAX_COMMANDS} commands"
                    )));
                }
                for (i, command) in commands.iter().enumerate() {
                    if command.trim().is_empty() {
                        return Err(CoreError::InvalidRequest(format!(
                            "Command at index {i} is empty"
                        )));
                    }
                    if command.len() > MAX_COMMAND_LEN {
                        return Err(CoreError::InvalidRequest(format!(
                            "Command at index {i} exceeds {MAX_COMMAND_LEN} characters"
                        )));
                    }
                }
                Ok(())
            }
            OperationPayload::ConfigBackup => Ok(()),
            OperationPayload::ConfigDeployPreview { candidate }
            | OperationPayload::ConfigDeployCommit { candidate, .. } => {
                if candidate.trim().is_empty() {
                    return Err(CoreError::InvalidRequest(
                        "Candidate configuration must not be empty".to_string(),
                    ));
                }
                Ok(())
            }
            OperationPayload::ComplianceCheck { ruleset } => {
                if ruleset.trim().is_empty() {
                    return Err(CoreError::InvalidRequest(
                        "Compliance ruleset name must not be empty".to_string(),
                    ));
                }
                Ok(())
            }
            OperationPayload::TopologyDiscovery { protocols } => {
                if protocols.is_empty() {
                    return Err(CoreError::InvalidRequest(
                        "topology-discovery payload must list at least one protocol".to_string(),
                    ));
                }
                Ok(())
            }
            OperationPayload::WorkflowStep { step, .. } => {
                if step.trim().is_empty() {
                    return Err(CoreError::InvalidRequest(
                        "Workflow step name must not be empty".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn job_type_wire_names_roundtrip() {
        for ty in [
            JobType::RunCommands,
            JobType::ConfigBackup,
            JobType::ConfigDeployPreview,
            JobType::ConfigDeployCommit,
            JobType::ComplianceCheck,
            JobType::TopologyDiscovery,
            JobType::WorkflowStep,
        ] {
            assert_eq!(JobType::parse(ty.as_str()).unwrap(), ty);
        }
    }

    #[test]
    fn unknown_job_type_rejected() {
        assert_matches!(
            JobType::parse("reboot-everything"),
            Err(CoreError::InvalidRequest(_))
        );
    }

    #[test]
    fn payload_tag_matches_job_type() {
        let payload = OperationPayload::RunCommands {
            commands: vec!["show version".to_string()],
        };
        let json = serde_json::to_value(&payload).expect("serialize");
        assert_eq!(json["type"], payload.job_type().as_str());
    }

    #[test]
    fn payload_deserializes_by_tag() {
        let json = serde_json::json!({
            "type": "config-deploy-commit",
            "candidate": "hostname core1",
            "comment": "rollout",
        });
        let payload: OperationPayload = serde_json::from_value(json).expect("deserialize");
        assert_eq!(payload.job_type(), JobType::ConfigDeployCommit);
        assert_matches!(payload, OperationPayload::ConfigDeployCommit { .. });
    }

    #[test]
    fn empty_command_list_rejected() {
        let payload = OperationPayload::RunCommands { commands: vec![] };
        assert_matches!(payload.validate(), Err(CoreError::InvalidRequest(_)));
    }

    #[test]
    fn blank_candidate_rejected() {
        let payload = OperationPayload::ConfigDeployPreview {
            candidate: "   ".to_string(),
        };
        assert_matches!(payload.validate(), Err(CoreError::InvalidRequest(_)));
    }

    #[test]
    fn workflow_step_requires_name() {
        let payload = OperationPayload::WorkflowStep {
            workflow_id: 3,
            step: String::new(),
            input: serde_json::Value::Null,
        };
        assert_matches!(payload.validate(), Err(CoreError::InvalidRequest(_)));
    }
}

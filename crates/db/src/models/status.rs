//! Status helper enums mapping to SMALLINT lookup values, plus the job
//! state machine's transition table.
//!
//! Each enum variant's discriminant matches the value stored in the
//! corresponding `*_id` column (1-based).

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Map a stored status ID back to the enum.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some(Self::$variant), )+
                    _ => None,
                }
            }

            /// Lowercase wire/display name.
            pub fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $label, )+
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

define_status_enum! {
    /// Job lifecycle status.
    JobStatus {
        Queued = 1 => "queued",
        Scheduled = 2 => "scheduled",
        Running = 3 => "running",
        Succeeded = 4 => "success",
        Partial = 5 => "partial",
        Failed = 6 => "failed",
        Cancelled = 7 => "cancelled",
    }
}

define_status_enum! {
    /// Region worker-pool health as reported by the external monitor.
    RegionHealth {
        Healthy = 1 => "healthy",
        Degraded = 2 => "degraded",
        Offline = 3 => "offline",
    }
}

define_status_enum! {
    /// Log entry severity.
    LogLevel {
        Debug = 1 => "debug",
        Info = 2 => "info",
        Warn = 3 => "warn",
        Error = 4 => "error",
    }
}

// ---------------------------------------------------------------------------
// Job state machine
// ---------------------------------------------------------------------------

impl JobStatus {
    /// True for statuses no transition may leave.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Partial | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// The statuses a job may be in for a transition *into* `self` to be
    /// legal. `Queued` is reachable only at creation, never by transition.
    ///
    /// This table is the single source of truth; the SQL guard in the job
    /// repository binds exactly these ids.
    pub fn valid_sources(self) -> &'static [JobStatus] {
        match self {
            JobStatus::Queued => &[],
            JobStatus::Scheduled => &[JobStatus::Queued],
            JobStatus::Running => &[JobStatus::Queued, JobStatus::Scheduled],
            JobStatus::Succeeded | JobStatus::Partial | JobStatus::Failed => &[JobStatus::Running],
            JobStatus::Cancelled => &[JobStatus::Queued, JobStatus::Scheduled, JobStatus::Running],
        }
    }

    /// Whether `from -> to` appears in the transition table.
    pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
        to.valid_sources().contains(&from)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_ids_match_seed_data() {
        assert_eq!(JobStatus::Queued.id(), 1);
        assert_eq!(JobStatus::Scheduled.id(), 2);
        assert_eq!(JobStatus::Running.id(), 3);
        assert_eq!(JobStatus::Succeeded.id(), 4);
        assert_eq!(JobStatus::Partial.id(), 5);
        assert_eq!(JobStatus::Failed.id(), 6);
        assert_eq!(JobStatus::Cancelled.id(), 7);
    }

    #[test]
    fn from_id_roundtrips() {
        for id in 1..=7 {
            let status = JobStatus::from_id(id).expect("valid id");
            assert_eq!(status.id(), id);
        }
        assert!(JobStatus::from_id(0).is_none());
        assert!(JobStatus::from_id(8).is_none());
    }

    #[test]
    fn forward_transitions_allowed() {
        use JobStatus::*;
        assert!(JobStatus::can_transition(Queued, Scheduled));
        assert!(JobStatus::can_transition(Queued, Running));
        assert!(JobStatus::can_transition(Scheduled, Running));
        assert!(JobStatus::can_transition(Running, Succeeded));
        assert!(JobStatus::can_transition(Running, Partial));
        assert!(JobStatus::can_transition(Running, Failed));
    }

    #[test]
    fn cancellation_allowed_from_non_terminal() {
        use JobStatus::*;
        assert!(JobStatus::can_transition(Queued, Cancelled));
        assert!(JobStatus::can_transition(Scheduled, Cancelled));
        assert!(JobStatus::can_transition(Running, Cancelled));
    }

    #[test]
    fn no_transition_leaves_a_terminal_status() {
        use JobStatus::*;
        for terminal in [Succeeded, Partial, Failed, Cancelled] {
            for target in [Queued, Scheduled, Running, Succeeded, Partial, Failed, Cancelled] {
                assert!(
                    !JobStatus::can_transition(terminal, target),
                    "{terminal} -> {target} must be rejected"
                );
            }
        }
    }

    #[test]
    fn backward_transitions_rejected() {
        use JobStatus::*;
        assert!(!JobStatus::can_transition(Running, Queued));
        assert!(!JobStatus::can_transition(Running, Scheduled));
        assert!(!JobStatus::can_transition(Scheduled, Queued));
        assert!(!JobStatus::can_transition(Queued, Succeeded));
        assert!(!JobStatus::can_transition(Scheduled, Failed));
    }

    #[test]
    fn terminal_flags() {
        use JobStatus::*;
        for s in [Queued, Scheduled, Running] {
            assert!(!s.is_terminal());
        }
        for s in [Succeeded, Partial, Failed, Cancelled] {
            assert!(s.is_terminal());
        }
    }

    #[test]
    fn region_health_ids_match_seed_data() {
        assert_eq!(RegionHealth::Healthy.id(), 1);
        assert_eq!(RegionHealth::Degraded.id(), 2);
        assert_eq!(RegionHealth::Offline.id(), 3);
    }

    #[test]
    fn log_level_ids_match_seed_data() {
        assert_eq!(LogLevel::Debug.id(), 1);
        assert_eq!(LogLevel::Info.id(), 2);
        assert_eq!(LogLevel::Warn.id(), 3);
        assert_eq!(LogLevel::Error.id(), 4);
    }
}

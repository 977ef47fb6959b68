//! Synchronization settings consumed by the engine.
//!
//! Deserialised from the `[synchronization]` table of the service
//! configuration. Defaults mirror the production setup; `intake_group` and
//! `tracker_identity` have no sensible default and must be supplied.

use serde::{Deserialize, Serialize};

use crate::errors::ConfigurationError;

fn default_clock_skew_seconds() -> u32 {
    10
}

fn default_closed_statuses() -> Vec<String> {
    ["Closed", "Done", "Review done", "Resolved", "Won't do"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_initial_transition() -> String {
    "To Do".to_string()
}

fn default_issue_type() -> String {
    "Bug".to_string()
}

fn default_labels() -> Vec<String> {
    vec!["support-ticket".to_string()]
}

/// Engine behaviour knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Grace period (seconds) that keeps the engine's own tracker writes from
    /// being read back as tracker-side edits.
    #[serde(default = "default_clock_skew_seconds")]
    pub clock_skew_seconds: u32,

    /// Case-system group that takes over a case when its issue is closed.
    #[serde(default)]
    pub intake_group: String,

    /// Tracker status names (case-insensitive) that retire a mapping.
    #[serde(default = "default_closed_statuses")]
    pub closed_statuses: Vec<String>,

    /// Workflow transition applied to freshly created issues.
    #[serde(default = "default_initial_transition")]
    pub initial_transition: String,

    /// Issue type used when creating issues.
    #[serde(default = "default_issue_type")]
    pub issue_type: String,

    /// Labels applied when creating issues.
    #[serde(default = "default_labels")]
    pub labels: Vec<String>,

    /// Login name the tracker adapter authenticates as. Comments by this
    /// author are never imported into the case system.
    #[serde(default)]
    pub tracker_identity: String,
}

impl SyncSettings {
    /// Settings with production defaults and the two required values.
    pub fn new(intake_group: impl Into<String>, tracker_identity: impl Into<String>) -> Self {
        Self {
            clock_skew_seconds: default_clock_skew_seconds(),
            intake_group: intake_group.into(),
            closed_statuses: default_closed_statuses(),
            initial_transition: default_initial_transition(),
            issue_type: default_issue_type(),
            labels: default_labels(),
            tracker_identity: tracker_identity.into(),
        }
    }

    /// Checks the settings the engine cannot run without.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.intake_group.trim().is_empty() {
            return Err(ConfigurationError::new(
                "synchronization.intake_group must be set",
            ));
        }
        if self.tracker_identity.trim().is_empty() {
            return Err(ConfigurationError::new(
                "synchronization.tracker_identity must be set",
            ));
        }
        if self.closed_statuses.iter().all(|s| s.trim().is_empty()) {
            return Err(ConfigurationError::new(
                "synchronization.closed_statuses must name at least one status",
            ));
        }
        if self.issue_type.trim().is_empty() {
            return Err(ConfigurationError::new(
                "synchronization.issue_type must be set",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_to_omitted_fields() {
        let settings: SyncSettings = serde_json::from_str(
            r#"{"intake_group": "First line", "tracker_identity": "svc-sync"}"#,
        )
        .unwrap();
        assert_eq!(settings, SyncSettings::new("First line", "svc-sync"));
        assert_eq!(settings.clock_skew_seconds, 10);
        assert_eq!(settings.initial_transition, "To Do");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn missing_required_values_fail_validation() {
        assert!(SyncSettings::new("", "svc-sync").validate().is_err());
        assert!(SyncSettings::new("First line", " ").validate().is_err());

        let mut no_closed = SyncSettings::new("First line", "svc-sync");
        no_closed.closed_statuses.clear();
        assert!(no_closed.validate().is_err());
    }
}

//! Service configuration.
//!
//! Loaded from a TOML file with one table per collaborator. Secrets may be
//! left out of the file and supplied through the environment instead (see
//! [`SecretOverrides`]).

use std::path::{Path, PathBuf};

use anyhow::Context;
use case_system::CaseSystemConfig;
use notifier::NotifierConfig;
use reconciler::{ConfigurationError, SyncSettings};
use serde::{Deserialize, Serialize};
use tracker::TrackerConfig;

fn default_database_path() -> PathBuf {
    PathBuf::from("incident-sync.db")
}

fn default_interval_seconds() -> u64 {
    60
}

fn default_lock_at_most_for_seconds() -> u64 {
    300
}

fn default_lock_name() -> String {
    "synchronizer".to_string()
}

/// `[database]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// `[scheduler]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between pipeline passes.
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
    /// Lease length; a crashed holder's lock is taken over after this.
    #[serde(default = "default_lock_at_most_for_seconds")]
    pub lock_at_most_for_seconds: u64,
    #[serde(default = "default_lock_name")]
    pub lock_name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
            lock_at_most_for_seconds: default_lock_at_most_for_seconds(),
            lock_name: default_lock_name(),
        }
    }
}

/// `[telemetry]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Emit log lines as JSON objects.
    #[serde(default)]
    pub json: bool,
    /// OTLP (gRPC) collector; spans are exported only when set.
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

/// The whole configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub synchronization: SyncSettings,
    pub tracker: TrackerConfig,
    pub case_system: CaseSystemConfig,
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Secret values taken from the environment; each wins over the file.
#[derive(Debug, Clone, Default)]
pub struct SecretOverrides {
    pub tracker_password: Option<String>,
    pub case_api_key: Option<String>,
    pub notifier_token: Option<String>,
}

impl ServiceConfig {
    /// Parses TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigurationError> {
        toml::from_str(text).map_err(|err| ConfigurationError::new(err.to_string()))
    }

    /// Reads and parses the file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading configuration {}", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("parsing configuration {}", path.display()))
    }

    /// Applies environment secrets and derived defaults.
    ///
    /// An empty `synchronization.tracker_identity` becomes the tracker login,
    /// which is the author the tracker records on the engine's comments.
    pub fn resolve(mut self, overrides: SecretOverrides) -> Self {
        if let Some(password) = overrides.tracker_password {
            self.tracker.password = password;
        }
        if let Some(api_key) = overrides.case_api_key {
            self.case_system.api_key = api_key;
        }
        if let Some(token) = overrides.notifier_token {
            self.notifier.token = token;
        }
        if self.synchronization.tracker_identity.trim().is_empty() {
            self.synchronization.tracker_identity = self.tracker.username.clone();
        }
        self
    }

    /// Checks everything a pipeline run needs.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.synchronization.validate()?;
        self.tracker.validate()?;
        self.case_system.validate()?;
        self.notifier.validate()?;
        if self.scheduler.interval_seconds == 0 {
            return Err(ConfigurationError::new(
                "scheduler.interval_seconds must be greater than zero",
            ));
        }
        if self.scheduler.lock_name.trim().is_empty() {
            return Err(ConfigurationError::new("scheduler.lock_name must be set"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const MINIMAL: &str = r##"
[synchronization]
intake_group = "First line"

[tracker]
url = "https://tracker.example.com"
username = "svc-sync"
project_key = "SUP"

[case_system]
url = "https://cases.example.com/api"

[notifier]
url = "https://messaging.example.com/api"
channel = "#support"
"##;

    fn secrets() -> SecretOverrides {
        SecretOverrides {
            tracker_password: Some("token".into()),
            case_api_key: Some("key".into()),
            notifier_token: Some("xoxb".into()),
        }
    }

    #[test]
    fn minimal_file_gets_defaults() {
        let config = ServiceConfig::from_toml(MINIMAL).unwrap();
        assert_eq!(config.scheduler, SchedulerConfig::default());
        assert_eq!(config.database.path, PathBuf::from("incident-sync.db"));
        assert_eq!(config.telemetry, TelemetryConfig::default());
        assert_eq!(config.tracker.metadata_cache_ttl_seconds, 3600);
        assert_eq!(config.synchronization.clock_skew_seconds, 10);
    }

    #[test]
    fn secrets_are_required_until_supplied() {
        let config = ServiceConfig::from_toml(MINIMAL).unwrap();
        assert!(config.clone().resolve(SecretOverrides::default()).validate().is_err());
        assert!(config.resolve(secrets()).validate().is_ok());
    }

    #[test]
    fn environment_wins_over_file() {
        let text = MINIMAL.replace(
            "project_key = \"SUP\"",
            "project_key = \"SUP\"\npassword = \"from-file\"",
        );
        let config = ServiceConfig::from_toml(&text).unwrap().resolve(secrets());
        assert_eq!(config.tracker.password, "token");
    }

    #[test]
    fn tracker_identity_defaults_to_login() {
        let config = ServiceConfig::from_toml(MINIMAL).unwrap().resolve(secrets());
        assert_eq!(config.synchronization.tracker_identity, "svc-sync");

        let text = MINIMAL.replace(
            "intake_group = \"First line\"",
            "intake_group = \"First line\"\ntracker_identity = \"robot\"",
        );
        let config = ServiceConfig::from_toml(&text).unwrap().resolve(secrets());
        assert_eq!(config.synchronization.tracker_identity, "robot");
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut config = ServiceConfig::from_toml(MINIMAL).unwrap().resolve(secrets());
        config.scheduler.interval_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_table_is_a_parse_error() {
        let err = ServiceConfig::from_toml("[tracker]\nurl = \"x\"").unwrap_err();
        assert!(err.message.contains("synchronization") || err.message.contains("missing"));
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("incident-sync.toml");
        std::fs::write(&path, MINIMAL).unwrap();
        let config = ServiceConfig::load(&path).unwrap();
        assert_eq!(config.tracker.project_key, "SUP");

        assert!(ServiceConfig::load(&dir.path().join("absent.toml")).is_err());
    }
}

//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reconciler::MappingStatus;

use crate::config::SecretOverrides;

/// Keeps case-system records and tracker issues in step.
#[derive(Parser, Debug)]
#[command(name = "incident-sync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file.
    #[arg(short, long, env = "INCIDENT_SYNC_CONFIG", default_value = "incident-sync.toml", global = true)]
    pub config: PathBuf,

    /// Tracker password, overriding `tracker.password`.
    #[arg(long, env = "INCIDENT_SYNC_TRACKER_PASSWORD", hide_env_values = true, global = true)]
    pub tracker_password: Option<String>,

    /// Case-system API key, overriding `case_system.api_key`.
    #[arg(long, env = "INCIDENT_SYNC_CASE_API_KEY", hide_env_values = true, global = true)]
    pub case_api_key: Option<String>,

    /// Messaging token, overriding `notifier.token`.
    #[arg(long, env = "INCIDENT_SYNC_NOTIFIER_TOKEN", hide_env_values = true, global = true)]
    pub notifier_token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn secrets(&self) -> SecretOverrides {
        SecretOverrides {
            tracker_password: self.tracker_password.clone(),
            case_api_key: self.case_api_key.clone(),
            notifier_token: self.notifier_token.clone(),
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the pipeline every `scheduler.interval_seconds` until Ctrl-C.
    Serve,

    /// Run the pipeline once.
    Sync,

    /// Register a changed case for synchronization.
    Ingest {
        /// Municipality id, e.g. 2281.
        tenant_id: String,
        /// Case-system record key.
        case_key: String,
    },

    /// List stored mappings as JSON lines.
    Mappings {
        /// Only mappings in this status (CASE_CHANGED, TRACKER_CHANGED, MIRRORED).
        #[arg(long, value_parser = parse_status)]
        status: Option<MappingStatus>,
    },
}

fn parse_status(raw: &str) -> Result<MappingStatus, String> {
    raw.parse::<MappingStatus>().map_err(|err| err.to_string())
}

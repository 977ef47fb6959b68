//! `incident-sync` entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse configuration**: load the TOML file, apply environment secrets,
//!    and validate before any collaborator is built.
//! 2. **Wire observability**: install the `tracing-subscriber` stack (text or
//!    JSON, optional OTLP exporter). Every span and event from the workspace
//!    flows through it.
//! 3. **Construct infrastructure**: the case-system, tracker, and messaging
//!    clients plus the SQLite store, injected into the domain as ports.
//! 4. **Dispatch the command**: `serve`, `sync`, `ingest`, or `mappings`.

mod app;
mod args;
mod config;
mod scheduler;
mod telemetry;

use anyhow::Context;
use clap::Parser;
use reconciler::MappingStore;
use tracing::{info, warn};

use crate::args::{Cli, Command};
use crate::config::ServiceConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ServiceConfig::load(&cli.config)?.resolve(cli.secrets());
    let _telemetry = telemetry::init(&config.telemetry).context("initialising telemetry")?;

    let store = app::open_store(&config.database).context("opening mapping store")?;

    match cli.command {
        Command::Serve => {
            let scheduler = app::scheduler(&config, store)?;
            scheduler
                .run_until(async {
                    if let Err(err) = tokio::signal::ctrl_c().await {
                        warn!(error = %err, "ctrl-c handler failed, stopping");
                    }
                })
                .await;
        }
        Command::Sync => {
            let scheduler = app::scheduler(&config, store)?;
            match scheduler.run_once().await? {
                Some(report) => {
                    info!(
                        run_id = %report.run_id,
                        failed = report.failed(),
                        pushed = report.push.transitioned,
                        pulled = report.pull.transitioned,
                        removed = report.finalize.removed,
                        "sync finished"
                    );
                }
                None => info!("another instance is running, nothing done"),
            }
        }
        Command::Ingest {
            tenant_id,
            case_key,
        } => {
            let mapping = app::ingestor(store).ingest(&tenant_id, &case_key).await?;
            println!("{}", serde_json::to_string(&mapping)?);
        }
        Command::Mappings { status } => {
            let mappings = match status {
                Some(status) => store.find_by_status(status).await?,
                None => store.find_all().await?,
            };
            for mapping in mappings {
                println!("{}", serde_json::to_string(&mapping)?);
            }
        }
    }
    Ok(())
}

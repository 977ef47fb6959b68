//! Periodic, lock-guarded pipeline execution.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reconciler::{PipelineReport, RunLock, StoreError, SynchronizationOrchestrator};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::config::SchedulerConfig;

/// Runs the pipeline on a fixed interval, one pass at a time cluster-wide.
pub struct Scheduler {
    orchestrator: SynchronizationOrchestrator,
    lock: Arc<dyn RunLock>,
    config: SchedulerConfig,
    holder: String,
}

impl Scheduler {
    pub fn new(
        orchestrator: SynchronizationOrchestrator,
        lock: Arc<dyn RunLock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            orchestrator,
            lock,
            config,
            holder: format!("incident-sync-{}", uuid::Uuid::new_v4()),
        }
    }

    /// Identity this process takes the run lock under.
    pub fn holder(&self) -> &str {
        &self.holder
    }

    /// Runs one pass if the run lock is free. `None` means another holder
    /// has a live lease and the pass was skipped.
    pub async fn run_once(&self) -> Result<Option<PipelineReport>, StoreError> {
        let lease = self
            .lock
            .try_acquire(
                &self.config.lock_name,
                &self.holder,
                Duration::from_secs(self.config.lock_at_most_for_seconds),
            )
            .await?;
        let Some(lease) = lease else {
            info!(lock = %self.config.lock_name, "run lock held elsewhere, skipping pass");
            return Ok(None);
        };

        let report = self.orchestrator.run_pipeline().await;
        if let Err(err) = self.lock.release(&lease).await {
            // The lease still expires on its own.
            warn!(error = %err, lock = %lease.name, "failed to release run lock");
        }
        Ok(Some(report))
    }

    /// Runs a pass every `interval_seconds` until `shutdown` completes.
    /// A pass in progress is finished before returning.
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.interval_seconds));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            interval_seconds = self.config.interval_seconds,
            holder = %self.holder,
            "scheduler started"
        );
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested, scheduler stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.run_once().await {
                        error!(error = %err, "could not take run lock");
                    }
                }
            }
        }
    }
}

//! Synchronization orchestrator.
//!
//! One call to [`SynchronizationOrchestrator::run_pipeline`] is one pass:
//! detect, pull, push, finalize, in that order. Callers are expected to hold
//! the cluster-wide run lock; the orchestrator itself takes none.

use std::sync::Arc;

use tracing::{info, info_span, Instrument};

use crate::engine::{PhaseReport, ReconciliationEngine};
use crate::PipelineRunId;

/// Per-phase tallies of one pipeline pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineReport {
    /// Identifier recorded on every log line of the pass.
    pub run_id: PipelineRunId,
    /// Detect-tracker-changes phase.
    pub detect: PhaseReport,
    /// Pull-from-tracker phase.
    pub pull: PhaseReport,
    /// Push-to-tracker phase.
    pub push: PhaseReport,
    /// Finalize-closed phase.
    pub finalize: PhaseReport,
}

impl PipelineReport {
    /// Mappings that failed in any phase.
    pub fn failed(&self) -> usize {
        self.detect.failed + self.pull.failed + self.push.failed + self.finalize.failed
    }
}

/// Runs the engine's operations in fixed order.
#[derive(Clone)]
pub struct SynchronizationOrchestrator {
    engine: Arc<ReconciliationEngine>,
}

impl SynchronizationOrchestrator {
    /// Creates an orchestrator driving `engine`.
    pub fn new(engine: Arc<ReconciliationEngine>) -> Self {
        Self { engine }
    }

    /// Executes one pass. Safe to call at any time; a pass with nothing to do
    /// makes only read calls.
    pub async fn run_pipeline(&self) -> PipelineReport {
        let run_id = PipelineRunId::new_random();
        let span = info_span!("pipeline_run", %run_id);

        async {
            info!("pipeline run started");
            let detect = self.engine.detect_tracker_changes().await;
            let pull = self.engine.pull_from_tracker().await;
            let push = self.engine.push_to_tracker().await;
            let finalize = self.engine.finalize_closed().await;

            let report = PipelineReport {
                run_id,
                detect,
                pull,
                push,
                finalize,
            };
            info!(failed = report.failed(), "pipeline run finished");
            report
        }
        .instrument(span)
        .await
    }
}

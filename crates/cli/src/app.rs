//! Composition root: builds the concrete adapters and hands them to the
//! domain as port trait objects.

use std::sync::Arc;

use case_system::CaseSystemClient;
use mapping_store::SqliteStore;
use notifier::NotifierClient;
use reconciler::{
    ConfigurationError, Ingestor, MappingStore, ReconciliationEngine, RunLock, StoreError,
    SynchronizationOrchestrator,
};
use tracker::TrackerClient;
use tracing::info;

use crate::config::{DatabaseConfig, ServiceConfig};
use crate::scheduler::Scheduler;

/// Opens the mapping database.
pub fn open_store(config: &DatabaseConfig) -> Result<Arc<SqliteStore>, StoreError> {
    let store = SqliteStore::open(&config.path)?;
    info!(path = %config.path.display(), "mapping store opened");
    Ok(Arc::new(store))
}

/// Ingestion needs only the store.
pub fn ingestor(store: Arc<SqliteStore>) -> Ingestor {
    Ingestor::new(store)
}

/// Builds the orchestrator over real gateways. `config` must be resolved.
pub fn orchestrator(
    config: &ServiceConfig,
    store: Arc<SqliteStore>,
) -> Result<SynchronizationOrchestrator, ConfigurationError> {
    config.validate()?;
    let store: Arc<dyn MappingStore> = store;
    let engine = ReconciliationEngine::new(
        Arc::new(CaseSystemClient::new(&config.case_system)?),
        Arc::new(TrackerClient::new(&config.tracker)?),
        Arc::new(NotifierClient::new(&config.notifier)?),
        store,
        config.synchronization.clone(),
    );
    Ok(SynchronizationOrchestrator::new(Arc::new(engine)))
}

/// Builds the scheduler, using the mapping database as the run lock.
pub fn scheduler(
    config: &ServiceConfig,
    store: Arc<SqliteStore>,
) -> Result<Scheduler, ConfigurationError> {
    let orchestrator = orchestrator(config, Arc::clone(&store))?;
    let lock: Arc<dyn RunLock> = store;
    Ok(Scheduler::new(orchestrator, lock, config.scheduler.clone()))
}

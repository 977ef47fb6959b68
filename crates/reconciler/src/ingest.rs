//! Case-event ingestion.
//!
//! The entry point the case system's change notifications arrive through.
//! Serialised within the process only; it does not take the cluster-wide run
//! lock and may interleave with a pipeline pass.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::ports::MappingStore;
use crate::{CaseKey, IncidentMapping, IngestError, TenantId};

/// Records case-side changes as `CaseChanged` mappings.
pub struct Ingestor {
    store: Arc<dyn MappingStore>,
    gate: Mutex<()>,
}

impl Ingestor {
    /// Creates an ingestor writing to `store`.
    pub fn new(store: Arc<dyn MappingStore>) -> Self {
        Self {
            store,
            gate: Mutex::new(()),
        }
    }

    /// Validates the input and upserts the mapping for `(tenant_id, case_key)`.
    ///
    /// A new mapping starts as `CaseChanged`. An existing `Mirrored` mapping
    /// moves to `CaseChanged`; a pending `TrackerChanged` is left alone.
    /// Repeated calls for the same key never create a second mapping.
    ///
    /// # Errors
    ///
    /// [`IngestError::Validation`] for a malformed tenant id or case key,
    /// [`IngestError::Store`] when the mapping cannot be persisted.
    #[instrument(skip(self))]
    pub async fn ingest(
        &self,
        tenant_id: &str,
        case_key: &str,
    ) -> Result<IncidentMapping, IngestError> {
        let tenant_id = TenantId::parse(tenant_id)?;
        let case_key = CaseKey::parse(case_key)?;

        let _guard = self.gate.lock().await;
        let mapping = match self
            .store
            .find_by_tenant_and_case_key(&tenant_id, &case_key)
            .await?
        {
            None => {
                info!("new case registered for synchronization");
                IncidentMapping::new(tenant_id, case_key)
            }
            Some(mut existing) => {
                if existing.signal_case_change() {
                    info!("case change recorded");
                } else {
                    debug!(status = %existing.status, "case change signal absorbed");
                }
                existing
            }
        };
        Ok(self.store.upsert(mapping).await?)
    }
}

//! In-memory [`MappingStore`].
//!
//! Enforces the same uniqueness rules and timestamp handling as the SQLite
//! store. Used by the engine tests and for dry runs without a database.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::ports::MappingStore;
use crate::{
    CaseKey, IncidentMapping, MappingId, MappingStatus, StoreError, TenantId, Timestamp,
};

/// Mapping store backed by a `Vec`, kept in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryMappingStore {
    rows: Mutex<Vec<IncidentMapping>>,
}

impl InMemoryMappingStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn conflict(rows: &[IncidentMapping], mapping: &IncidentMapping) -> Option<StoreError> {
    for row in rows.iter().filter(|row| row.id != mapping.id) {
        if row.tenant_id == mapping.tenant_id && row.case_key == mapping.case_key {
            return Some(StoreError::Conflict {
                message: format!(
                    "mapping for tenant {} and case {} already exists",
                    mapping.tenant_id, mapping.case_key
                ),
            });
        }
        if row.tracker_key.is_some() && row.tracker_key == mapping.tracker_key {
            return Some(StoreError::Conflict {
                message: format!(
                    "tracker key {} is already mapped",
                    row.tracker_key.as_ref().map(|k| k.as_str()).unwrap_or_default()
                ),
            });
        }
    }
    None
}

#[async_trait]
impl MappingStore for InMemoryMappingStore {
    async fn find_by_tenant_and_case_key(
        &self,
        tenant_id: &TenantId,
        case_key: &CaseKey,
    ) -> Result<Option<IncidentMapping>, StoreError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .find(|row| &row.tenant_id == tenant_id && &row.case_key == case_key)
            .cloned())
    }

    async fn find_by_status(
        &self,
        status: MappingStatus,
    ) -> Result<Vec<IncidentMapping>, StoreError> {
        let rows = self.rows.lock().await;
        Ok(rows.iter().filter(|row| row.status == status).cloned().collect())
    }

    async fn find_all_with_tracker_key(&self) -> Result<Vec<IncidentMapping>, StoreError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .filter(|row| row.tracker_key.is_some())
            .cloned()
            .collect())
    }

    async fn find_all(&self) -> Result<Vec<IncidentMapping>, StoreError> {
        Ok(self.rows.lock().await.clone())
    }

    async fn upsert(&self, mut mapping: IncidentMapping) -> Result<IncidentMapping, StoreError> {
        let mut rows = self.rows.lock().await;
        if let Some(err) = conflict(&rows, &mapping) {
            return Err(err);
        }

        let now = Timestamp::now();
        match rows.iter_mut().find(|row| row.id == mapping.id) {
            Some(row) => {
                mapping.created_at = row.created_at;
                mapping.modified_at = Some(now);
                *row = mapping.clone();
            }
            None => {
                mapping.created_at = Some(now);
                mapping.modified_at = None;
                rows.push(mapping.clone());
            }
        }
        Ok(mapping)
    }

    async fn delete(&self, id: MappingId) -> Result<(), StoreError> {
        self.rows.lock().await.retain(|row| row.id != id);
        Ok(())
    }
}

//! [`MappingStore`] and [`RunLock`] over a single SQLite connection.
//!
//! `rusqlite` is synchronous, so every call runs on the blocking pool with
//! the connection behind a mutex.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use reconciler::{
    CaseKey, IncidentMapping, LockLease, MappingId, MappingStatus, MappingStore, RunLock,
    StoreError, TenantId, Timestamp, TrackerKey,
};

use crate::schema;

const COLUMNS: &str = "id, tenant_id, case_key, tracker_key, status, created_at, modified_at, \
                       last_synced_to_tracker, last_synced_to_case";

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn backend(message: impl Into<String>) -> StoreError {
    StoreError::Backend {
        message: message.into(),
    }
}

fn store_error(err: rusqlite::Error) -> StoreError {
    match err {
        rusqlite::Error::SqliteFailure(ref failure, ref message)
            if failure.code == ErrorCode::ConstraintViolation =>
        {
            StoreError::Conflict {
                message: message.clone().unwrap_or_else(|| err.to_string()),
            }
        }
        other => backend(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Row conversion
// ---------------------------------------------------------------------------

fn text_to_timestamp(value: Option<String>) -> Result<Option<Timestamp>, StoreError> {
    value
        .map(|raw| {
            Timestamp::parse_rfc3339(&raw).ok_or_else(|| backend(format!("unreadable timestamp '{raw}'")))
        })
        .transpose()
}

fn timestamp_to_text(value: Option<Timestamp>) -> Option<String> {
    value.map(Timestamp::to_rfc3339_millis)
}

/// Raw column values, read before any domain validation.
struct MappingRow {
    id: String,
    tenant_id: String,
    case_key: String,
    tracker_key: Option<String>,
    status: String,
    created_at: Option<String>,
    modified_at: Option<String>,
    last_synced_to_tracker: Option<String>,
    last_synced_to_case: Option<String>,
}

impl MappingRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            tenant_id: row.get(1)?,
            case_key: row.get(2)?,
            tracker_key: row.get(3)?,
            status: row.get(4)?,
            created_at: row.get(5)?,
            modified_at: row.get(6)?,
            last_synced_to_tracker: row.get(7)?,
            last_synced_to_case: row.get(8)?,
        })
    }

    fn into_mapping(self) -> Result<IncidentMapping, StoreError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|err| backend(format!("mapping id '{}': {err}", self.id)))?;
        Ok(IncidentMapping {
            id: MappingId::from_uuid(id),
            tenant_id: TenantId::new(self.tenant_id)
                .ok_or_else(|| backend("mapping without tenant"))?,
            case_key: CaseKey::new(self.case_key)
                .ok_or_else(|| backend("mapping without case key"))?,
            tracker_key: self.tracker_key.and_then(TrackerKey::new),
            status: self
                .status
                .parse::<MappingStatus>()
                .map_err(|err| backend(err.to_string()))?,
            created_at: text_to_timestamp(self.created_at)?,
            modified_at: text_to_timestamp(self.modified_at)?,
            last_synced_to_tracker: text_to_timestamp(self.last_synced_to_tracker)?,
            last_synced_to_case: text_to_timestamp(self.last_synced_to_case)?,
        })
    }
}

fn query_mappings(
    conn: &Connection,
    filter: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<IncidentMapping>, StoreError> {
    let sql = format!("SELECT {COLUMNS} FROM incident_mapping {filter} ORDER BY created_at, id");
    let mut stmt = conn.prepare(&sql).map_err(store_error)?;
    let rows = stmt
        .query_map(params, MappingRow::read)
        .map_err(store_error)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(store_error)?;
    rows.into_iter().map(MappingRow::into_mapping).collect()
}

/// Current time at the precision the store keeps.
fn stored_now() -> Timestamp {
    let now = Timestamp::now();
    Timestamp::parse_rfc3339(&now.to_rfc3339_millis()).unwrap_or(now)
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// SQLite-backed mapping store and run lock.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path` and migrates it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref()).map_err(store_error)?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(store_error)?;
        Self::init(conn)
    }

    /// Opens a private in-memory database.
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory().map_err(store_error)?)
    }

    fn init(mut conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(Duration::from_secs(5)).map_err(store_error)?;
        schema::migrate(&mut conn).map_err(store_error)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` against the connection on the blocking pool.
    async fn call<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| backend("connection mutex poisoned"))?;
            f(&mut guard)
        })
        .await
        .map_err(|err| backend(format!("store task failed: {err}")))?
    }
}

#[async_trait]
impl MappingStore for SqliteStore {
    async fn find_by_tenant_and_case_key(
        &self,
        tenant_id: &TenantId,
        case_key: &CaseKey,
    ) -> Result<Option<IncidentMapping>, StoreError> {
        let (tenant_id, case_key) = (tenant_id.to_string(), case_key.to_string());
        self.call(move |conn| {
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {COLUMNS} FROM incident_mapping WHERE tenant_id = ?1 AND case_key = ?2"
                    ),
                    params![tenant_id, case_key],
                    MappingRow::read,
                )
                .optional()
                .map_err(store_error)?;
            row.map(MappingRow::into_mapping).transpose()
        })
        .await
    }

    async fn find_by_status(&self, status: MappingStatus) -> Result<Vec<IncidentMapping>, StoreError> {
        self.call(move |conn| query_mappings(conn, "WHERE status = ?1", [status.as_str()]))
            .await
    }

    async fn find_all_with_tracker_key(&self) -> Result<Vec<IncidentMapping>, StoreError> {
        self.call(|conn| query_mappings(conn, "WHERE tracker_key IS NOT NULL", []))
            .await
    }

    async fn find_all(&self) -> Result<Vec<IncidentMapping>, StoreError> {
        self.call(|conn| query_mappings(conn, "", [])).await
    }

    #[instrument(skip_all, fields(mapping_id = %mapping.id.as_uuid(), status = %mapping.status))]
    async fn upsert(&self, mut mapping: IncidentMapping) -> Result<IncidentMapping, StoreError> {
        self.call(move |conn| {
            let tx = conn.transaction().map_err(store_error)?;
            let id = mapping.id.as_uuid().to_string();
            let existing: Option<Option<String>> = tx
                .query_row(
                    "SELECT created_at FROM incident_mapping WHERE id = ?1",
                    [&id],
                    |row| row.get(0),
                )
                .optional()
                .map_err(store_error)?;

            let now = stored_now();
            match existing {
                Some(created_at) => {
                    mapping.created_at = text_to_timestamp(created_at)?;
                    mapping.modified_at = Some(now);
                    tx.execute(
                        "UPDATE incident_mapping SET tenant_id = ?2, case_key = ?3, tracker_key = ?4,
                           status = ?5, modified_at = ?6, last_synced_to_tracker = ?7,
                           last_synced_to_case = ?8
                         WHERE id = ?1",
                        params![
                            id,
                            mapping.tenant_id.as_str(),
                            mapping.case_key.as_str(),
                            mapping.tracker_key.as_ref().map(TrackerKey::as_str),
                            mapping.status.as_str(),
                            timestamp_to_text(mapping.modified_at),
                            timestamp_to_text(mapping.last_synced_to_tracker),
                            timestamp_to_text(mapping.last_synced_to_case),
                        ],
                    )
                    .map_err(store_error)?;
                }
                None => {
                    mapping.created_at = Some(now);
                    mapping.modified_at = None;
                    tx.execute(
                        &format!("INSERT INTO incident_mapping({COLUMNS})
                                  VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7, ?8)"),
                        params![
                            id,
                            mapping.tenant_id.as_str(),
                            mapping.case_key.as_str(),
                            mapping.tracker_key.as_ref().map(TrackerKey::as_str),
                            mapping.status.as_str(),
                            timestamp_to_text(mapping.created_at),
                            timestamp_to_text(mapping.last_synced_to_tracker),
                            timestamp_to_text(mapping.last_synced_to_case),
                        ],
                    )
                    .map_err(store_error)?;
                }
            }
            tx.commit().map_err(store_error)?;
            debug!("mapping stored");
            Ok(mapping)
        })
        .await
    }

    async fn delete(&self, id: MappingId) -> Result<(), StoreError> {
        let id = id.as_uuid().to_string();
        self.call(move |conn| {
            conn.execute("DELETE FROM incident_mapping WHERE id = ?1", [id])
                .map_err(store_error)?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl RunLock for SqliteStore {
    #[instrument(skip(self))]
    async fn try_acquire(
        &self,
        name: &str,
        holder: &str,
        lock_at_most_for: Duration,
    ) -> Result<Option<LockLease>, StoreError> {
        let (name, holder) = (name.to_string(), holder.to_string());
        let seconds = i64::try_from(lock_at_most_for.as_secs()).unwrap_or(i64::MAX);
        self.call(move |conn| {
            let now = stored_now();
            let locked_until = now.plus_seconds(seconds);
            // Takes a free name, or an expired lease held by anyone.
            let taken = conn
                .execute(
                    "INSERT INTO run_lock(name, holder, locked_at, locked_until)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(name) DO UPDATE SET
                       holder = excluded.holder,
                       locked_at = excluded.locked_at,
                       locked_until = excluded.locked_until
                     WHERE run_lock.locked_until <= excluded.locked_at",
                    params![
                        name,
                        holder,
                        now.to_rfc3339_millis(),
                        locked_until.to_rfc3339_millis()
                    ],
                )
                .map_err(store_error)?;
            Ok((taken == 1).then(|| LockLease {
                name,
                holder,
                locked_until,
            }))
        })
        .await
    }

    #[instrument(skip_all, fields(name = %lease.name, holder = %lease.holder))]
    async fn release(&self, lease: &LockLease) -> Result<(), StoreError> {
        let (name, holder) = (lease.name.clone(), lease.holder.clone());
        self.call(move |conn| {
            conn.execute(
                "DELETE FROM run_lock WHERE name = ?1 AND holder = ?2",
                params![name, holder],
            )
            .map_err(store_error)?;
            Ok(())
        })
        .await
    }
}

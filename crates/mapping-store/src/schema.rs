//! Versioned schema migrations.
//!
//! Each migration runs once, inside its own transaction, and is recorded in
//! `schema_migrations`. Re-opening an up-to-date database is a no-op.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use reconciler::Timestamp;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "incident_mapping",
        sql: r#"
CREATE TABLE incident_mapping(
  id TEXT PRIMARY KEY,
  tenant_id TEXT NOT NULL,
  case_key TEXT NOT NULL,
  tracker_key TEXT NULL,
  status TEXT NOT NULL,
  created_at TEXT NOT NULL,
  modified_at TEXT NULL,
  last_synced_to_tracker TEXT NULL,
  last_synced_to_case TEXT NULL,
  UNIQUE(tenant_id, case_key)
);
CREATE UNIQUE INDEX ux_incident_mapping_tracker_key
  ON incident_mapping(tracker_key) WHERE tracker_key IS NOT NULL;
CREATE INDEX ix_incident_mapping_case_key ON incident_mapping(case_key);
CREATE INDEX ix_incident_mapping_status ON incident_mapping(status);
"#,
    },
    Migration {
        version: 2,
        name: "run_lock",
        sql: r#"
CREATE TABLE run_lock(
  name TEXT PRIMARY KEY,
  holder TEXT NOT NULL,
  locked_at TEXT NOT NULL,
  locked_until TEXT NOT NULL
);
"#,
    },
];

/// Highest schema version this build knows about.
pub const CURRENT_VERSION: i64 = 2;

/// Brings the database up to [`CURRENT_VERSION`].
pub fn migrate(conn: &mut Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations(
           version INTEGER PRIMARY KEY,
           name TEXT NOT NULL,
           applied_at TEXT NOT NULL
         );",
    )?;

    for migration in MIGRATIONS {
        let applied: Option<i64> = conn
            .query_row(
                "SELECT version FROM schema_migrations WHERE version = ?1",
                [migration.version],
                |row| row.get(0),
            )
            .optional()?;
        if applied.is_some() {
            continue;
        }

        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql)?;
        tx.execute(
            "INSERT INTO schema_migrations(version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![
                migration.version,
                migration.name,
                Timestamp::now().to_rfc3339_millis()
            ],
        )?;
        tx.commit()?;
        info!(version = migration.version, name = migration.name, "schema migration applied");
    }
    Ok(())
}

/// Returns the highest applied migration version (0 for a fresh database).
pub fn applied_version(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
}

//! SQLite persistence adapter.
//!
//! [`SqliteStore`] implements both [`reconciler::MappingStore`] and
//! [`reconciler::RunLock`] over one database file.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`schema`] | Versioned migrations recorded in `schema_migrations` |
//! | [`store`] | [`SqliteStore`] |
//!
//! Timestamps are stored as fixed-width RFC 3339 text (millisecond
//! precision, UTC), so text comparison orders them in time.

pub mod schema;
pub mod store;

pub use store::SqliteStore;

//! Incident reconciliation domain.
//!
//! Keeps a case-system record and an issue-tracker record mirrored for a
//! support incident until the tracker side closes it. This crate owns the
//! mapping state machine, the four synchronization operations, ingestion, and
//! the pipeline orchestrator. Adapter crates implement the traits in [`ports`];
//! they never add domain rules.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** No I/O dependencies. The engine only
//! talks to the outside world through `Arc<dyn Port>` handles.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`TenantId`, `CaseKey`, `TrackerKey`, ...) |
//! | [`types`] | Shared value types (`Timestamp`) |
//! | [`errors`] | Error taxonomy and retry policy |
//! | [`mapping`] | `IncidentMapping` and its state machine |
//! | [`records`] | Remote records exchanged through the ports |
//! | [`ports`] | Gateway, store, and run-lock traits |
//! | [`settings`] | `SyncSettings` |
//! | [`content`] | Content mapping helpers (titles, mail rendering, HTML flattening) |
//! | [`engine`] | `ReconciliationEngine`: detect, push, pull, finalize |
//! | [`ingest`] | Case-event ingestion |
//! | [`orchestrator`] | One pipeline pass in fixed phase order |
//! | [`memory`] | In-memory `MappingStore` |

pub mod content;
pub mod engine;
pub mod errors;
pub mod identifiers;
pub mod ingest;
pub mod mapping;
pub mod memory;
pub mod orchestrator;
pub mod ports;
pub mod records;
pub mod settings;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use engine::{PhaseReport, ReconciliationEngine};
pub use errors::{
    ConfigurationError, GatewayError, IngestError, RetryPolicy, StoreError, SyncError,
    ValidationError,
};
pub use identifiers::{
    CaseAttachmentId, CaseKey, CommentId, MappingId, PipelineRunId, TenantId, TrackerAttachmentId,
    TrackerKey, MAX_CASE_KEY_LEN,
};
pub use ingest::Ingestor;
pub use mapping::{IncidentMapping, MappingStatus, UnknownStatus};
pub use memory::InMemoryMappingStore;
pub use orchestrator::{PipelineReport, SynchronizationOrchestrator};
pub use ports::{
    CaseSystemGateway, IssueTrackerGateway, LockLease, MappingStore, NotificationGateway, RunLock,
};
pub use records::{
    AttachmentContent, CaseAttachment, CasePatch, CaseRecord, CommentAuthor, InboundMail,
    IssuePatch, NamedFile, NewIssue, TrackerAttachment, TrackerComment, TrackerIssue, Transition,
};
pub use settings::SyncSettings;
pub use types::Timestamp;

//! Port traits: everything the engine needs from the outside world.
//!
//! Adapter crates implement these; the engine only ever holds
//! `Arc<dyn Trait>`. All traits are dyn-compatible through `async-trait`.
//!
//! A missing record is an expected state for lookups that return `Option`
//! (`get_issue`, `get_case`, ...). [`GatewayError::NotFound`] is reserved for
//! writes against a record that vanished.

use std::time::Duration;

use async_trait::async_trait;

use crate::records::{
    AttachmentContent, CaseAttachment, CasePatch, CaseRecord, InboundMail, IssuePatch, NamedFile,
    NewIssue, Transition, TrackerIssue,
};
use crate::{
    CaseAttachmentId, CaseKey, CommentId, GatewayError, IncidentMapping, MappingId, MappingStatus,
    StoreError, TenantId, Timestamp, TrackerAttachmentId, TrackerKey,
};

// ---------------------------------------------------------------------------
// Case system
// ---------------------------------------------------------------------------

/// The case-management system of record.
#[async_trait]
pub trait CaseSystemGateway: Send + Sync {
    /// Fetches the case headline. `None` if the case does not exist.
    async fn get_case(&self, key: &CaseKey) -> Result<Option<CaseRecord>, GatewayError>;

    /// Fetches the raw problem description (may contain HTML).
    async fn get_problem_text(&self, key: &CaseKey) -> Result<Option<String>, GatewayError>;

    /// Fetches the raw internal notes (may contain HTML).
    async fn get_internal_notes(&self, key: &CaseKey) -> Result<Option<String>, GatewayError>;

    /// Lists the attachments stored on the case.
    async fn get_attachments(&self, key: &CaseKey) -> Result<Vec<CaseAttachment>, GatewayError>;

    /// Fetches one attachment's binary content.
    async fn get_attachment_content(
        &self,
        key: &CaseKey,
        attachment_id: &CaseAttachmentId,
    ) -> Result<AttachmentContent, GatewayError>;

    /// Lists the mails received on the case, with content.
    async fn get_inbound_mail(&self, key: &CaseKey) -> Result<Vec<InboundMail>, GatewayError>;

    /// Applies a write to the case.
    async fn update_case(&self, patch: CasePatch) -> Result<(), GatewayError>;

    /// Stores a new attachment on the case.
    async fn create_attachment(&self, key: &CaseKey, file: &NamedFile) -> Result<(), GatewayError>;
}

// ---------------------------------------------------------------------------
// Issue tracker
// ---------------------------------------------------------------------------

/// The issue tracker that mirrors each case.
#[async_trait]
pub trait IssueTrackerGateway: Send + Sync {
    /// Fetches an issue with its comments and attachments. `None` if missing.
    async fn get_issue(&self, key: &TrackerKey) -> Result<Option<TrackerIssue>, GatewayError>;

    /// Creates an issue in the configured project and returns its key.
    async fn create_issue(&self, issue: NewIssue) -> Result<TrackerKey, GatewayError>;

    /// Overwrites summary and description of an issue.
    async fn update_issue(&self, patch: IssuePatch) -> Result<(), GatewayError>;

    /// Lists the workflow transitions currently available on an issue.
    async fn get_transitions(&self, key: &TrackerKey) -> Result<Vec<Transition>, GatewayError>;

    /// Performs a workflow transition.
    async fn perform_transition(
        &self,
        key: &TrackerKey,
        transition: &Transition,
    ) -> Result<(), GatewayError>;

    /// Adds a comment authored by the engine's own identity.
    async fn add_comment(&self, key: &TrackerKey, body: &str) -> Result<(), GatewayError>;

    /// Deletes a comment.
    async fn delete_comment(&self, key: &TrackerKey, comment_id: &CommentId)
        -> Result<(), GatewayError>;

    /// Uploads an attachment.
    async fn add_attachment(&self, key: &TrackerKey, file: &NamedFile) -> Result<(), GatewayError>;

    /// Deletes an attachment.
    async fn delete_attachment(&self, attachment_id: &TrackerAttachmentId)
        -> Result<(), GatewayError>;

    /// Downloads attachment content from the URI reported on the issue.
    async fn get_attachment_content(&self, content_uri: &str) -> Result<Vec<u8>, GatewayError>;

    /// Base URL used to build human-facing issue links.
    fn browse_url(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Outbound notification channel (e.g. a team chat).
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// Sends `message` on behalf of `tenant_id`.
    async fn notify(&self, tenant_id: &TenantId, message: &str) -> Result<(), GatewayError>;
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Typed access to persisted incident mappings.
#[async_trait]
pub trait MappingStore: Send + Sync {
    /// Looks up the mapping for a case within a tenant.
    async fn find_by_tenant_and_case_key(
        &self,
        tenant_id: &TenantId,
        case_key: &CaseKey,
    ) -> Result<Option<IncidentMapping>, StoreError>;

    /// Lists every mapping in `status`.
    async fn find_by_status(&self, status: MappingStatus)
        -> Result<Vec<IncidentMapping>, StoreError>;

    /// Lists every mapping that currently has a tracker key, regardless of status.
    async fn find_all_with_tracker_key(&self) -> Result<Vec<IncidentMapping>, StoreError>;

    /// Lists every mapping.
    async fn find_all(&self) -> Result<Vec<IncidentMapping>, StoreError>;

    /// Inserts or updates a mapping by id and returns the stored row.
    ///
    /// Sets `created_at` on insert and `modified_at` on update. Rejects a write
    /// that would break `(tenant_id, case_key)` or non-null `tracker_key`
    /// uniqueness with [`StoreError::Conflict`].
    async fn upsert(&self, mapping: IncidentMapping) -> Result<IncidentMapping, StoreError>;

    /// Hard-deletes a mapping. Deleting a missing id is not an error.
    async fn delete(&self, id: MappingId) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// Run lock
// ---------------------------------------------------------------------------

/// A held lease on a named run lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockLease {
    /// Lock name.
    pub name: String,
    /// Holder that acquired the lease.
    pub holder: String,
    /// When the lease expires and may be taken over.
    pub locked_until: Timestamp,
}

/// Cluster-wide mutual exclusion for pipeline runs.
///
/// A lease expires after `lock_at_most_for`; an expired lease may be taken
/// over, which recovers from a crashed run.
#[async_trait]
pub trait RunLock: Send + Sync {
    /// Takes the lock, or returns `None` if another holder has a live lease.
    async fn try_acquire(
        &self,
        name: &str,
        holder: &str,
        lock_at_most_for: Duration,
    ) -> Result<Option<LockLease>, StoreError>;

    /// Releases a lease held by `lease.holder`.
    async fn release(&self, lease: &LockLease) -> Result<(), StoreError>;
}

//! The incident mapping and its state machine.
//!
//! ```text
//!            ingest                 push (4.3)
//!   (new) ──────────► CaseChanged ─────────────► Mirrored
//!                        ▲  ▲                     │   ▲
//!          tracker issue │  │ ingest              │   │ pull (4.4)
//!          missing       │  └─────────────────────┤   │
//!          (self-heal)   │             detect     ▼   │
//!                        └──────────────────── TrackerChanged
//!
//!   any state with a closed tracker status ──► deleted (finalize)
//! ```
//!
//! `status` decides which operation may touch the mapping next. The transition
//! methods below are the only writers of `status`, `tracker_key`, and the two
//! watermarks; the engine calls them and then persists the result.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{CaseKey, MappingId, TenantId, Timestamp, TrackerKey};

/// Which side is the source of truth for the next synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MappingStatus {
    /// The case system changed; the tracker must be created or refreshed.
    CaseChanged,
    /// The tracker changed; its edits must be pulled into the case system.
    TrackerChanged,
    /// Both sides are consistent.
    Mirrored,
}

impl MappingStatus {
    /// All statuses, in state-machine order.
    pub const ALL: [MappingStatus; 3] = [
        MappingStatus::CaseChanged,
        MappingStatus::TrackerChanged,
        MappingStatus::Mirrored,
    ];

    /// Stable storage representation.
    pub fn as_str(self) -> &'static str {
        match self {
            MappingStatus::CaseChanged => "CASE_CHANGED",
            MappingStatus::TrackerChanged => "TRACKER_CHANGED",
            MappingStatus::Mirrored => "MIRRORED",
        }
    }
}

impl std::fmt::Display for MappingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a stored status string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown mapping status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for MappingStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MappingStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// The persisted pairing of a case-system record with its tracker issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentMapping {
    /// Opaque identity, assigned when the mapping is first created.
    pub id: MappingId,
    /// Partitioning key; all lookups are scoped by it.
    pub tenant_id: TenantId,
    /// Case-system record key. Unique per tenant.
    pub case_key: CaseKey,
    /// Tracker issue key. `None` while creation is pending.
    pub tracker_key: Option<TrackerKey>,
    /// Current state.
    pub status: MappingStatus,
    /// Set by the store on insert.
    pub created_at: Option<Timestamp>,
    /// Set by the store on update.
    pub modified_at: Option<Timestamp>,
    /// When the tracker was last confirmed consistent with the case.
    pub last_synced_to_tracker: Option<Timestamp>,
    /// When the case was last confirmed consistent with the tracker.
    pub last_synced_to_case: Option<Timestamp>,
}

impl IncidentMapping {
    /// Creates a fresh, unsaved mapping in [`MappingStatus::CaseChanged`].
    pub fn new(tenant_id: TenantId, case_key: CaseKey) -> Self {
        Self {
            id: MappingId::new_random(),
            tenant_id,
            case_key,
            tracker_key: None,
            status: MappingStatus::CaseChanged,
            created_at: None,
            modified_at: None,
            last_synced_to_tracker: None,
            last_synced_to_case: None,
        }
    }

    /// Applies a case-originated change signal.
    ///
    /// Only a `Mirrored` mapping moves to `CaseChanged`. A pending tracker-side
    /// change is never overwritten, so neither direction can starve the other.
    /// Returns `true` if the status changed.
    pub fn signal_case_change(&mut self) -> bool {
        if self.status == MappingStatus::Mirrored {
            self.status = MappingStatus::CaseChanged;
            true
        } else {
            false
        }
    }

    /// Resets the mapping after its tracker issue was found missing.
    ///
    /// The next push recreates the issue.
    pub fn self_heal(&mut self) {
        self.tracker_key = None;
        self.last_synced_to_tracker = None;
        self.status = MappingStatus::CaseChanged;
    }

    /// Records the key of a freshly created tracker issue while the rest of the
    /// creation is still in flight. Status stays `CaseChanged`, so an
    /// interrupted creation resumes through the update path on the next push.
    pub fn checkpoint_tracker_key(&mut self, tracker_key: TrackerKey) {
        self.tracker_key = Some(tracker_key);
        self.status = MappingStatus::CaseChanged;
    }

    /// Whether a tracker issue was created but its creation never completed.
    /// Self-heal clears both fields, so only a checkpointed creation matches.
    pub fn creation_pending(&self) -> bool {
        self.tracker_key.is_some() && self.last_synced_to_tracker.is_none()
    }

    /// Records the case as mirrored into `tracker_key` at `now`.
    pub fn mark_mirrored_to_tracker(&mut self, tracker_key: TrackerKey, now: Timestamp) {
        self.tracker_key = Some(tracker_key);
        self.status = MappingStatus::Mirrored;
        self.last_synced_to_tracker = Some(now);
    }

    /// Records the tracker as mirrored back into the case at `now`.
    ///
    /// Ignored when the mapping has no tracker issue (it was self-healed in the
    /// same pass); the pending recreation must not be masked.
    pub fn mark_mirrored_to_case(&mut self, now: Timestamp) {
        if self.tracker_key.is_none() {
            return;
        }
        self.status = MappingStatus::Mirrored;
        self.last_synced_to_case = Some(now);
    }

    /// Flags a tracker-originated change.
    pub fn mark_tracker_changed(&mut self) {
        if self.tracker_key.is_some() {
            self.status = MappingStatus::TrackerChanged;
        }
    }

    /// Whether the tracker's last-modified time is past the tracker watermark
    /// by more than `clock_skew_seconds`.
    ///
    /// A tracker with no modification time never counts as changed; a mapping
    /// that was never synced counts every modification as a change.
    pub fn tracker_edited_since_sync(
        &self,
        tracker_updated: Option<Timestamp>,
        clock_skew_seconds: u32,
    ) -> bool {
        match (tracker_updated, self.last_synced_to_tracker) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(updated), Some(synced)) => {
                updated > synced.plus_seconds(i64::from(clock_skew_seconds))
            }
        }
    }

    /// Whether a tracker comment created at `created` is newer than the case
    /// watermark plus `clock_skew_seconds`.
    pub fn comment_is_new(&self, created: Timestamp, clock_skew_seconds: u32) -> bool {
        match self.last_synced_to_case {
            None => true,
            Some(synced) => created > synced.plus_seconds(i64::from(clock_skew_seconds)),
        }
    }
}

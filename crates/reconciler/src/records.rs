//! Records exchanged with the case system and the tracker through the ports.
//!
//! These are the domain's view of remote data: only the fields the engine reads
//! or writes. Adapters translate their wire payloads to and from these shapes.

use serde::{Deserialize, Serialize};

use crate::{CaseAttachmentId, CaseKey, CommentId, Timestamp, TrackerAttachmentId, TrackerKey};

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

/// A named binary file moved between the two systems.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedFile {
    /// File name including extension (e.g. `"screenshot.png"`).
    pub file_name: String,
    /// Raw file content.
    pub content: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Case system
// ---------------------------------------------------------------------------

/// Headline data of a case-system record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRecord {
    /// Short summary (the case's description line), if set.
    pub summary: Option<String>,
}

/// An entry in a case's attachment list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseAttachment {
    /// Identifier used to fetch the attachment's content.
    pub id: CaseAttachmentId,
    /// File name as stored in the case system (may lack an extension).
    pub file_name: String,
}

/// Binary content of a case attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentContent {
    /// Raw bytes.
    pub bytes: Vec<u8>,
    /// MIME type reported by the case system (e.g. `"image/png"`).
    pub content_type: Option<String>,
}

/// An inbound mail received on a case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMail {
    /// Case-system mail id.
    pub id: String,
    /// Sender address.
    pub from: Option<String>,
    /// Recipient address.
    pub to: Option<String>,
    /// Reply-to address.
    pub reply_to: Option<String>,
    /// Send date exactly as reported by the case system.
    pub send_date: Option<String>,
    /// Subject line.
    pub subject: Option<String>,
    /// Mail body (may contain HTML).
    pub body: Option<String>,
    /// Number of attachments the case system reports for this mail.
    pub number_of_attachments: u32,
    /// Attachment files delivered with the mail, when the gateway provides them.
    pub attachments: Vec<NamedFile>,
}

/// A write against a case-system record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CasePatch {
    /// Append a note to the case's internal notes.
    AppendInternalNote {
        /// Target case.
        case_key: CaseKey,
        /// Note text.
        text: String,
    },
    /// Overwrite the case's problem description.
    ReplaceProblemText {
        /// Target case.
        case_key: CaseKey,
        /// New problem text.
        text: String,
    },
    /// Clear the responsible person and hand the case to a group.
    ReassignResponsibleGroup {
        /// Target case.
        case_key: CaseKey,
        /// Group that takes over responsibility.
        group: String,
    },
}

impl CasePatch {
    /// Returns the case this patch applies to.
    pub fn case_key(&self) -> &CaseKey {
        match self {
            CasePatch::AppendInternalNote { case_key, .. }
            | CasePatch::ReplaceProblemText { case_key, .. }
            | CasePatch::ReassignResponsibleGroup { case_key, .. } => case_key,
        }
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Author of a tracker comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentAuthor {
    /// Login name, compared against the engine's own identity.
    pub name: String,
    /// Human-readable name, used when importing the comment.
    pub display_name: String,
}

/// A comment on a tracker issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerComment {
    /// Comment identifier.
    pub id: CommentId,
    /// Author, when the tracker reports one.
    pub author: Option<CommentAuthor>,
    /// Comment text.
    pub body: String,
    /// Creation time.
    pub created: Timestamp,
}

/// An attachment on a tracker issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerAttachment {
    /// Attachment identifier.
    pub id: TrackerAttachmentId,
    /// File name.
    pub file_name: String,
    /// URI from which the binary content can be fetched.
    pub content_uri: String,
}

/// Snapshot of a tracker issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerIssue {
    /// Issue key.
    pub key: TrackerKey,
    /// Issue title.
    pub summary: String,
    /// Issue description.
    pub description: Option<String>,
    /// Workflow status name (e.g. `"To Do"`, `"Done"`).
    pub status_name: String,
    /// Tracker-side last-modified time.
    pub updated: Option<Timestamp>,
    /// All comments on the issue.
    pub comments: Vec<TrackerComment>,
    /// All attachments on the issue.
    pub attachments: Vec<TrackerAttachment>,
}

/// Fields for creating a tracker issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIssue {
    /// Issue type name (e.g. `"Bug"`).
    pub issue_type: String,
    /// Labels applied at creation.
    pub labels: Vec<String>,
    /// Issue title.
    pub summary: String,
    /// Issue description.
    pub description: Option<String>,
}

/// Fields to overwrite on an existing tracker issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuePatch {
    /// Issue to update.
    pub key: TrackerKey,
    /// New title.
    pub summary: String,
    /// New description.
    pub description: Option<String>,
}

/// A workflow transition available on a tracker issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// Tracker-assigned transition id.
    pub id: String,
    /// Transition name (e.g. `"To Do"`).
    pub name: String,
}

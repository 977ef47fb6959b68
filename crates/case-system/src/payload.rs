//! The case system's generic payload and its mapping to domain records.
//!
//! Every endpoint speaks the same envelope:
//!
//! ```json
//! {
//!   "Type": "Case",
//!   "Data": { "Id": "POB-1", "Description": "..." },
//!   "Memo": { "Problem": { "Extension": ".html", "HandleSeparators": true, "Memo": "..." } },
//!   "Links": [ { "Relation": "scan.png", "Href": "/case/POB-1/attachments/17" } ]
//! }
//! ```

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reconciler::content::file_extension;
use reconciler::{CaseAttachment, CaseAttachmentId, CasePatch, InboundMail, NamedFile};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Field names
// ---------------------------------------------------------------------------

const CASE_TYPE: &str = "Case";
const BINARY_DATA_TYPE: &str = "BinaryData";

const ID: &str = "Id";
const DESCRIPTION: &str = "Description";
const RESPONSIBLE: &str = "Responsible";
const RESPONSIBLE_GROUP: &str = "ResponsibleGroup";
const FILE_TYPE: &str = "FileType";
const ORIGINAL_FILE_NAME: &str = "OriginalFileName";
const FILE_DATA: &str = "FileData";

const MAIL_FROM: &str = "MailFrom";
const MAIL_TO: &str = "MailTo";
const MAIL_REPLY_TO: &str = "ReplyTo";
const MAIL_SEND_DATE: &str = "SendDate";
const MAIL_SUBJECT: &str = "Subject";
const NUMBER_OF_ATTACHMENTS: &str = "NumberOfAttachments";

/// Memo holding the problem description.
pub const PROBLEM_MEMO: &str = "Problem";
/// Memo holding the internal notes.
pub const INTERNAL_NOTES_MEMO: &str = "CaseInternalNotesCustom";
/// Memo holding a mail body.
pub const MAIL_MEMO: &str = "Mail";

const MEMO_EXTENSION: &str = ".html";

// ---------------------------------------------------------------------------
// Wire model
// ---------------------------------------------------------------------------

/// The case system's request/response envelope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PobPayload {
    /// Record type (`"Case"`, `"BinaryData"`, ...).
    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Flat attribute map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,

    /// Named rich-text memos.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<BTreeMap<String, PobMemo>>,

    /// Related resources (attachments are listed here).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<PobLink>>,
}

/// A rich-text memo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PobMemo {
    /// Content format, `".html"` for everything this adapter writes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    /// Whether the case system should split the text into separate entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle_separators: Option<bool>,
    /// The memo text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
}

/// A link to a related resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PobLink {
    /// Relation name; the file name for attachment links.
    #[serde(default)]
    pub relation: Option<String>,
    /// Resource path; the last segment is the attachment id.
    #[serde(default)]
    pub href: Option<String>,
}

// ---------------------------------------------------------------------------
// Outbound payloads
// ---------------------------------------------------------------------------

fn case_data(case_id: &str) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert(ID.into(), Value::String(case_id.to_string()));
    data
}

fn html_memo(name: &str, text: &str) -> BTreeMap<String, PobMemo> {
    BTreeMap::from([(
        name.to_string(),
        PobMemo {
            extension: Some(MEMO_EXTENSION.to_string()),
            handle_separators: Some(true),
            memo: Some(text.to_string()),
        },
    )])
}

impl PobPayload {
    /// Builds the `POST case` body for a domain patch.
    pub fn from_patch(patch: &CasePatch) -> Self {
        let mut data = case_data(patch.case_key().as_str());
        let memo = match patch {
            CasePatch::AppendInternalNote { text, .. } => Some(html_memo(INTERNAL_NOTES_MEMO, text)),
            CasePatch::ReplaceProblemText { text, .. } => Some(html_memo(PROBLEM_MEMO, text)),
            CasePatch::ReassignResponsibleGroup { group, .. } => {
                data.insert(RESPONSIBLE.into(), Value::Null);
                data.insert(RESPONSIBLE_GROUP.into(), Value::String(group.clone()));
                None
            }
        };
        Self {
            kind: Some(CASE_TYPE.to_string()),
            data: Some(data),
            memo,
            links: None,
        }
    }

    /// Builds the `PUT case/{id}/attachments` body for a file.
    pub fn from_file(file: &NamedFile) -> Self {
        let mut data = Map::new();
        data.insert(
            FILE_TYPE.into(),
            Value::String(file_extension(&file.file_name)),
        );
        data.insert(
            ORIGINAL_FILE_NAME.into(),
            Value::String(file.file_name.clone()),
        );
        data.insert(
            FILE_DATA.into(),
            Value::String(format!(
                "data:{};base64,{}",
                file.file_name,
                STANDARD.encode(&file.content)
            )),
        );
        Self {
            kind: Some(BINARY_DATA_TYPE.to_string()),
            data: Some(data),
            memo: None,
            links: None,
        }
    }

    // -----------------------------------------------------------------------
    // Inbound extraction
    // -----------------------------------------------------------------------

    /// String value of a data attribute. Numbers are rendered as text.
    pub fn data_str(&self, key: &str) -> Option<String> {
        match self.data.as_ref()?.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// The case summary line.
    pub fn description(&self) -> Option<String> {
        self.data_str(DESCRIPTION)
    }

    /// The `Id` data attribute.
    pub fn id(&self) -> Option<String> {
        self.data_str(ID)
    }

    /// Text of the memo called `name`.
    pub fn memo_text(&self, name: &str) -> Option<String> {
        self.memo.as_ref()?.get(name)?.memo.clone()
    }

    /// Attachment entries listed in `Links`. Links without a relation or href
    /// are not attachments and are skipped.
    pub fn attachments(&self) -> Vec<CaseAttachment> {
        self.links
            .iter()
            .flatten()
            .filter_map(|link| {
                let file_name = link.relation.as_deref().filter(|r| !r.is_empty())?;
                let href = link.href.as_deref().filter(|h| !h.is_empty())?;
                let id = href.rsplit('/').next().unwrap_or(href);
                Some(CaseAttachment {
                    id: CaseAttachmentId::new(id)?,
                    file_name: file_name.to_string(),
                })
            })
            .collect()
    }

    /// Reads a mail record. The body is the raw `Mail` memo.
    pub fn to_mail(&self) -> InboundMail {
        InboundMail {
            id: self.id().unwrap_or_default(),
            from: self.data_str(MAIL_FROM),
            to: self.data_str(MAIL_TO),
            reply_to: self.data_str(MAIL_REPLY_TO),
            send_date: self.data_str(MAIL_SEND_DATE),
            subject: self.data_str(MAIL_SUBJECT),
            body: self.memo_text(MAIL_MEMO),
            number_of_attachments: self
                .data_str(NUMBER_OF_ATTACHMENTS)
                .and_then(|n| n.trim().parse().ok())
                .unwrap_or(0),
            attachments: Vec::new(),
        }
    }
}

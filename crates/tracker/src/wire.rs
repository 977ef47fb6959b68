//! Tracker REST (v2) request and response bodies.

use chrono::{DateTime, Utc};
use reconciler::{
    CommentAuthor, CommentId, NewIssue, Timestamp, TrackerAttachment, TrackerAttachmentId,
    TrackerComment, TrackerIssue, TrackerKey, Transition,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Fields requested when reading an issue.
pub const ISSUE_FIELDS: &str = "summary,description,status,updated,comment,attachment";

/// Parses the tracker's timestamp format (`2026-03-01T10:15:30.000+0100`),
/// falling back to RFC 3339.
pub fn parse_timestamp(value: &str) -> Option<Timestamp> {
    DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .ok()
        .map(|dt| Timestamp::from_utc(dt.with_timezone(&Utc)))
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct NamedRef {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserWire {
    #[serde(default, alias = "accountId")]
    pub name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentWire {
    pub id: String,
    #[serde(default)]
    pub author: Option<UserWire>,
    #[serde(default)]
    pub body: Option<String>,
    pub created: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentPage {
    #[serde(default)]
    pub comments: Vec<CommentWire>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentWire {
    pub id: String,
    pub filename: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueFields {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<NamedRef>,
    #[serde(default)]
    pub updated: Option<String>,
    #[serde(default)]
    pub comment: Option<CommentPage>,
    #[serde(default)]
    pub attachment: Option<Vec<AttachmentWire>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueWire {
    pub key: String,
    pub fields: IssueFields,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedIssue {
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransitionWire {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransitionsWire {
    #[serde(default)]
    pub transitions: Vec<TransitionWire>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IssueTypeWire {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectWire {
    #[serde(default)]
    pub issue_types: Vec<IssueTypeWire>,
}

/// Why an issue response could not be mapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidIssue(pub String);

impl IssueWire {
    /// Maps the response to the domain snapshot. Comments whose timestamp
    /// cannot be read are an error: dropping them could lose a tracker edit.
    pub fn into_domain(self) -> Result<TrackerIssue, InvalidIssue> {
        let key = TrackerKey::new(self.key.clone())
            .ok_or_else(|| InvalidIssue("issue without key".into()))?;
        let fields = self.fields;

        let comments = fields
            .comment
            .unwrap_or_default()
            .comments
            .into_iter()
            .map(|c| {
                let created = parse_timestamp(&c.created).ok_or_else(|| {
                    InvalidIssue(format!("comment {} has unreadable created '{}'", c.id, c.created))
                })?;
                let id = CommentId::new(c.id.clone())
                    .ok_or_else(|| InvalidIssue("comment without id".into()))?;
                Ok(TrackerComment {
                    id,
                    author: c.author.map(|a| {
                        let name = a.name.unwrap_or_default();
                        CommentAuthor {
                            display_name: a.display_name.unwrap_or_else(|| name.clone()),
                            name,
                        }
                    }),
                    body: c.body.unwrap_or_default(),
                    created,
                })
            })
            .collect::<Result<Vec<_>, InvalidIssue>>()?;

        let attachments = fields
            .attachment
            .unwrap_or_default()
            .into_iter()
            .filter_map(|a| {
                Some(TrackerAttachment {
                    id: TrackerAttachmentId::new(a.id)?,
                    file_name: a.filename,
                    content_uri: a.content,
                })
            })
            .collect();

        Ok(TrackerIssue {
            key,
            summary: fields.summary.unwrap_or_default(),
            description: fields.description,
            status_name: fields.status.map(|s| s.name).unwrap_or_default(),
            updated: fields.updated.as_deref().and_then(parse_timestamp),
            comments,
            attachments,
        })
    }
}

impl From<TransitionWire> for Transition {
    fn from(wire: TransitionWire) -> Self {
        Transition {
            id: wire.id,
            name: wire.name,
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Body of `POST issue`. `issue_type_id` wins over the type name when known.
pub fn create_issue_body(project_key: &str, issue_type_id: Option<&str>, issue: &NewIssue) -> Value {
    let issue_type = match issue_type_id {
        Some(id) => json!({ "id": id }),
        None => json!({ "name": issue.issue_type }),
    };
    json!({
        "fields": {
            "project": { "key": project_key },
            "issuetype": issue_type,
            "summary": issue.summary,
            "description": issue.description,
            "labels": issue.labels,
        }
    })
}

/// Body of `PUT issue/{key}`.
pub fn update_issue_body(summary: &str, description: Option<&str>) -> Value {
    json!({ "fields": { "summary": summary, "description": description } })
}

#[derive(Debug, Serialize)]
pub struct CommentBody<'a> {
    pub body: &'a str,
}

/// Body of `POST issue/{key}/transitions`.
pub fn transition_body(transition: &Transition) -> Value {
    json!({ "transition": { "id": transition.id } })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn tracker_timestamps_parse_with_offset() {
        let parsed = parse_timestamp("2026-03-01T10:15:30.000+0100").unwrap();
        assert_eq!(
            parsed,
            Timestamp::from_utc(Utc.with_ymd_and_hms(2026, 3, 1, 9, 15, 30).unwrap())
        );
        assert_eq!(
            parse_timestamp("2026-03-01T09:15:30Z"),
            Some(parsed)
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn issue_response_maps_to_snapshot() {
        let wire: IssueWire = serde_json::from_value(json!({
            "key": "JIR-9",
            "fields": {
                "summary": "Supportärende POB-1 (Printer)",
                "description": "Smoke",
                "status": { "name": "To Do" },
                "updated": "2026-03-01T10:15:30.000+0000",
                "comment": { "comments": [{
                    "id": "100",
                    "author": { "name": "alice", "displayName": "Alice Agent" },
                    "body": "Looking",
                    "created": "2026-03-01T10:00:00.000+0000"
                }]},
                "attachment": [{
                    "id": "7",
                    "filename": "log.txt",
                    "content": "https://tracker.example.com/secure/attachment/7/log.txt"
                }]
            }
        }))
        .unwrap();

        let issue = wire.into_domain().unwrap();
        assert_eq!(issue.key.as_str(), "JIR-9");
        assert_eq!(issue.status_name, "To Do");
        assert_eq!(issue.description.as_deref(), Some("Smoke"));
        assert!(issue.updated.is_some());
        assert_eq!(
            issue.comments[0].author,
            Some(CommentAuthor {
                name: "alice".into(),
                display_name: "Alice Agent".into(),
            })
        );
        assert_eq!(issue.attachments[0].file_name, "log.txt");
    }

    #[test]
    fn sparse_issue_response_uses_defaults() {
        let wire: IssueWire =
            serde_json::from_value(json!({ "key": "JIR-9", "fields": {} })).unwrap();
        let issue = wire.into_domain().unwrap();
        assert!(issue.comments.is_empty());
        assert!(issue.attachments.is_empty());
        assert_eq!(issue.updated, None);
    }

    #[test]
    fn unreadable_comment_timestamp_is_rejected() {
        let wire: IssueWire = serde_json::from_value(json!({
            "key": "JIR-9",
            "fields": { "comment": { "comments": [{ "id": "1", "created": "soon" }] } }
        }))
        .unwrap();
        assert!(wire.into_domain().is_err());
    }

    #[test]
    fn create_body_prefers_issue_type_id() {
        let issue = NewIssue {
            issue_type: "Bug".into(),
            labels: vec!["support-ticket".into()],
            summary: "Supportärende POB-1 ()".into(),
            description: None,
        };
        assert_eq!(
            create_issue_body("SUP", Some("10004"), &issue),
            json!({
                "fields": {
                    "project": { "key": "SUP" },
                    "issuetype": { "id": "10004" },
                    "summary": "Supportärende POB-1 ()",
                    "description": null,
                    "labels": ["support-ticket"]
                }
            })
        );
        assert_eq!(
            create_issue_body("SUP", None, &issue)["fields"]["issuetype"],
            json!({ "name": "Bug" })
        );
    }
}

//! `IssueTrackerGateway` over the tracker's REST (v2) API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reconciler::{
    CommentId, ConfigurationError, GatewayError, IssuePatch, IssueTrackerGateway, NamedFile,
    NewIssue, TrackerAttachmentId, TrackerIssue, TrackerKey, Transition,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::cache::MetadataCache;
use crate::wire::{
    create_issue_body, transition_body, update_issue_body, CommentBody, CreatedIssue, IssueWire,
    ProjectWire, TransitionsWire, ISSUE_FIELDS,
};

const SYSTEM: &str = "tracker";
const API_PREFIX: &str = "rest/api/2";

fn default_metadata_cache_ttl_seconds() -> u64 {
    3600
}

fn default_timeout_seconds() -> u64 {
    30
}

/// Connection settings, deserialised from the `[tracker]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Base URL of the tracker; also the base of browse links.
    pub url: String,
    /// Account the engine authenticates and writes as.
    pub username: String,
    /// Password or API token for `username`.
    #[serde(default)]
    pub password: String,
    /// Project new issues are created in.
    pub project_key: String,
    /// Lifetime of cached issue-type and transition lookups.
    #[serde(default = "default_metadata_cache_ttl_seconds")]
    pub metadata_cache_ttl_seconds: u64,
    /// Whole-request timeout.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl TrackerConfig {
    /// Checks the values the client cannot work without.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let required = [
            ("tracker.url", &self.url),
            ("tracker.username", &self.username),
            ("tracker.password", &self.password),
            ("tracker.project_key", &self.project_key),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigurationError::new(format!("{name} must be set")));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

pub(crate) fn status_error(status: StatusCode, resource: &str, body: String) -> GatewayError {
    if status == StatusCode::NOT_FOUND {
        GatewayError::NotFound {
            system: SYSTEM,
            resource: resource.to_string(),
        }
    } else if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        GatewayError::Transient {
            system: SYSTEM,
            message: format!("{resource}: HTTP {status}"),
        }
    } else {
        GatewayError::Rejected {
            system: SYSTEM,
            status: status.as_u16(),
            message: body,
        }
    }
}

fn transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_decode() {
        GatewayError::Decode {
            system: SYSTEM,
            message: err.to_string(),
        }
    } else {
        GatewayError::Transient {
            system: SYSTEM,
            message: err.to_string(),
        }
    }
}

fn decode_error(message: impl Into<String>) -> GatewayError {
    GatewayError::Decode {
        system: SYSTEM,
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the issue tracker.
///
/// Issue-type ids (per project) and available transitions (per issue) are
/// held in [`MetadataCache`]s owned by the client.
#[derive(Debug, Clone)]
pub struct TrackerClient {
    http: Client,
    base_url: String,
    username: String,
    password: String,
    project_key: String,
    issue_types: Arc<MetadataCache<Vec<(String, String)>>>,
    transitions: Arc<MetadataCache<Vec<Transition>>>,
}

impl TrackerClient {
    /// Builds a client from validated configuration.
    pub fn new(config: &TrackerConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|err| ConfigurationError::new(format!("tracker client: {err}")))?;
        let ttl = Duration::from_secs(config.metadata_cache_ttl_seconds);

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password.clone(),
            project_key: config.project_key.clone(),
            issue_types: Arc::new(MetadataCache::new(ttl)),
            transitions: Arc::new(MetadataCache::new(ttl)),
        })
    }

    /// Name the client writes as; comments by this author are the engine's own.
    pub fn identity(&self) -> &str {
        &self.username
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, API_PREFIX, path)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.username, Some(&self.password))
    }

    async fn send(&self, request: RequestBuilder, resource: &str) -> Result<Option<Response>, GatewayError> {
        let response = self.authed(request).send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(Some(response));
        }
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, resource, body))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, GatewayError> {
        match self.send(self.http.get(self.api_url(path)), path).await? {
            Some(response) => Ok(Some(response.json::<T>().await.map_err(transport_error)?)),
            None => Ok(None),
        }
    }

    /// Sends a request whose target must exist.
    async fn send_existing(&self, request: RequestBuilder, path: &str) -> Result<Response, GatewayError> {
        self.send(request, path)
            .await?
            .ok_or_else(|| status_error(StatusCode::NOT_FOUND, path, String::new()))
    }

    /// Resolves the id of `issue_type` in the configured project, if the
    /// project lists it.
    async fn issue_type_id(&self, issue_type: &str) -> Result<Option<String>, GatewayError> {
        let path = format!("project/{}", self.project_key);
        let types = self
            .issue_types
            .get_or_try_load(&self.project_key, || async move {
                let project: Option<ProjectWire> = self.get_json(&path).await?;
                Ok::<_, GatewayError>(
                    project
                        .map(|p| p.issue_types.into_iter().map(|t| (t.name, t.id)).collect())
                        .unwrap_or_default(),
                )
            })
            .await?;
        Ok(types
            .into_iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(issue_type))
            .map(|(_, id)| id))
    }
}

#[async_trait]
impl IssueTrackerGateway for TrackerClient {
    #[instrument(skip_all, fields(tracker_key = %key))]
    async fn get_issue(&self, key: &TrackerKey) -> Result<Option<TrackerIssue>, GatewayError> {
        let wire: Option<IssueWire> = self
            .get_json(&format!("issue/{key}?fields={ISSUE_FIELDS}"))
            .await?;
        wire.map(|w| w.into_domain().map_err(|invalid| decode_error(invalid.0)))
            .transpose()
    }

    #[instrument(skip_all, fields(project = %self.project_key))]
    async fn create_issue(&self, issue: NewIssue) -> Result<TrackerKey, GatewayError> {
        let type_id = self.issue_type_id(&issue.issue_type).await?;
        if type_id.is_none() {
            debug!(issue_type = %issue.issue_type, "issue type not listed on project, sending name");
        }
        let body = create_issue_body(&self.project_key, type_id.as_deref(), &issue);
        let created: CreatedIssue = self
            .send_existing(self.http.post(self.api_url("issue")).json(&body), "issue")
            .await?
            .json()
            .await
            .map_err(transport_error)?;
        TrackerKey::new(created.key).ok_or_else(|| decode_error("created issue without key"))
    }

    #[instrument(skip_all, fields(tracker_key = %patch.key))]
    async fn update_issue(&self, patch: IssuePatch) -> Result<(), GatewayError> {
        let path = format!("issue/{}", patch.key);
        let body = update_issue_body(&patch.summary, patch.description.as_deref());
        self.send_existing(self.http.put(self.api_url(&path)).json(&body), &path)
            .await
            .map(drop)
    }

    async fn get_transitions(&self, key: &TrackerKey) -> Result<Vec<Transition>, GatewayError> {
        let path = format!("issue/{key}/transitions");
        self.transitions
            .get_or_try_load(key.as_str(), || async move {
                let wire: TransitionsWire = self
                    .get_json(&path)
                    .await?
                    .ok_or_else(|| status_error(StatusCode::NOT_FOUND, &path, String::new()))?;
                Ok(wire.transitions.into_iter().map(Transition::from).collect())
            })
            .await
    }

    #[instrument(skip_all, fields(tracker_key = %key, transition = %transition.name))]
    async fn perform_transition(
        &self,
        key: &TrackerKey,
        transition: &Transition,
    ) -> Result<(), GatewayError> {
        let path = format!("issue/{key}/transitions");
        let body = transition_body(transition);
        let result = self
            .send_existing(self.http.post(self.api_url(&path)).json(&body), &path)
            .await
            .map(drop);
        // The available transitions depend on the status just left.
        self.transitions.invalidate(key.as_str()).await;
        result
    }

    async fn add_comment(&self, key: &TrackerKey, body: &str) -> Result<(), GatewayError> {
        let path = format!("issue/{key}/comment");
        self.send_existing(
            self.http.post(self.api_url(&path)).json(&CommentBody { body }),
            &path,
        )
        .await
        .map(drop)
    }

    async fn delete_comment(&self, key: &TrackerKey, comment_id: &CommentId) -> Result<(), GatewayError> {
        let path = format!("issue/{key}/comment/{comment_id}");
        self.send_existing(self.http.delete(self.api_url(&path)), &path)
            .await
            .map(drop)
    }

    #[instrument(skip_all, fields(tracker_key = %key, file_name = %file.file_name))]
    async fn add_attachment(&self, key: &TrackerKey, file: &NamedFile) -> Result<(), GatewayError> {
        let path = format!("issue/{key}/attachments");
        let part = Part::bytes(file.content.clone()).file_name(file.file_name.clone());
        let request = self
            .http
            .post(self.api_url(&path))
            .header("X-Atlassian-Token", "no-check")
            .multipart(Form::new().part("file", part));
        self.send_existing(request, &path).await.map(drop)
    }

    async fn delete_attachment(&self, attachment_id: &TrackerAttachmentId) -> Result<(), GatewayError> {
        let path = format!("attachment/{attachment_id}");
        self.send_existing(self.http.delete(self.api_url(&path)), &path)
            .await
            .map(drop)
    }

    async fn get_attachment_content(&self, content_uri: &str) -> Result<Vec<u8>, GatewayError> {
        let response = self.send_existing(self.http.get(content_uri), content_uri).await?;
        let bytes = response.bytes().await.map_err(transport_error)?;
        debug!(bytes = bytes.len(), "attachment downloaded");
        Ok(bytes.to_vec())
    }

    fn browse_url(&self) -> &str {
        &self.base_url
    }
}

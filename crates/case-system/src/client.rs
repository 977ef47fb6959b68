//! `CaseSystemGateway` over the case system's REST API.

use std::time::Duration;

use async_trait::async_trait;
use reconciler::{
    AttachmentContent, CaseAttachment, CaseAttachmentId, CaseKey, CasePatch, CaseRecord,
    CaseSystemGateway, ConfigurationError, GatewayError, InboundMail, NamedFile,
};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::payload::{PobPayload, INTERNAL_NOTES_MEMO, PROBLEM_MEMO};

const SYSTEM: &str = "case-system";

fn default_connect_timeout_seconds() -> u64 {
    5
}

fn default_read_timeout_seconds() -> u64 {
    60
}

/// Connection settings, deserialised from the `[case_system]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseSystemConfig {
    /// Base URL of the case REST API.
    pub url: String,
    /// Key sent verbatim in the `Authorization` header.
    #[serde(default)]
    pub api_key: String,
    /// TCP connect timeout.
    #[serde(default = "default_connect_timeout_seconds")]
    pub connect_timeout_seconds: u64,
    /// Whole-request timeout.
    #[serde(default = "default_read_timeout_seconds")]
    pub read_timeout_seconds: u64,
}

impl CaseSystemConfig {
    /// Checks the values the client cannot work without.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.url.trim().is_empty() {
            return Err(ConfigurationError::new("case_system.url must be set"));
        }
        if self.api_key.trim().is_empty() {
            return Err(ConfigurationError::new("case_system.api_key must be set"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Maps a non-success status to the gateway taxonomy.
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

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the case system.
#[derive(Debug, Clone)]
pub struct CaseSystemClient {
    http: Client,
    base_url: String,
}

impl CaseSystemClient {
    /// Builds a client from validated configuration.
    pub fn new(config: &CaseSystemConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;

        let mut auth = HeaderValue::from_str(&config.api_key)
            .map_err(|_| ConfigurationError::new("case_system.api_key is not a valid header value"))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let http = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .timeout(Duration::from_secs(config.read_timeout_seconds))
            .build()
            .map_err(|err| ConfigurationError::new(format!("case system client: {err}")))?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Sends a request and returns the response, or `None` on 404.
    async fn send(&self, request: RequestBuilder, resource: &str) -> Result<Option<Response>, GatewayError> {
        let response = request.send().await.map_err(transport_error)?;
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
        match self.send(self.http.get(self.url(path)), path).await? {
            Some(response) => Ok(Some(response.json::<T>().await.map_err(transport_error)?)),
            None => Ok(None),
        }
    }

    /// Sends a write; a 404 here means the target vanished.
    async fn write(&self, request: RequestBuilder, path: &str) -> Result<(), GatewayError> {
        match self.send(request, path).await? {
            Some(_) => Ok(()),
            None => Err(status_error(StatusCode::NOT_FOUND, path, String::new())),
        }
    }

    async fn get_mail(&self, mail_id: &str) -> Result<Option<InboundMail>, GatewayError> {
        let payload: Option<PobPayload> = self.get_json(&format!("mail/{mail_id}")).await?;
        Ok(payload.map(|p| p.to_mail()))
    }
}

#[async_trait]
impl CaseSystemGateway for CaseSystemClient {
    #[instrument(skip_all, fields(case_key = %key))]
    async fn get_case(&self, key: &CaseKey) -> Result<Option<CaseRecord>, GatewayError> {
        let payload: Option<PobPayload> = self.get_json(&format!("case/{key}")).await?;
        Ok(payload.map(|p| CaseRecord {
            summary: p.description(),
        }))
    }

    async fn get_problem_text(&self, key: &CaseKey) -> Result<Option<String>, GatewayError> {
        let payload: Option<PobPayload> = self
            .get_json(&format!("case/{key}/memo?type={PROBLEM_MEMO}&scope=all"))
            .await?;
        Ok(payload.and_then(|p| p.memo_text(PROBLEM_MEMO)))
    }

    async fn get_internal_notes(&self, key: &CaseKey) -> Result<Option<String>, GatewayError> {
        let payload: Option<PobPayload> = self
            .get_json(&format!(
                "case/{key}/memo?type={INTERNAL_NOTES_MEMO}&scope=all"
            ))
            .await?;
        Ok(payload.and_then(|p| p.memo_text(INTERNAL_NOTES_MEMO)))
    }

    async fn get_attachments(&self, key: &CaseKey) -> Result<Vec<CaseAttachment>, GatewayError> {
        let payload: Option<PobPayload> = self.get_json(&format!("case/{key}/attachments")).await?;
        Ok(payload.map(|p| p.attachments()).unwrap_or_default())
    }

    async fn get_attachment_content(
        &self,
        key: &CaseKey,
        attachment_id: &CaseAttachmentId,
    ) -> Result<AttachmentContent, GatewayError> {
        let path = format!("case/{key}/attachments/{attachment_id}");
        let response = self
            .send(self.http.get(self.url(&path)), &path)
            .await?
            .ok_or_else(|| status_error(StatusCode::NOT_FOUND, &path, String::new()))?;
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await.map_err(transport_error)?;
        debug!(bytes = bytes.len(), content_type = ?content_type, "attachment downloaded");
        Ok(AttachmentContent {
            bytes: bytes.to_vec(),
            content_type,
        })
    }

    #[instrument(skip_all, fields(case_key = %key))]
    async fn get_inbound_mail(&self, key: &CaseKey) -> Result<Vec<InboundMail>, GatewayError> {
        let received: Vec<PobPayload> = self
            .get_json(&format!("case/{key}/mails?Filter=MailStatus=3&Fields=Id"))
            .await?
            .unwrap_or_default();

        let mut mails = Vec::with_capacity(received.len());
        for mail_id in received.iter().filter_map(PobPayload::id) {
            // A mail listed but gone by the time it is read is skipped.
            if let Some(mail) = self.get_mail(&mail_id).await? {
                mails.push(mail);
            }
        }
        Ok(mails)
    }

    #[instrument(skip_all, fields(case_key = %patch.case_key()))]
    async fn update_case(&self, patch: CasePatch) -> Result<(), GatewayError> {
        let payload = PobPayload::from_patch(&patch);
        self.write(self.http.post(self.url("case")).json(&payload), "case")
            .await
    }

    #[instrument(skip_all, fields(case_key = %key, file_name = %file.file_name))]
    async fn create_attachment(&self, key: &CaseKey, file: &NamedFile) -> Result<(), GatewayError> {
        let path = format!("case/{key}/attachments");
        let payload = PobPayload::from_file(file);
        self.write(self.http.put(self.url(&path)).json(&payload), &path)
            .await
    }
}

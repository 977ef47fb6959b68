//! `NotificationGateway` over the messaging service.

use std::time::Duration;

use async_trait::async_trait;
use reconciler::{ConfigurationError, GatewayError, NotificationGateway, TenantId};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

const SYSTEM: &str = "notifier";

fn default_timeout_seconds() -> u64 {
    30
}

/// Connection settings, deserialised from the `[notifier]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Base URL of the messaging service.
    pub url: String,
    /// Chat channel every message goes to.
    pub channel: String,
    /// Bot token forwarded to the messaging service.
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl NotifierConfig {
    /// Checks the values the client cannot work without.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.url.trim().is_empty() {
            return Err(ConfigurationError::new("notifier.url must be set"));
        }
        if self.channel.trim().is_empty() {
            return Err(ConfigurationError::new("notifier.channel must be set"));
        }
        if self.token.trim().is_empty() {
            return Err(ConfigurationError::new("notifier.token must be set"));
        }
        Ok(())
    }
}

/// Body of a chat message request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlackRequest<'a> {
    pub channel: &'a str,
    pub token: &'a str,
    pub message: &'a str,
}

fn status_error(status: StatusCode, body: String) -> GatewayError {
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        GatewayError::Transient {
            system: SYSTEM,
            message: format!("HTTP {status}"),
        }
    } else {
        GatewayError::Rejected {
            system: SYSTEM,
            status: status.as_u16(),
            message: body,
        }
    }
}

/// HTTP client for the messaging service.
#[derive(Debug, Clone)]
pub struct NotifierClient {
    http: Client,
    base_url: String,
    channel: String,
    token: String,
}

impl NotifierClient {
    /// Builds a client from validated configuration.
    pub fn new(config: &NotifierConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|err| ConfigurationError::new(format!("notifier client: {err}")))?;
        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            channel: config.channel.clone(),
            token: config.token.clone(),
        })
    }

    fn slack_url(&self, tenant_id: &TenantId) -> String {
        format!("{}/{}/slack", self.base_url, tenant_id)
    }

    fn request<'a>(&'a self, message: &'a str) -> SlackRequest<'a> {
        SlackRequest {
            channel: &self.channel,
            token: &self.token,
            message,
        }
    }
}

#[async_trait]
impl NotificationGateway for NotifierClient {
    #[instrument(skip_all, fields(tenant_id = %tenant_id))]
    async fn notify(&self, tenant_id: &TenantId, message: &str) -> Result<(), GatewayError> {
        let response = self
            .http
            .post(self.slack_url(tenant_id))
            .json(&self.request(message))
            .send()
            .await
            .map_err(|err| GatewayError::Transient {
                system: SYSTEM,
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, body));
        }
        debug!(channel = %self.channel, "notification sent");
        Ok(())
    }
}

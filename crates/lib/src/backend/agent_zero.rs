//! Agent Zero external API client: `POST {base}/api_message` with an X-API-KEY header.

use super::{Backend, BackendError, BackendReply, EMPTY_RESPONSE_REPLY};
use crate::util::preview;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

const PREVIEW_CHARS: usize = 100;

/// Client for the Agent Zero HTTP API.
#[derive(Clone)]
pub struct AgentZeroClient {
    base_url: String,
    api_key: String,
    timeout: Duration,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ApiMessageRequest<'a> {
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    context_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ApiMessageResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    context_id: Option<String>,
}

impl AgentZeroClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            timeout: DEFAULT_TIMEOUT,
            client: reqwest::Client::new(),
        }
    }

    /// Override the per-request timeout (default 120s).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn api_message(
        &self,
        text: &str,
        context_id: Option<&str>,
    ) -> Result<ApiMessageResponse, BackendError> {
        let url = format!("{}/api_message", self.base_url);
        let body = ApiMessageRequest {
            message: text,
            context_id,
        };
        log::debug!("sending to backend: {}...", preview(text, PREVIEW_CHARS));
        let res = self
            .client
            .post(&url)
            .header("X-API-KEY", &self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;
        let status = res.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }
        Ok(res.json().await?)
    }
}

#[async_trait]
impl Backend for AgentZeroClient {
    async fn call(
        &self,
        text: &str,
        continuity_token: Option<&str>,
    ) -> Result<BackendReply, BackendError> {
        let data = self.api_message(text, continuity_token).await?;
        Ok(BackendReply {
            text: data
                .response
                .unwrap_or_else(|| EMPTY_RESPONSE_REPLY.to_string()),
            continuity_token: data.context_id.filter(|c| !c.is_empty()),
        })
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BackendError::Timeout
        } else if e.is_connect() {
            BackendError::Unreachable(e.to_string())
        } else if let Some(status) = e.status() {
            BackendError::Status(status.as_u16())
        } else {
            BackendError::Other(e.to_string())
        }
    }
}

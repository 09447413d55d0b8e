use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::tryon::payload::ProviderPayload;

pub const RUN_ERROR_PLACEHOLDER: &str = "Unknown error during run";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Transport(String),
    #[error("provider returned HTTP {status}")]
    Http { status: u16, detail: String },
    #[error("provider response decode failed: {0}")]
    Decode(String),
    #[error("provider endpoint is not a valid base URL: {0}")]
    InvalidEndpoint(String),
}

/// Provider base URL. Route paths are appended as URL segments so job ids are
/// always percent-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    base: Url,
}

impl ProviderEndpoints {
    pub fn new(base: Url) -> Self {
        Self { base }
    }

    pub fn run_url(&self) -> Result<Url, ProviderError> {
        self.join(&["run"])
    }

    pub fn status_url(&self, job_id: &str) -> Result<Url, ProviderError> {
        self.join(&["status", job_id])
    }

    fn join(&self, segments: &[&str]) -> Result<Url, ProviderError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ProviderError::InvalidEndpoint(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// Per-submission provider context. Passed explicitly on every call so
/// concurrent submissions never share credentials through ambient state.
#[derive(Debug, Clone)]
pub struct ProviderContext {
    pub endpoints: ProviderEndpoints,
    pub api_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubmitResponse {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct JobError {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobStatus {
    #[serde(default)]
    pub id: Option<String>,
    pub status: String,
    #[serde(default)]
    pub output: Option<Vec<String>>,
    #[serde(default)]
    pub error: Option<JobError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Starting,
    InQueue,
    Processing,
    Completed,
    Other(String),
}

impl JobState {
    pub fn parse(value: &str) -> Self {
        match value {
            "starting" => Self::Starting,
            "in_queue" => Self::InQueue,
            "processing" => Self::Processing,
            "completed" => Self::Completed,
            other => Self::Other(other.to_string()),
        }
    }
}

impl JobStatus {
    pub fn state(&self) -> JobState {
        JobState::parse(self.status.as_str())
    }
}

#[async_trait]
pub trait TryOnProvider: Send + Sync + 'static {
    async fn submit(
        &self,
        ctx: &ProviderContext,
        payload: &ProviderPayload,
    ) -> Result<SubmitResponse, ProviderError>;

    async fn status(&self, ctx: &ProviderContext, job_id: &str)
        -> Result<JobStatus, ProviderError>;
}

pub type SharedTryOnProvider = Arc<dyn TryOnProvider>;

#[derive(Debug, Clone)]
pub struct HttpTryOnProvider {
    client: Client,
}

impl HttpTryOnProvider {
    pub fn new(request_timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Transport(format!("http client init failed: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TryOnProvider for HttpTryOnProvider {
    async fn submit(
        &self,
        ctx: &ProviderContext,
        payload: &ProviderPayload,
    ) -> Result<SubmitResponse, ProviderError> {
        let url = ctx.endpoints.run_url()?;
        let resp = self
            .client
            .post(url)
            .bearer_auth(ctx.api_key.as_str())
            .json(payload)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                detail: error_detail(status, body.as_str()),
            });
        }
        resp.json::<SubmitResponse>()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }

    async fn status(
        &self,
        ctx: &ProviderContext,
        job_id: &str,
    ) -> Result<JobStatus, ProviderError> {
        let url = ctx.endpoints.status_url(job_id)?;
        let resp = self
            .client
            .get(url)
            .bearer_auth(ctx.api_key.as_str())
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                detail: error_detail(status, body.as_str()),
            });
        }
        resp.json::<JobStatus>()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }
}

/// Human-readable detail from a provider error body. Unparsable bodies get a
/// fixed placeholder; parsable bodies without a known field fall back to the
/// status reason phrase.
pub fn error_detail(status: StatusCode, body: &str) -> String {
    let Ok(parsed) = serde_json::from_str::<Value>(body) else {
        return String::from(RUN_ERROR_PLACEHOLDER);
    };
    ["detail", "message", "error"]
        .iter()
        .find_map(|field| match parsed.get(field)? {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Unknown error")
                .to_string()
        })
}

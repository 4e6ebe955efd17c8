//! HTTP client for vendor video-generation endpoints.
//!
//! One [`VendorApi`] serves every protocol variant: the variant picks the
//! base URL, the payload carries the path. Authentication is a bearer
//! token taken from the credential supplied per call, so concurrent
//! submissions can use different keys over one connection pool.

use std::time::Duration;

use async_trait::async_trait;
use storyreel_core::credentials::Credential;
use storyreel_core::failure::{classify, FailureKind};
use storyreel_core::protocol::ProtocolVariant;

use crate::builders::{builder_for, StatusEndpoint, VendorPayload};
use crate::response::extract_task_id;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Errors from the vendor HTTP layer.
#[derive(Debug, thiserror::Error)]
pub enum VendorApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, decode).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The vendor returned a non-2xx status code.
    #[error("Vendor API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// A 2xx submission response without a recognizable task id.
    #[error("Vendor response carried no task id: {body}")]
    MissingTaskId { body: String },

    /// The configured base URL cannot carry a status path.
    #[error("Invalid vendor URL: {0}")]
    InvalidUrl(String),
}

impl VendorApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            VendorApiError::Api { status, .. } => Some(*status),
            VendorApiError::Request(e) => e.status().map(|s| s.as_u16()),
            VendorApiError::MissingTaskId { .. } | VendorApiError::InvalidUrl(_) => None,
        }
    }

    /// Classify this error for retry and reporting decisions.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            VendorApiError::Api { status, body } => classify(*status, body),
            VendorApiError::MissingTaskId { body } => classify(200, body),
            VendorApiError::Request(e) => FailureKind::VendorError {
                message: e.to_string(),
            },
            VendorApiError::InvalidUrl(_) => FailureKind::VendorError {
                message: self.to_string(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// VideoVendor
// ---------------------------------------------------------------------------

/// Submission and status transport for vendor tasks.
#[async_trait]
pub trait VideoVendor: Send + Sync {
    /// Submit a payload and return the vendor's task id.
    async fn submit(
        &self,
        variant: ProtocolVariant,
        payload: &VendorPayload,
        credential: &Credential,
    ) -> Result<String, VendorApiError>;

    /// Fetch the raw status document for a task.
    async fn query(
        &self,
        variant: ProtocolVariant,
        task_id: &str,
        credential: &Credential,
    ) -> Result<serde_json::Value, VendorApiError>;
}

// ---------------------------------------------------------------------------
// VendorApi
// ---------------------------------------------------------------------------

/// Base URL per protocol variant, without a trailing slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorEndpoints {
    pub unified: String,
    pub volc: String,
    pub wan: String,
    pub kling: String,
}

impl VendorEndpoints {
    /// Route every variant to the same host (a relay or a test server).
    pub fn single(base_url: impl Into<String>) -> Self {
        let base = trim_base(base_url.into());
        Self {
            unified: base.clone(),
            volc: base.clone(),
            wan: base.clone(),
            kling: base,
        }
    }

    pub fn base_url(&self, variant: ProtocolVariant) -> &str {
        match variant {
            ProtocolVariant::Unified => &self.unified,
            ProtocolVariant::Volc => &self.volc,
            ProtocolVariant::Wan => &self.wan,
            ProtocolVariant::Kling => &self.kling,
        }
    }
}

impl Default for VendorEndpoints {
    fn default() -> Self {
        Self {
            unified: "http://localhost:3000".into(),
            volc: "https://ark.cn-beijing.volces.com".into(),
            wan: "https://dashscope.aliyuncs.com".into(),
            kling: "https://api-beijing.klingai.com".into(),
        }
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

/// HTTP client for vendor generation APIs.
pub struct VendorApi {
    client: reqwest::Client,
    endpoints: VendorEndpoints,
}

impl VendorApi {
    /// Create a client with its own connection pool and request timeout.
    pub fn new(endpoints: VendorEndpoints, timeout: Duration) -> Result<Self, VendorApiError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, endpoints))
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, endpoints: VendorEndpoints) -> Self {
        let endpoints = VendorEndpoints {
            unified: trim_base(endpoints.unified),
            volc: trim_base(endpoints.volc),
            wan: trim_base(endpoints.wan),
            kling: trim_base(endpoints.kling),
        };
        Self { client, endpoints }
    }

    pub fn endpoints(&self) -> &VendorEndpoints {
        &self.endpoints
    }

    // ---- private helpers ----

    /// Return the response unchanged on 2xx, otherwise a
    /// [`VendorApiError::Api`] with the status and body text.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, VendorApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(VendorApiError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response(response: reqwest::Response) -> Result<serde_json::Value, VendorApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<serde_json::Value>().await?)
    }
}

#[async_trait]
impl VideoVendor for VendorApi {
    async fn submit(
        &self,
        variant: ProtocolVariant,
        payload: &VendorPayload,
        credential: &Credential,
    ) -> Result<String, VendorApiError> {
        let url = format!("{}{}", self.endpoints.base_url(variant), payload.path);
        let mut request = self
            .client
            .post(&url)
            .bearer_auth(&credential.api_key)
            .json(&payload.body);
        if payload.async_header {
            request = request.header("X-DashScope-Async", "enable");
        }

        tracing::debug!(%variant, credential = %credential.label, %url, "Submitting vendor task");
        let body = Self::parse_response(request.send().await?).await?;

        extract_task_id(variant, &body).ok_or_else(|| VendorApiError::MissingTaskId {
            body: body.to_string(),
        })
    }

    async fn query(
        &self,
        variant: ProtocolVariant,
        task_id: &str,
        credential: &Credential,
    ) -> Result<serde_json::Value, VendorApiError> {
        let url = status_url(
            self.endpoints.base_url(variant),
            builder_for(variant).status_endpoint(),
            task_id,
        )?;
        let response = self
            .client
            .get(url)
            .bearer_auth(&credential.api_key)
            .send()
            .await?;

        Self::parse_response(response).await
    }
}

/// Status URL for `task_id`, with the id percent-encoded as a path segment
/// or query value so reserved characters cannot change the request target.
pub fn status_url(
    base_url: &str,
    endpoint: StatusEndpoint,
    task_id: &str,
) -> Result<reqwest::Url, VendorApiError> {
    let path = match endpoint {
        StatusEndpoint::Segment(path) | StatusEndpoint::Query { path, .. } => path,
    };
    let mut url = reqwest::Url::parse(&format!("{base_url}{path}"))
        .map_err(|e| VendorApiError::InvalidUrl(format!("{base_url}{path}: {e}")))?;

    match endpoint {
        StatusEndpoint::Segment(_) => {
            url.path_segments_mut()
                .map_err(|()| VendorApiError::InvalidUrl(base_url.to_string()))?
                .push(task_id);
        }
        StatusEndpoint::Query { param, .. } => {
            url.query_pairs_mut().append_pair(param, task_id);
        }
    }
    Ok(url)
}

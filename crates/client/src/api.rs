//! REST client for the forecasting service's job endpoints.
//!
//! [`JobApi`] is the seam the poller and the lifecycle controller depend
//! on; [`HttpJobApi`] implements it with [`reqwest`]. No call is retried
//! here -- retry policy belongs to the poller.

use std::time::Duration;

use async_trait::async_trait;
use neural_core::job::Job;
use neural_core::job_status::JobStatus;
use neural_core::request::JobRequest;
use neural_core::types::{JobId, Timestamp};
use serde::Deserialize;

/// Default path of the job-creation endpoint.
pub const DEFAULT_CREATE_PATH: &str = "/api/jobs";
/// Default path prefix of the job-status endpoint (`/{job_id}` appended).
pub const DEFAULT_STATUS_PATH: &str = "/api/jobs/status";
/// Default path prefix of the job-cancellation endpoint (`/{job_id}` appended).
pub const DEFAULT_CANCEL_PATH: &str = "/api/jobs/cancel";

/// Remote operations needed to run and track one job.
#[async_trait]
pub trait JobApi: Send + Sync {
    /// Create a job and return its initial snapshot.
    async fn create_job(&self, request: &JobRequest) -> Result<Job, JobApiError>;

    /// Fetch the service's current view of a job.
    async fn fetch_status(&self, job_id: &JobId) -> Result<Job, JobApiError>;

    /// Ask the service to cancel a job. Returns the service's `success` flag.
    async fn cancel_job(&self, job_id: &JobId) -> Result<bool, JobApiError>;
}

/// Errors from the job REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum JobApiError {
    /// No response was received (connection refused, DNS, TLS, reset).
    #[error("HTTP request failed: {0}")]
    Network(String),

    /// No response was received within the request timeout.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The service answered with a non-2xx status code.
    #[error("Job API error ({status}): {body}")]
    Remote {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The service answered 2xx but the body could not be understood.
    #[error("Unexpected response body: {0}")]
    Decode(String),

    /// The configured base URL and endpoint do not form a valid URL.
    #[error("Invalid request URL: {0}")]
    InvalidUrl(String),
}

impl JobApiError {
    /// True when the service never answered (as opposed to answering with
    /// an error).
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }
}

/// Response of the job-creation endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: f64,
    pub model_type: Option<String>,
    pub file_id: Option<String>,
    pub created_at: Option<Timestamp>,
}

impl CreateJobResponse {
    pub fn into_job(self) -> Job {
        Job::new(self.job_id, self.status, self.progress)
            .with_created_at(self.created_at)
            .with_model(self.model_type, self.file_id)
    }
}

/// Response of the job-status endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub status: JobStatus,
    #[serde(default)]
    pub progress: f64,
    pub current_epoch: Option<u32>,
    pub total_epochs: Option<u32>,
    pub time_remaining: Option<f64>,
    pub metrics: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: Option<Timestamp>,
    pub model_type: Option<String>,
    pub file_id: Option<String>,
}

impl JobStatusResponse {
    /// Build a complete snapshot for `job_id` from this response.
    pub fn into_job(self, job_id: JobId) -> Job {
        Job::new(job_id, self.status, self.progress)
            .with_created_at(self.created_at)
            .with_model(self.model_type, self.file_id)
            .with_epochs(self.current_epoch, self.total_epochs)
            .with_time_remaining(self.time_remaining)
            .with_metrics(self.metrics)
            .with_error(self.error)
    }
}

/// Response of the job-cancellation endpoint.
#[derive(Debug, Deserialize)]
pub struct CancelJobResponse {
    pub success: bool,
}

/// Endpoint paths, relative to the base URL.
#[derive(Debug, Clone)]
pub struct JobEndpoints {
    pub create: String,
    pub status: String,
    pub cancel: String,
}

impl Default for JobEndpoints {
    fn default() -> Self {
        Self {
            create: DEFAULT_CREATE_PATH.to_string(),
            status: DEFAULT_STATUS_PATH.to_string(),
            cancel: DEFAULT_CANCEL_PATH.to_string(),
        }
    }
}

/// HTTP client for one forecasting service.
pub struct HttpJobApi {
    client: reqwest::Client,
    base_url: String,
    endpoints: JobEndpoints,
    request_timeout: Duration,
}

impl HttpJobApi {
    /// Create an API client.
    ///
    /// * `base_url` - service root, e.g. `http://host:8000`.
    /// * `request_timeout` - upper bound for a single request.
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, request_timeout)
    }

    /// Create an API client reusing an existing [`reqwest::Client`]
    /// (useful for connection pooling across several dashboards).
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            endpoints: JobEndpoints::default(),
            request_timeout,
        }
    }

    /// Override the endpoint paths.
    pub fn with_endpoints(mut self, endpoints: JobEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ---- private helpers ----

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `{base}{prefix}/{job_id}` with the id percent-encoded as a single
    /// path segment, so ids containing `/`, `?` or `#` stay one job.
    fn job_url(&self, prefix: &str, job_id: &JobId) -> Result<reqwest::Url, JobApiError> {
        let raw = self.url(prefix);
        let mut url = reqwest::Url::parse(&raw)
            .map_err(|e| JobApiError::InvalidUrl(format!("{raw}: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| JobApiError::InvalidUrl(raw.clone()))?
            .pop_if_empty()
            .push(job_id.as_str());
        Ok(url)
    }

    /// Map a transport-level [`reqwest::Error`] into the taxonomy above.
    fn classify(&self, e: reqwest::Error) -> JobApiError {
        if e.is_timeout() {
            JobApiError::Timeout(self.request_timeout)
        } else if e.is_decode() {
            JobApiError::Decode(e.to_string())
        } else {
            JobApiError::Network(e.to_string())
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, JobApiError> {
        let response = request
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| self.classify(e))?;
        self.ensure_success(response).await
    }

    /// Ensure the response has a success status code, or turn it into
    /// [`JobApiError::Remote`] carrying the status and body text.
    async fn ensure_success(
        &self,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, JobApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(JobApiError::Remote {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, JobApiError> {
        let bytes = response.bytes().await.map_err(|e| self.classify(e))?;
        serde_json::from_slice(&bytes).map_err(|e| JobApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl JobApi for HttpJobApi {
    async fn create_job(&self, request: &JobRequest) -> Result<Job, JobApiError> {
        let response = self
            .send(self.client.post(self.url(&self.endpoints.create)).json(request))
            .await?;
        let created: CreateJobResponse = self.parse(response).await?;

        tracing::info!(
            job_id = %created.job_id,
            model_type = %request.model_type,
            "Job created",
        );
        Ok(created.into_job())
    }

    async fn fetch_status(&self, job_id: &JobId) -> Result<Job, JobApiError> {
        let response = self
            .send(self.client.get(self.job_url(&self.endpoints.status, job_id)?))
            .await?;
        let status: JobStatusResponse = self.parse(response).await?;
        Ok(status.into_job(job_id.clone()))
    }

    async fn cancel_job(&self, job_id: &JobId) -> Result<bool, JobApiError> {
        let response = self
            .send(self.client.post(self.job_url(&self.endpoints.cancel, job_id)?))
            .await?;
        let cancelled: CancelJobResponse = self.parse(response).await?;
        Ok(cancelled.success)
    }
}

//! Webhook job handler.
//!
//! Forwards each job to the collaborator service configured for its type:
//! the job record is `POST`ed as JSON, a 2xx JSON body becomes the job
//! result, and anything else fails the attempt.

use async_trait::async_trait;
use quill_config::HandlersConfig;
use quill_jobs::{Job, JobError, JobHandler, JobResult};
use reqwest::{Client, Response};
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Header carrying the job ID on every webhook call.
pub const JOB_ID_HEADER: &str = "X-Quill-Job-Id";

/// Longest response body quoted in an error message.
const MAX_ERROR_BODY: usize = 512;

/// HTTP handler that dispatches jobs by type to collaborator URLs.
pub struct WebhookHandler {
    client: Client,
    endpoints: HashMap<String, String>,
}

impl WebhookHandler {
    /// Creates a handler from the `[handlers]` configuration section.
    pub fn new(config: &HandlersConfig) -> JobResult<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| JobError::Configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self::with_client(client, config.endpoints.clone()))
    }

    /// Creates a handler with a custom client.
    pub fn with_client(client: Client, endpoints: HashMap<String, String>) -> Self {
        Self { client, endpoints }
    }

    /// URL that jobs of this type are sent to.
    pub fn endpoint(&self, job_type: &str) -> Option<&str> {
        self.endpoints.get(job_type).map(String::as_str)
    }

    /// Job types with a configured endpoint.
    pub fn job_types(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }
}

#[async_trait]
impl JobHandler for WebhookHandler {
    async fn handle(&self, job: &Job) -> JobResult<Option<Value>> {
        let url = self.endpoint(&job.job_type).ok_or_else(|| {
            JobError::ExecutionFailed(format!(
                "no endpoint configured for job type '{}'",
                job.job_type
            ))
        })?;

        debug!(job_id = %job.id, url, "Calling job webhook");
        let response = self
            .client
            .post(url)
            .header(JOB_ID_HEADER, job.id.as_str())
            .json(job)
            .send()
            .await
            .map_err(|e| JobError::ExecutionFailed(format!("request to {} failed: {}", url, e)))?;

        handle_response(url, response).await
    }
}

async fn handle_response(url: &str, response: Response) -> JobResult<Option<Value>> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let body: String = body.chars().take(MAX_ERROR_BODY).collect();
        return Err(JobError::ExecutionFailed(format!(
            "{} returned {}: {}",
            url, status, body
        )));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| JobError::ExecutionFailed(format!("failed to read response from {}: {}", url, e)))?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| JobError::ExecutionFailed(format!("invalid JSON from {}: {}", url, e)))
}

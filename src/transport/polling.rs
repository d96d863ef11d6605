//! Asynchronous-style transport
//!
//! - `POST <endpoint>` submits and returns `{ id }`
//! - `GET <endpoint>/<id>` reads `{ status, output?, error?, progress? }`
//! - `POST <endpoint>/<id>/cancel` asks the service to drop the job

use async_trait::async_trait;

use super::http::HttpClient;
use super::wire::{StatusResponse, SubmitResponse};
use super::{JobHandle, JobStatus, JobTransport, SeparationRequest};
use crate::config::{BackendConfig, BackendStyle};
use crate::error::{Result, StemError};

pub struct PollingTransport {
    http: HttpClient,
}

impl PollingTransport {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(config)?,
        })
    }
}

#[async_trait]
impl JobTransport for PollingTransport {
    fn style(&self) -> BackendStyle {
        BackendStyle::Polling
    }

    async fn submit(&self, request: &SeparationRequest) -> Result<JobHandle> {
        let url = self.http.endpoint().clone();
        let response = self
            .http
            .send(self.http.post(url).json(request), "submit")
            .await?;
        let body: SubmitResponse = self.http.json(response, "submit").await?;

        let id = body.id.trim().to_string();
        if id.is_empty() {
            return Err(StemError::RemoteProcessing {
                message: "separation service returned an empty job id".to_string(),
                error_type: None,
                details: None,
            });
        }

        tracing::info!(job_id = %id, model = %request.model_id, "separation job submitted");
        Ok(JobHandle::Submitted { id })
    }

    async fn fetch_status(&self, job_id: &str) -> Result<JobStatus> {
        let url = self.http.url(&[job_id])?;
        let response = self.http.send(self.http.get(url), "status").await?;
        let body: StatusResponse = self.http.json(response, "status").await?;

        let status = JobStatus::from(body);
        tracing::debug!(job_id, state = ?status.state, progress = ?status.progress, "polled job");
        Ok(status)
    }

    async fn cancel_job(&self, job_id: &str) -> Result<()> {
        let url = self.http.url(&[job_id, "cancel"])?;
        self.http.send(self.http.post(url), "cancel").await?;
        tracing::info!(job_id, "remote job cancelled");
        Ok(())
    }
}

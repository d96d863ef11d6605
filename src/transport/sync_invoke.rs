//! Synchronous-style transport
//!
//! One POST to the endpoint that only returns once the service has the final
//! stem map, or an error payload.

use async_trait::async_trait;

use super::http::HttpClient;
use super::wire::{stem_map, InvokeResponse};
use super::{JobHandle, JobStatus, JobTransport, SeparationRequest};
use crate::config::{BackendConfig, BackendStyle};
use crate::error::{Result, StemError};

pub struct SyncInvokeTransport {
    http: HttpClient,
}

impl SyncInvokeTransport {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        Ok(Self {
            http: HttpClient::new(config)?,
        })
    }
}

#[async_trait]
impl JobTransport for SyncInvokeTransport {
    fn style(&self) -> BackendStyle {
        BackendStyle::SyncInvoke
    }

    async fn submit(&self, request: &SeparationRequest) -> Result<JobHandle> {
        tracing::debug!(
            endpoint = %self.http.endpoint(),
            model = %request.model_id,
            "invoking separation"
        );

        let url = self.http.endpoint().clone();
        let response = self
            .http
            .send(self.http.post(url).json(request), "separation")
            .await?;
        let body: InvokeResponse = self.http.json(response, "separation").await?;

        interpret(body)
    }

    async fn fetch_status(&self, job_id: &str) -> Result<JobStatus> {
        Err(StemError::configuration(format!(
            "status of job '{}' requested from a synchronous backend",
            job_id
        )))
    }
}

/// Turn an invoke body into a final stem map or a processing error
fn interpret(body: InvokeResponse) -> Result<JobHandle> {
    if let Some(message) = body.error_message() {
        return Err(StemError::RemoteProcessing {
            message,
            details: body.details_text(),
            error_type: body.error_type,
        });
    }

    match body.status.as_deref().map(str::to_lowercase).as_deref() {
        Some("succeeded") | Some("completed") | None => {
            Ok(JobHandle::Completed(body.output.map(stem_map).unwrap_or_default()))
        }
        Some("canceled") | Some("cancelled") => Err(StemError::RemoteProcessing {
            message: "the separation service cancelled the job".to_string(),
            error_type: body.error_type,
            details: None,
        }),
        Some(other) => Err(StemError::RemoteProcessing {
            message: format!("separation service returned status '{}'", other),
            details: body.details_text(),
            error_type: body.error_type,
        }),
    }
}

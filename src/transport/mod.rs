//! Job Transport
//!
//! Moves audio to object storage and talks to the remote separation service.
//! Two protocols sit behind one [`JobTransport`] trait:
//! - [`SyncInvokeTransport`]: one call returns the stem map or an error payload
//! - [`PollingTransport`]: submit returns a job id, status is polled until terminal
//!
//! Which one is used comes from [`BackendConfig::style`].

mod http;
mod polling;
mod sync_invoke;
mod upload;
mod wire;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{BackendConfig, BackendStyle, OutputFormat};
use crate::error::Result;

pub use polling::PollingTransport;
pub use sync_invoke::SyncInvokeTransport;
pub use upload::{object_key, validate_location, Uploader};

/// Raw stem map as returned by the service: stem id to URL, inline payload,
/// or `{ "url": ... }` object, in the service's key order
pub type StemMap = serde_json::Map<String, serde_json::Value>;

/// Body of a separation request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeparationRequest {
    pub audio_url: String,
    pub model_id: String,
    pub output_format: OutputFormat,
    /// Set when exactly one stem was requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stem: Option<String>,
}

impl SeparationRequest {
    pub fn new(audio_url: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            audio_url: audio_url.into(),
            model_id: model_id.into(),
            output_format: OutputFormat::default(),
            stem: None,
        }
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    pub fn with_stem(mut self, stem: impl Into<String>) -> Self {
        self.stem = Some(stem.into());
        self
    }
}

/// What `submit` hands back
#[derive(Debug, Clone, PartialEq)]
pub enum JobHandle {
    /// Synchronous style: the final stem map
    Completed(StemMap),
    /// Asynchronous style: poll this id
    Submitted { id: String },
}

/// Remote job state reported by status queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteJobState {
    #[serde(alias = "queued", alias = "pending")]
    Starting,
    #[serde(alias = "running")]
    Processing,
    #[serde(alias = "completed")]
    Succeeded,
    Failed,
    #[serde(alias = "cancelled")]
    Canceled,
}

impl RemoteJobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

/// One status reading of an asynchronous job
#[derive(Debug, Clone, PartialEq)]
pub struct JobStatus {
    pub state: RemoteJobState,
    /// Stem map, present on `succeeded`
    pub output: Option<StemMap>,
    pub error: Option<String>,
    pub details: Option<String>,
    /// Service-reported progress, either a 0-1 fraction or a 0-100 percent
    pub progress: Option<f64>,
}

impl JobStatus {
    pub fn new(state: RemoteJobState) -> Self {
        Self {
            state,
            output: None,
            error: None,
            details: None,
            progress: None,
        }
    }

    pub fn with_output(mut self, output: StemMap) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// Client side of the remote separation service
#[async_trait]
pub trait JobTransport: Send + Sync {
    fn style(&self) -> BackendStyle;

    /// Start a separation job
    async fn submit(&self, request: &SeparationRequest) -> Result<JobHandle>;

    /// Read the status of a submitted job (asynchronous style only)
    async fn fetch_status(&self, job_id: &str) -> Result<JobStatus>;

    /// Ask the service to drop a job. Best-effort; the default does nothing.
    async fn cancel_job(&self, _job_id: &str) -> Result<()> {
        Ok(())
    }
}

/// Build the transport selected by `config`
pub fn connect(config: &BackendConfig) -> Result<Arc<dyn JobTransport>> {
    let transport: Arc<dyn JobTransport> = match config.style {
        BackendStyle::SyncInvoke => Arc::new(SyncInvokeTransport::new(config)?),
        BackendStyle::Polling => Arc::new(PollingTransport::new(config)?),
    };
    tracing::info!(style = %config.style, "separation transport ready");
    Ok(transport)
}

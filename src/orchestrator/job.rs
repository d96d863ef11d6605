//! Separation job data model

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::stem::StemDescriptor;

/// Lifecycle stage of a separation job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStage {
    #[default]
    Idle,
    Uploading,
    Processing,
    Complete,
    Error,
}

impl JobStage {
    /// Uploading or processing
    pub fn is_active(&self) -> bool {
        matches!(self, JobStage::Uploading | JobStage::Processing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStage::Complete | JobStage::Error)
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStage::Idle => "idle",
            JobStage::Uploading => "uploading",
            JobStage::Processing => "processing",
            JobStage::Complete => "complete",
            JobStage::Error => "error",
        };
        f.write_str(name)
    }
}

/// One in-flight or finished separation request
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeparationJob {
    /// Remote job id (asynchronous backends only)
    pub id: Option<String>,
    pub source_url: Option<String>,
    pub model_id: String,
    pub requested_stems: Option<Vec<String>>,
    pub stage: JobStage,
    pub progress_percent: u8,
    /// Set only when `stage` is `complete`
    pub result_stems: Option<Vec<StemDescriptor>>,
    /// Set only when `stage` is `error`
    pub error_message: Option<String>,
    pub error_kind: Option<ErrorKind>,
    /// The job was reset by an explicit cancel
    pub cancelled: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SeparationJob {
    /// A fresh job entering the upload stage
    pub fn started(model_id: impl Into<String>, requested_stems: Option<Vec<String>>) -> Self {
        Self {
            model_id: model_id.into(),
            requested_stems,
            stage: JobStage::Uploading,
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Idle job left behind by an explicit cancel
    pub fn cancelled() -> Self {
        Self {
            cancelled: true,
            ..Self::default()
        }
    }

    pub fn is_active(&self) -> bool {
        self.stage.is_active()
    }
}

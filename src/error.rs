//! Error handling for stemdeck
//!
//! Every failure a separation job or mix session can hit maps onto one
//! variant here. Errors are local to the job or session that produced them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for stemdeck operations
pub type Result<T> = std::result::Result<T, StemError>;

/// Main error type for stemdeck operations
#[derive(Error, Debug)]
pub enum StemError {
    // Configuration Errors
    #[error("Backend configuration error: {reason}")]
    Configuration { reason: String },

    // Upload Errors
    #[error("Upload failed for '{path}': {reason}")]
    Upload {
        path: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Storage returned an unusable location '{url}': {reason}")]
    InvalidLocation { url: String, reason: String },

    // Remote Service Errors
    #[error("Separation service unreachable at {endpoint}: {reason}")]
    RemoteUnreachable { endpoint: String, reason: String },

    #[error("Separation failed: {message}")]
    RemoteProcessing {
        message: String,
        error_type: Option<String>,
        details: Option<String>,
    },

    #[error("Separation finished but produced no usable stems")]
    NoStemsProduced,

    #[error("{operation} timed out after {elapsed_ms} ms")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error("Separation cancelled")]
    Cancelled,

    #[error("A separation job is already {stage}")]
    JobInProgress { stage: String },

    // Mix Errors
    #[error("Unknown track: {id}")]
    UnknownTrack { id: String },

    // Store Errors
    #[error("Project not found: {id}")]
    RecordNotFound { id: String },

    #[error("Store error: {reason}")]
    Store { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Serializable classification of a [`StemError`], stored on failed jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Upload,
    InvalidLocation,
    RemoteUnreachable,
    RemoteProcessing,
    NoStemsProduced,
    Timeout,
    Cancelled,
    JobInProgress,
    UnknownTrack,
    RecordNotFound,
    Store,
    Io,
    Serialization,
}

impl StemError {
    /// Shorthand for a configuration failure.
    pub fn configuration(reason: impl Into<String>) -> Self {
        StemError::Configuration {
            reason: reason.into(),
        }
    }

    /// Get the kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            StemError::Configuration { .. } => ErrorKind::Configuration,
            StemError::Upload { .. } => ErrorKind::Upload,
            StemError::InvalidLocation { .. } => ErrorKind::InvalidLocation,
            StemError::RemoteUnreachable { .. } => ErrorKind::RemoteUnreachable,
            StemError::RemoteProcessing { .. } => ErrorKind::RemoteProcessing,
            StemError::NoStemsProduced => ErrorKind::NoStemsProduced,
            StemError::Timeout { .. } => ErrorKind::Timeout,
            StemError::Cancelled => ErrorKind::Cancelled,
            StemError::JobInProgress { .. } => ErrorKind::JobInProgress,
            StemError::UnknownTrack { .. } => ErrorKind::UnknownTrack,
            StemError::RecordNotFound { .. } => ErrorKind::RecordNotFound,
            StemError::Store { .. } => ErrorKind::Store,
            StemError::Io(_) => ErrorKind::Io,
            StemError::Serialization(_) => ErrorKind::Serialization,
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            StemError::Configuration { .. } => "CONFIGURATION_ERROR",
            StemError::Upload { .. } => "UPLOAD_ERROR",
            StemError::InvalidLocation { .. } => "INVALID_LOCATION",
            StemError::RemoteUnreachable { .. } => "REMOTE_UNREACHABLE",
            StemError::RemoteProcessing { .. } => "REMOTE_PROCESSING_ERROR",
            StemError::NoStemsProduced => "NO_STEMS_PRODUCED",
            StemError::Timeout { .. } => "TIMEOUT",
            StemError::Cancelled => "CANCELLED",
            StemError::JobInProgress { .. } => "JOB_IN_PROGRESS",
            StemError::UnknownTrack { .. } => "UNKNOWN_TRACK",
            StemError::RecordNotFound { .. } => "RECORD_NOT_FOUND",
            StemError::Store { .. } => "STORE_ERROR",
            StemError::Io(_) => "IO_ERROR",
            StemError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Whether the user can sensibly retry by starting a fresh job.
    ///
    /// Nothing is ever retried automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StemError::Upload { .. }
                | StemError::RemoteUnreachable { .. }
                | StemError::RemoteProcessing { .. }
                | StemError::NoStemsProduced
                | StemError::Timeout { .. }
        )
    }

    /// Whether this error should populate a job's user-visible error field.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, StemError::Cancelled)
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            StemError::Configuration { .. } => vec![
                "Set STEMDECK_ENDPOINT to the separation service URL",
                "Check that the model id is supported by the service",
            ],
            StemError::Upload { .. } => vec![
                "Check your connection and try the upload again",
                "Make sure the storage bucket accepts writes",
            ],
            StemError::InvalidLocation { .. } => vec![
                "The storage returned a malformed file URL",
                "Check the public URL or signing settings of the blob store",
            ],
            StemError::RemoteUnreachable { .. } => vec![
                "The separation service may be down or overloaded",
                "Try again in a few minutes",
            ],
            StemError::RemoteProcessing { .. } => vec![
                "Try a different separation model",
                "Re-export the source audio and try again",
            ],
            StemError::NoStemsProduced => vec![
                "Check that the source contains audible music",
                "Request all stems instead of a single one",
            ],
            StemError::Timeout { .. } => vec![
                "Try a shorter audio file",
                "Try a faster separation model",
            ],
            _ => vec![],
        }
    }

    /// Get a user-friendly message for this error
    pub fn friendly_message(&self) -> String {
        match self {
            StemError::Configuration { reason } => {
                format!("Stem separation isn't set up correctly: {}", reason)
            }
            StemError::Upload { .. } => {
                "We couldn't upload your audio. Please try again.".to_string()
            }
            StemError::InvalidLocation { .. } => {
                "Your audio uploaded, but storage gave back an invalid link. This is a configuration problem, not your file."
                    .to_string()
            }
            StemError::RemoteUnreachable { .. } => {
                "The separation service can't be reached right now. Please try again later."
                    .to_string()
            }
            StemError::RemoteProcessing {
                message, details, ..
            } => match details {
                Some(details) => format!("Separation failed: {} ({})", message, details),
                None => format!("Separation failed: {}", message),
            },
            StemError::NoStemsProduced => {
                "The separation finished but no stems came back. Try a different model."
                    .to_string()
            }
            StemError::Timeout { .. } => {
                "Separation is taking too long. Try a shorter file or a different model."
                    .to_string()
            }
            _ => self.to_string(),
        }
    }
}

//! Backend configuration
//!
//! Settings for the separation service and the job lifecycle. Values come
//! from a JSON file, from `STEMDECK_*` environment variables, or from code.

use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, StemError};

/// Default separation model.
pub const DEFAULT_MODEL: &str = "htdemucs";

const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 300_000;
const DEFAULT_UPLOAD_TIMEOUT_MS: u64 = 120_000;
const DEFAULT_POLL_INTERVAL_MS: u64 = 2_000;
const DEFAULT_MAX_POLLS: u32 = 450;
const DEFAULT_MAX_POLL_DURATION_MS: u64 = 900_000;
const DEFAULT_PROGRESS_TICK_MS: u64 = 3_000;
const DEFAULT_SIGNED_URL_TTL_SECS: u64 = 3_600;

/// Which remote protocol the separation service speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendStyle {
    /// One call that returns the final stem map or an error payload
    SyncInvoke,
    /// Submit returns a job id; status is polled until terminal
    #[default]
    Polling,
}

impl FromStr for BackendStyle {
    type Err = StemError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sync" | "sync_invoke" | "invoke" => Ok(Self::SyncInvoke),
            "polling" | "poll" | "async" => Ok(Self::Polling),
            other => Err(StemError::configuration(format!(
                "unknown backend style '{}' (expected sync or polling)",
                other
            ))),
        }
    }
}

impl fmt::Display for BackendStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendStyle::SyncInvoke => write!(f, "sync"),
            BackendStyle::Polling => write!(f, "polling"),
        }
    }
}

/// Output encoding requested from the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Mp3,
    Wav,
    Flac,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
            Self::Flac => "flac",
        }
    }

    /// MIME type used when wrapping inline payloads into data URLs.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mpeg",
            Self::Wav => "audio/wav",
            Self::Flac => "audio/flac",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = StemError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mp3" => Ok(Self::Mp3),
            "wav" => Ok(Self::Wav),
            "flac" => Ok(Self::Flac),
            other => Err(StemError::configuration(format!(
                "unsupported output format '{}' (expected mp3, wav or flac)",
                other
            ))),
        }
    }
}

/// Configuration for the separation backend and job lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Remote protocol
    pub style: BackendStyle,

    /// Base URL of the separation endpoint
    pub endpoint: Option<String>,

    /// Bearer token sent with every request
    #[serde(skip_serializing)]
    pub api_token: Option<String>,

    /// Model used when a job doesn't name one
    pub default_model: String,

    pub output_format: OutputFormat,

    /// Bound on a single submit/status request
    pub request_timeout_ms: u64,

    /// Bound on the blob upload
    pub upload_timeout_ms: u64,

    pub poll_interval_ms: u64,

    /// Maximum number of status polls before giving up
    pub max_polls: u32,

    /// Maximum total time spent polling before giving up
    pub max_poll_duration_ms: u64,

    /// Interval of the simulated progress ramp (synchronous style)
    pub progress_tick_ms: u64,

    /// Request signed (time-bounded) URLs from the blob store
    pub signed_urls: bool,

    pub signed_url_ttl_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            style: BackendStyle::default(),
            endpoint: None,
            api_token: None,
            default_model: DEFAULT_MODEL.to_string(),
            output_format: OutputFormat::default(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            upload_timeout_ms: DEFAULT_UPLOAD_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_polls: DEFAULT_MAX_POLLS,
            max_poll_duration_ms: DEFAULT_MAX_POLL_DURATION_MS,
            progress_tick_ms: DEFAULT_PROGRESS_TICK_MS,
            signed_urls: true,
            signed_url_ttl_secs: DEFAULT_SIGNED_URL_TTL_SECS,
        }
    }
}

impl BackendConfig {
    /// Create a configuration for the given style and endpoint
    pub fn new(style: BackendStyle, endpoint: impl Into<String>) -> Self {
        Self {
            style,
            endpoint: Some(endpoint.into()),
            ..Self::default()
        }
    }

    /// Build from `STEMDECK_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup, starting from defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    /// Load a JSON configuration file, then apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&content)?;
        config.apply_overrides(|key| env::var(key).ok())?;
        Ok(config)
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(style) = get("STEMDECK_BACKEND_STYLE") {
            self.style = style.parse()?;
        }
        if let Some(endpoint) = get("STEMDECK_ENDPOINT") {
            self.endpoint = Some(endpoint);
        }
        if let Some(token) = get("STEMDECK_API_TOKEN") {
            self.api_token = Some(token);
        }
        if let Some(model) = get("STEMDECK_MODEL") {
            self.default_model = model;
        }
        if let Some(format) = get("STEMDECK_OUTPUT_FORMAT") {
            self.output_format = format.parse()?;
        }
        if let Some(v) = get("STEMDECK_REQUEST_TIMEOUT_MS") {
            self.request_timeout_ms = parse_number("STEMDECK_REQUEST_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("STEMDECK_UPLOAD_TIMEOUT_MS") {
            self.upload_timeout_ms = parse_number("STEMDECK_UPLOAD_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = get("STEMDECK_POLL_INTERVAL_MS") {
            self.poll_interval_ms = parse_number("STEMDECK_POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = get("STEMDECK_MAX_POLLS") {
            self.max_polls = parse_number("STEMDECK_MAX_POLLS", &v)?;
        }
        if let Some(v) = get("STEMDECK_MAX_POLL_DURATION_MS") {
            self.max_poll_duration_ms = parse_number("STEMDECK_MAX_POLL_DURATION_MS", &v)?;
        }
        if let Some(v) = get("STEMDECK_PROGRESS_TICK_MS") {
            self.progress_tick_ms = parse_number("STEMDECK_PROGRESS_TICK_MS", &v)?;
        }
        if let Some(v) = get("STEMDECK_SIGNED_URLS") {
            self.signed_urls = parse_bool("STEMDECK_SIGNED_URLS", &v)?;
        }
        if let Some(v) = get("STEMDECK_SIGNED_URL_TTL_SECS") {
            self.signed_url_ttl_secs = parse_number("STEMDECK_SIGNED_URL_TTL_SECS", &v)?;
        }

        Ok(())
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = max_polls;
        self
    }

    pub fn with_progress_tick(mut self, tick: Duration) -> Self {
        self.progress_tick_ms = tick.as_millis() as u64;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Check that the backend is usable and return the parsed endpoint.
    pub fn validate(&self) -> Result<Url> {
        let raw = self
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| {
                StemError::configuration("no separation endpoint configured (STEMDECK_ENDPOINT)")
            })?;

        let endpoint = Url::parse(raw).map_err(|e| {
            StemError::configuration(format!("malformed endpoint '{}': {}", raw, e))
        })?;

        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(StemError::configuration(format!(
                "endpoint '{}' must use http or https",
                raw
            )));
        }

        if self.default_model.trim().is_empty() {
            return Err(StemError::configuration("no default separation model configured"));
        }

        if self.poll_interval_ms == 0 || self.max_polls == 0 {
            return Err(StemError::configuration(
                "poll interval and max polls must be greater than zero",
            ));
        }

        Ok(endpoint)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_millis(self.upload_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_poll_duration(&self) -> Duration {
        Duration::from_millis(self.max_poll_duration_ms)
    }

    pub fn progress_tick(&self) -> Duration {
        Duration::from_millis(self.progress_tick_ms.max(1))
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        StemError::configuration(format!("{} must be a number, got '{}'", key, value))
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(StemError::configuration(format!(
            "{} must be true or false, got '{}'",
            key, value
        ))),
    }
}

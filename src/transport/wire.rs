//! Response bodies of the separation service

use serde::Deserialize;
use serde_json::Value;

use super::{JobStatus, RemoteJobState, StemMap};

/// Synchronous invoke response, and the error payload of any failed request
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InvokeResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub details: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
}

impl InvokeResponse {
    /// Error text, if the body reports one
    pub fn error_message(&self) -> Option<String> {
        self.error
            .as_ref()
            .and_then(render)
            .or_else(|| self.message.clone().filter(|m| !m.trim().is_empty()))
    }

    pub fn details_text(&self) -> Option<String> {
        self.details.as_ref().and_then(render)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitResponse {
    #[serde(alias = "jobId", alias = "job_id")]
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusResponse {
    pub status: RemoteJobState,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<Value>,
    #[serde(default, alias = "logs")]
    pub details: Option<Value>,
    #[serde(default)]
    pub progress: Option<f64>,
}

impl From<StatusResponse> for JobStatus {
    fn from(response: StatusResponse) -> Self {
        JobStatus {
            state: response.status,
            output: response.output.map(stem_map),
            error: response.error.as_ref().and_then(render),
            details: response.details.as_ref().and_then(render),
            progress: response.progress.filter(|p| p.is_finite()),
        }
    }
}

/// Output values that are not objects carry no stems
pub(crate) fn stem_map(output: Value) -> StemMap {
    match output {
        Value::Object(map) => map,
        _ => StemMap::new(),
    }
}

/// Human-readable text of a string or structured diagnostic
fn render(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| Some(value.to_string())),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_invoke_error_payload() {
        let body: InvokeResponse = serde_json::from_value(json!({
            "error": "model crashed",
            "errorType": "OOM",
            "details": {"gpu": "out of memory"}
        }))
        .unwrap();
        assert_eq!(body.error_message().as_deref(), Some("model crashed"));
        assert_eq!(body.error_type.as_deref(), Some("OOM"));
        assert_eq!(
            body.details_text().as_deref(),
            Some(r#"{"gpu":"out of memory"}"#)
        );
    }

    #[test]
    fn test_status_response_into_job_status() {
        let body: StatusResponse = serde_json::from_value(json!({
            "status": "succeeded",
            "output": {"vocals": "https://cdn/v.mp3"},
            "progress": 1.0
        }))
        .unwrap();
        let status = JobStatus::from(body);
        assert_eq!(status.state, RemoteJobState::Succeeded);
        assert_eq!(status.output.unwrap().len(), 1);
        assert_eq!(status.progress, Some(1.0));
    }

    #[test]
    fn test_non_object_output_is_empty() {
        assert!(stem_map(json!("https://cdn/mix.mp3")).is_empty());
        assert!(stem_map(Value::Null).is_empty());
    }
}

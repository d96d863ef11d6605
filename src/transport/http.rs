//! HTTP plumbing shared by both transports

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use super::wire::InvokeResponse;
use crate::config::BackendConfig;
use crate::error::{Result, StemError};

pub(crate) struct HttpClient {
    client: reqwest::Client,
    endpoint: Url,
    api_token: Option<String>,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let endpoint = config.validate()?;
        let timeout = config.request_timeout();

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StemError::configuration(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            api_token: config.api_token.clone().filter(|t| !t.trim().is_empty()),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Endpoint with `segments` appended to its path
    pub fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| {
                StemError::configuration(format!("endpoint '{}' cannot take a path", self.endpoint))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    pub fn post(&self, url: Url) -> RequestBuilder {
        self.authorize(self.client.post(url))
    }

    pub fn get(&self, url: Url) -> RequestBuilder {
        self.authorize(self.client.get(url))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a request, mapping network failures and error statuses
    pub async fn send(&self, request: RequestBuilder, operation: &str) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| self.map_error(e, operation))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(self.status_error(status, &body))
    }

    /// Read and decode a JSON body
    pub async fn json<T: DeserializeOwned>(&self, response: Response, operation: &str) -> Result<T> {
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.map_error(e, operation))?;

        serde_json::from_slice(&bytes).map_err(|e| StemError::RemoteProcessing {
            message: format!("malformed {} response from separation service", operation),
            error_type: None,
            details: Some(e.to_string()),
        })
    }

    pub fn map_error(&self, error: reqwest::Error, operation: &str) -> StemError {
        if error.is_timeout() {
            StemError::Timeout {
                operation: operation.to_string(),
                elapsed_ms: self.timeout.as_millis() as u64,
            }
        } else if error.is_decode() {
            StemError::RemoteProcessing {
                message: format!("unreadable {} response from separation service", operation),
                error_type: None,
                details: Some(error.to_string()),
            }
        } else {
            StemError::RemoteUnreachable {
                endpoint: self.endpoint.to_string(),
                reason: error.to_string(),
            }
        }
    }

    fn status_error(&self, status: StatusCode, body: &str) -> StemError {
        if matches!(
            status,
            StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
        ) {
            return StemError::RemoteUnreachable {
                endpoint: self.endpoint.to_string(),
                reason: format!("service returned {}", status),
            };
        }

        let payload: InvokeResponse = serde_json::from_str(body).unwrap_or_default();
        let details = payload
            .details_text()
            .or_else(|| (!body.trim().is_empty() && payload.error.is_none()).then(|| body.trim().to_string()));

        StemError::RemoteProcessing {
            message: payload
                .error_message()
                .unwrap_or_else(|| format!("service returned {}", status)),
            error_type: payload.error_type,
            details,
        }
    }
}

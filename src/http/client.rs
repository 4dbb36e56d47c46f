//! HTTP client for endpoint checks

use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Client, Method,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use super::grpc::{self, GrpcRequest, GrpcResponse};
use crate::retry::AttemptError;

/// HTTP client errors
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Connection refused to {0}")]
    ConnectionRefused(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to build client: {0}")]
    Client(String),
}

impl From<HttpError> for AttemptError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Timeout(_) | HttpError::ConnectionRefused(_) | HttpError::RequestFailed(_) => {
                AttemptError::Unreachable(err.to_string())
            }
            HttpError::InvalidUrl(_) | HttpError::InvalidRequest(_) | HttpError::Client(_) => {
                AttemptError::Fatal(err.to_string())
            }
        }
    }
}

/// HTTP client for testing
///
/// Load balancers in test accounts carry self-signed certificates, so
/// certificate errors are ignored.
#[derive(Clone, Debug)]
pub struct HttpClient {
    client: Client,
    default_headers: HeaderMap,
    timeout_secs: u64,
}

impl HttpClient {
    /// Create client with custom timeout
    pub fn with_timeout(timeout_secs: u64) -> Result<Self, HttpError> {
        let timeout = Duration::from_secs(timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| HttpError::Client(e.to_string()))?;

        Ok(Self {
            client,
            default_headers: HeaderMap::new(),
            timeout_secs,
        })
    }

    /// Add default header
    pub fn default_header(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self, HttpError> {
        let header_name = HeaderName::from_bytes(key.as_ref().as_bytes())
            .map_err(|e| HttpError::InvalidRequest(format!("Invalid header name: {e}")))?;
        let header_value = HeaderValue::from_str(value.as_ref())
            .map_err(|e| HttpError::InvalidRequest(format!("Invalid header value: {e}")))?;
        self.default_headers.insert(header_name, header_value);
        Ok(self)
    }

    fn classify(&self, url: &str, e: reqwest::Error) -> HttpError {
        if e.is_timeout() {
            HttpError::Timeout(self.timeout_secs)
        } else if e.is_connect() {
            HttpError::ConnectionRefused(url.to_string())
        } else if e.is_builder() {
            HttpError::InvalidUrl(format!("{url}: {e}"))
        } else {
            HttpError::RequestFailed(e.to_string())
        }
    }

    /// Send HTTP request
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let url = request.url.clone();
        reqwest::Url::parse(&url).map_err(|e| HttpError::InvalidUrl(format!("{url}: {e}")))?;
        debug!("Sending {} request to {}", request.method, url);

        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|_| HttpError::InvalidRequest(format!("Invalid HTTP method: {}", request.method)))?;

        let mut req_builder = self.client.request(method, &url);
        for (key, value) in &self.default_headers {
            req_builder = req_builder.header(key, value);
        }
        for (key, value) in &request.headers {
            req_builder = req_builder.header(key.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            req_builder = req_builder.body(body.clone());
        }

        let start = std::time::Instant::now();
        let response = req_builder.send().await.map_err(|e| self.classify(&url, e))?;

        let status = response.status();
        let headers = header_map(response.headers());
        let body = response
            .text()
            .await
            .map_err(|e| HttpError::RequestFailed(format!("Failed to read response body: {e}")))?;
        let duration_ms = start.elapsed().as_millis() as u64;

        debug!(
            "Response: {} {} in {}ms",
            status.as_u16(),
            status.canonical_reason().unwrap_or(""),
            duration_ms
        );

        Ok(HttpResponse {
            status_code: status.as_u16(),
            headers,
            body,
            duration_ms,
        })
    }

    /// Unary gRPC call; `url` is the server root, `request.path` the method
    pub async fn grpc_call(&self, url: &str, request: &GrpcRequest) -> Result<GrpcResponse, HttpError> {
        debug!("Calling gRPC {}{}", url.trim_end_matches('/'), request.path);
        let channel = grpc::connect(url, Duration::from_secs(self.timeout_secs)).await?;
        grpc::unary(channel, request).await
    }
}

fn header_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(key, value)| value.to_str().ok().map(|v| (key.to_string(), v.to_string())))
        .collect()
}

/// HTTP request builder
#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: HashMap::new(),
            body: None,
        }
    }

    pub fn headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// HTTP response
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status_code: u16,
    pub headers: HashMap<String, String>,
    pub body: String,
    pub duration_ms: u64,
}

impl HttpResponse {
    pub fn body_contains(&self, text: &str) -> bool {
        self.body.contains(text)
    }
}

//! # Outbound HTTP
//!
//! The narrow client interface used by the `http` and `ai` capability
//! modules. Production code uses [`ReqwestClient`]; tests substitute their
//! own implementation of [`HttpClient`].
//!
//! The client itself knows nothing about invocation deadlines. Capability
//! modules race every `send` against the invocation's cancellation token.

mod client;
mod errors;

pub use client::ReqwestClient;
pub use errors::{HttpError, HttpResult};

use std::collections::BTreeMap;

use async_trait::async_trait;

/// An outbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into().to_uppercase(),
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Reject anything that is not an absolute `http`/`https` URL
    pub fn validate(&self) -> HttpResult<()> {
        if self.method.is_empty() {
            return Err(HttpError::InvalidRequest("method is required".into()));
        }
        let parsed = url::Url::parse(&self.url)
            .map_err(|e| HttpError::InvalidRequest(format!("invalid url {}: {}", self.url, e)))?;
        match parsed.scheme() {
            "http" | "https" => Ok(()),
            other => Err(HttpError::InvalidRequest(format!(
                "unsupported url scheme: {}",
                other
            ))),
        }
    }
}

/// A received response; non-2xx statuses are still responses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    /// Lowercased header names; repeated headers joined with `, `
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Outbound HTTP client
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: HttpRequest) -> HttpResult<HttpResponse>;

    /// POST a JSON body with extra headers
    async fn post_json(
        &self,
        url: &str,
        headers: BTreeMap<String, String>,
        body: &serde_json::Value,
    ) -> HttpResult<HttpResponse> {
        let body = serde_json::to_string(body)
            .map_err(|e| HttpError::InvalidRequest(format!("failed to encode body: {}", e)))?;
        let mut request = HttpRequest::new("POST", url)
            .header("Content-Type", "application/json")
            .body(body);
        request.headers.extend(headers);
        self.send(request).await
    }
}

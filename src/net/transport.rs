//! HTTP transport seam.
//!
//! `Transport` is the only place bytes leave the process. `ApiClient` talks
//! to it through a trait object so tests substitute a scripted transport the
//! same way the LLM layer is mocked.

use std::time::Duration;

use super::types::{ApiError, HttpRequest, HttpResponse, Method};
use crate::config::HttpTimeouts;

/// Provider-neutral async HTTP call. Enables mocking in tests.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and return the raw status and body.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Network`] when no response was received. Non-2xx
    /// statuses are not errors at this layer.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError>;
}

// =============================================================================
// REQWEST
// =============================================================================

/// `reqwest`-backed transport with a cookie jar, so the session cookie set by
/// `/login` rides along on later calls.
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(timeouts: HttpTimeouts) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            // Slightly above the coalescer bound so the coalescer reports the timeout.
            .timeout(timeouts.request() + Duration::from_secs(1))
            .connect_timeout(timeouts.connect())
            .cookie_store(true)
            .build()
            .map_err(|e| ApiError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http })
    }
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let mut builder = self
            .http
            .request(to_reqwest_method(request.method), &request.url);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(map_send_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_send_error)?;
        Ok(HttpResponse { status, body })
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn map_send_error(e: reqwest::Error) -> ApiError {
    if e.is_builder() {
        ApiError::InvalidUrl(e.to_string())
    } else {
        ApiError::Network(e.to_string())
    }
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;

//! Network types — request identity, raw HTTP values, and API errors.
//!
//! DESIGN
//! ======
//! `ApiError` is `Clone` because a single settled value is handed to every
//! caller that joined the same in-flight request. Error bodies from the
//! backend carry `{error}` or `{detail}` (string or `{message}` object);
//! `decode_error_body` folds both shapes into one message.

use std::fmt;

use serde::Deserialize;

use crate::error::ErrorCode;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by REST calls, shared by every joined caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The call did not settle within the configured bound.
    #[error("request timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// The call was aborted before it settled.
    #[error("request cancelled")]
    Cancelled,

    /// The server answered with a non-2xx status.
    #[error("{message}")]
    Api { message: String, status: Option<u16> },

    /// Transport failure before any response arrived.
    #[error("network error: {0}")]
    Network(String),

    /// A 2xx body could not be deserialized into the expected type.
    #[error("response decode failed: {0}")]
    Decode(String),

    /// The endpoint could not be joined onto the base URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// The request task ended without producing a result.
    #[error("request task failed: {0}")]
    Internal(String),
}

impl ApiError {
    /// HTTP status attached to a server-reported failure, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => *status,
            _ => None,
        }
    }

    #[must_use]
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }
}

impl ErrorCode for ApiError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "E_TIMEOUT",
            Self::Cancelled => "E_CANCELLED",
            Self::Api { .. } => "E_API",
            Self::Network(_) => "E_NETWORK",
            Self::Decode(_) => "E_DECODE",
            Self::InvalidUrl(_) => "E_INVALID_URL",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
            Self::Internal(_) => "E_INTERNAL",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Network(_) | Self::Api { status: Some(429 | 500..=599), .. })
    }
}

// =============================================================================
// REQUEST IDENTITY
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deduplication key: method, full URL, and serialized body. Equality and
/// hashing cover all three; `Display` and `Debug` omit the body.
///
/// A missing body serializes as `{}` so that a bodyless POST and a POST with
/// an empty object are the same logical request.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct RequestSignature {
    method: Method,
    url: String,
    body: String,
}

impl RequestSignature {
    #[must_use]
    pub fn new(method: Method, url: &str, body: Option<&serde_json::Value>) -> Self {
        let body = body.map_or_else(|| "{}".to_owned(), serde_json::Value::to_string);
        Self { method, url: url.to_owned(), body }
    }

    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Log form: method, URL, and body size. The body can carry credentials
/// and note text.
impl fmt::Display for RequestSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({}B body)", self.method, self.url, self.body.len())
    }
}

impl fmt::Debug for RequestSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSignature")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("body_len", &self.body.len())
            .finish()
    }
}

// =============================================================================
// RAW HTTP VALUES
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// =============================================================================
// RESPONSE DECODING
// =============================================================================

#[derive(Deserialize, Default)]
struct ErrorBody {
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

/// Turn a raw response into JSON, or into `ApiError::Api` for non-2xx.
///
/// An empty 2xx body decodes as `null`.
///
/// # Errors
///
/// Returns `ApiError::Api` for non-2xx statuses and `ApiError::Decode` when a
/// 2xx body is not JSON.
pub fn decode_response(response: &HttpResponse) -> Result<serde_json::Value, ApiError> {
    if !response.is_success() {
        return Err(decode_error_body(response.status, &response.body));
    }
    if response.body.trim().is_empty() {
        return Ok(serde_json::Value::Null);
    }
    serde_json::from_str(&response.body).map_err(|e| ApiError::Decode(e.to_string()))
}

/// Build the error for a non-2xx response body.
///
/// Message precedence: `error`, then `detail.message` when `detail` is an
/// object, then `detail` itself, then `HTTP <status>`.
#[must_use]
pub fn decode_error_body(status: u16, body: &str) -> ApiError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .error
        .as_ref()
        .and_then(value_text)
        .or_else(|| match parsed.detail.as_ref() {
            Some(serde_json::Value::Object(map)) => map.get("message").and_then(value_text),
            Some(other) => value_text(other),
            None => None,
        })
        .unwrap_or_else(|| format!("HTTP {status}"));
    ApiError::Api { message: rewrite_known_message(&message), status: Some(status) }
}

fn value_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Null | serde_json::Value::String(_) => None,
        other => Some(other.to_string()),
    }
}

const AI_NOT_CONFIGURED_HINT: &str = "请先配置AI API：在页面顶部填写API地址和密钥，然后点击登录";
const AI_CONNECTION_HINT: &str = "AI服务连接失败，请检查API地址和模型名称是否正确";
const AI_BAD_KEY_HINT: &str = "AI API密钥无效，请检查API密钥是否正确";

/// Replace backend AI-configuration messages with actionable hints.
fn rewrite_known_message(message: &str) -> String {
    if message.contains("请先配置AI API") || message.contains("未配置 AI API") {
        AI_NOT_CONFIGURED_HINT.to_owned()
    } else if message.contains("AI服务连接失败") || message.contains("API地址和模型名称") {
        AI_CONNECTION_HINT.to_owned()
    } else if message.contains("API密钥无效") {
        AI_BAD_KEY_HINT.to_owned()
    } else {
        message.to_owned()
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;

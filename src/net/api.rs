//! REST client for the notes backend.
//!
//! DESIGN
//! ======
//! Every call funnels through `ApiClient::request`, which derives a
//! `RequestSignature` and hands the network work to the shared
//! `RequestCoalescer`. A burst of identical calls (a re-render firing the
//! same GET three times) costs one round trip. Typed endpoint methods
//! decode the shared JSON value per caller.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::coalesce::{CoalescerStats, CoalescerStatus, RequestCoalescer};
use super::transport::{ReqwestTransport, Transport};
use super::types::{ApiError, HttpRequest, Method, RequestSignature, decode_response};
use crate::config::ClientConfig;
use crate::models::{
    Credentials, MessageResponse, Note, NoteDraft, NoteUpdate, OptimizeRequest, OptimizeResponse, SessionConfig,
    Stats,
};

// =============================================================================
// ENDPOINTS
// =============================================================================

pub const LOGIN: &str = "/login";
pub const LOGOUT: &str = "/logout";
pub const CONFIG: &str = "/config";
pub const NOTES: &str = "/notes";
pub const NOTE: &str = "/note";
pub const SEARCH: &str = "/search";
pub const NOTES_BY_CATEGORY: &str = "/notes/by_category";
pub const NOTES_BY_TAG: &str = "/notes/by_tag";
pub const STATS: &str = "/stats";
pub const CATEGORIES: &str = "/categories";
pub const TAGS: &str = "/tags";
pub const OPTIMIZE: &str = "/optimize";

// =============================================================================
// CLIENT
// =============================================================================

/// Cheap to clone; clones share the transport and the in-flight map.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    coalescer: RequestCoalescer<RequestSignature, serde_json::Value>,
}

impl ApiClient {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            coalescer: RequestCoalescer::new(timeout),
        }
    }

    /// Build a client backed by `reqwest` from typed config.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ApiError> {
        let transport = ReqwestTransport::new(config.timeouts)?;
        Ok(Self::new(Arc::new(transport), config.api_base.clone(), config.timeouts.request()))
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue a request, joining an identical one already in flight.
    ///
    /// # Errors
    ///
    /// Returns the shared call's [`ApiError`].
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(&str, &str)],
        body: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, ApiError> {
        let url = self.url(endpoint, query)?;
        let signature = RequestSignature::new(method, &url, body.as_ref());
        let transport = Arc::clone(&self.transport);
        self.coalescer
            .execute(signature, move || async move {
                debug!(%method, %url, "api: sending request");
                let response = transport
                    .send(HttpRequest { method, url, body })
                    .await?;
                decode_response(&response)
            })
            .await
    }

    /// Join `endpoint` onto the base URL, percent-encoding any query pairs.
    fn url(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<String, ApiError> {
        let raw = format!("{}{endpoint}", self.base_url);
        if query.is_empty() {
            return Ok(raw);
        }
        let mut url = reqwest::Url::parse(&raw).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        url.query_pairs_mut().extend_pairs(query);
        Ok(url.into())
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(&str, &str)],
        body: Option<serde_json::Value>,
    ) -> Result<T, ApiError> {
        let value = self.request(method, endpoint, query, body).await?;
        serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<T, ApiError> {
        self.call(Method::Get, endpoint, query, None).await
    }

    async fn send_json<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_value(body).map_err(|e| ApiError::Decode(e.to_string()))?;
        self.call(method, endpoint, &[], Some(body)).await
    }

    // -------------------------------------------------------------------------
    // auth
    // -------------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns the backend's error when the AI endpoint cannot be reached or
    /// the key is rejected.
    pub async fn login(&self, credentials: &Credentials) -> Result<MessageResponse, ApiError> {
        self.send_json(Method::Post, LOGIN, credentials).await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn logout(&self) -> Result<MessageResponse, ApiError> {
        self.call(Method::Post, LOGOUT, &[], None).await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn config(&self) -> Result<SessionConfig, ApiError> {
        self.get(CONFIG, &[]).await
    }

    // -------------------------------------------------------------------------
    // notes
    // -------------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn list_notes(&self) -> Result<Vec<Note>, ApiError> {
        self.get(NOTES, &[]).await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails or the note does not exist.
    pub async fn get_note(&self, id: i64) -> Result<Note, ApiError> {
        let id = id.to_string();
        self.get(NOTE, &[("id", id.as_str())]).await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn create_note(&self, draft: &NoteDraft) -> Result<Note, ApiError> {
        self.send_json(Method::Post, NOTE, draft).await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn update_note(&self, id: i64, draft: &NoteDraft) -> Result<Note, ApiError> {
        self.send_json(Method::Put, NOTE, &NoteUpdate { id, draft })
            .await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn delete_note(&self, id: i64) -> Result<MessageResponse, ApiError> {
        let id = id.to_string();
        self.call(Method::Delete, NOTE, &[("id", id.as_str())], None)
            .await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn search(&self, query: &str) -> Result<Vec<Note>, ApiError> {
        self.get(SEARCH, &[("query", query)]).await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn notes_by_category(&self, category: &str) -> Result<Vec<Note>, ApiError> {
        self.get(NOTES_BY_CATEGORY, &[("category", category)])
            .await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn notes_by_tag(&self, tag: &str) -> Result<Vec<Note>, ApiError> {
        self.get(NOTES_BY_TAG, &[("tag", tag)]).await
    }

    // -------------------------------------------------------------------------
    // stats
    // -------------------------------------------------------------------------

    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn stats(&self) -> Result<Stats, ApiError> {
        self.get(STATS, &[]).await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn categories(&self) -> Result<Vec<String>, ApiError> {
        self.get(CATEGORIES, &[]).await
    }

    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn tags(&self) -> Result<Vec<String>, ApiError> {
        self.get(TAGS, &[]).await
    }

    // -------------------------------------------------------------------------
    // ai
    // -------------------------------------------------------------------------

    /// Raw optimize call. Callers normally go through `AiOptimizer`, which
    /// limits the application to one outstanding rewrite.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn optimize(&self, request: &OptimizeRequest) -> Result<OptimizeResponse, ApiError> {
        self.send_json(Method::Post, OPTIMIZE, request).await
    }

    // -------------------------------------------------------------------------
    // in-flight map
    // -------------------------------------------------------------------------

    /// Abort every in-flight request; joined callers receive `Cancelled`.
    pub fn cancel_pending(&self) -> usize {
        self.coalescer.cancel_all()
    }

    /// Forget in-flight entries without aborting them.
    pub fn clear_request_cache(&self) {
        self.coalescer.clear();
    }

    #[must_use]
    pub fn cache_status(&self) -> CoalescerStatus<RequestSignature> {
        self.coalescer.status()
    }

    #[must_use]
    pub fn cache_stats(&self) -> CoalescerStats {
        self.coalescer.stats()
    }
}

#[cfg(test)]
#[path = "api_test.rs"]
mod tests;

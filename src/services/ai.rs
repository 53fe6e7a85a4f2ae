//! AI service — single-flight note optimization.
//!
//! DESIGN
//! ======
//! At most one optimize call is outstanding per `AiOptimizer`. The first
//! caller spawns the flight and parks a shared handle in the slot; any caller
//! arriving before it settles awaits that handle instead of issuing its own
//! request, even when its content or prompt differ. The slot is filled under
//! its lock and the task is spawned after the lock is released. The task
//! clears the slot itself when it settles, tagged with a generation so a
//! flight orphaned by `reset_state` cannot clear a newer one.
//!
//! TRADE-OFFS
//! ==========
//! First-caller-wins means a late caller may receive a rewrite of text it
//! did not send. That mirrors a UI where only one AI button can be active;
//! callers that care must check `is_optimizing` first.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::channel::oneshot;
use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use crate::error::ErrorCode;
use crate::models::{Graph, OptimizeRequest, OptimizeResponse, Tags};
use crate::net::api::ApiClient;
use crate::net::types::ApiError;

pub const DEFAULT_CATEGORY: &str = "其他";
pub const DEFAULT_TAGS: &str = "未分类";

type SharedFlight = Shared<BoxFuture<'static, Result<OptimizationResult, AiError>>>;
type Settle = oneshot::Sender<Result<OptimizationResult, AiError>>;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AiError {
    /// Another optimization already owns the slot.
    #[error("AI优化重写正在进行中，请稍候...")]
    Busy,
    /// The request was dropped by de-duplication. Not user-facing.
    #[error("请求已取消，请勿重复点击")]
    Cancelled,
    #[error("请先登录")]
    Unauthenticated,
    #[error("AI request timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
    #[error("{message}")]
    Failure { message: String },
}

impl ErrorCode for AiError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Busy => "E_AI_BUSY",
            Self::Cancelled => "E_AI_CANCELLED",
            Self::Unauthenticated => "E_UNAUTHENTICATED",
            Self::Timeout { .. } => "E_TIMEOUT",
            Self::Failure { .. } => "E_AI_FAILURE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Busy | Self::Timeout { .. })
    }
}

impl From<ApiError> for AiError {
    fn from(e: ApiError) -> Self {
        if e.is_unauthenticated() {
            return Self::Unauthenticated;
        }
        match e {
            ApiError::Cancelled => Self::Cancelled,
            ApiError::Timeout { after_ms } => Self::Timeout { after_ms },
            other => Self::Failure { message: other.to_string() },
        }
    }
}

/// What the backend did with the note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizeMode {
    /// No prompt: suggest title, category, tags, and a cleaned-up body.
    Analyze,
    /// Prompted rewrite of the body.
    Rewrite,
}

impl OptimizeMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::Rewrite => "rewrite",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "analyze" | "analysis" => Some(Self::Analyze),
            "rewrite" | "optimize" => Some(Self::Rewrite),
            _ => None,
        }
    }
}

/// An optimize response with every field filled in.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationResult {
    pub title: String,
    pub optimized: String,
    pub category: String,
    pub tags: Tags,
    pub key_points: Vec<String>,
    pub graph: Graph,
    pub mode: OptimizeMode,
}

impl OptimizationResult {
    /// Apply defaults for anything the backend left out. An empty string
    /// counts as missing; an empty tag list from the backend is kept.
    #[must_use]
    pub fn from_response(response: OptimizeResponse, content: &str, prompt: Option<&str>) -> Self {
        let inferred = if prompt.is_some() { OptimizeMode::Rewrite } else { OptimizeMode::Analyze };
        Self {
            title: response.title.unwrap_or_default(),
            optimized: non_empty(response.optimized).unwrap_or_else(|| content.to_owned()),
            category: non_empty(response.category).unwrap_or_else(|| DEFAULT_CATEGORY.to_owned()),
            tags: response.tags.unwrap_or_else(|| Tags::parse(DEFAULT_TAGS)),
            key_points: response.key_points.unwrap_or_default(),
            graph: response.graph.unwrap_or_default(),
            mode: response
                .mode
                .as_deref()
                .and_then(OptimizeMode::parse)
                .unwrap_or(inferred),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

// =============================================================================
// OPTIMIZER
// =============================================================================

struct Flight {
    generation: u64,
    outcome: SharedFlight,
}

#[derive(Default)]
struct Slot {
    next_generation: u64,
    current: Option<Flight>,
}

/// Single-flight front for `POST /optimize`. Clones share the slot.
#[derive(Clone)]
pub struct AiOptimizer {
    api: ApiClient,
    slot: Arc<Mutex<Slot>>,
}

impl AiOptimizer {
    #[must_use]
    pub fn new(api: ApiClient) -> Self {
        Self { api, slot: Arc::new(Mutex::new(Slot::default())) }
    }

    /// Optimize `content`, or join the optimization already in progress.
    ///
    /// A caller that joins receives the first caller's result, not one for
    /// its own arguments. A blank prompt is treated as no prompt.
    ///
    /// # Errors
    ///
    /// The starting caller gets [`AiError::Busy`] if its request was
    /// cancelled underneath it; joined callers get [`AiError::Cancelled`]
    /// for the same event so only one of them reports it. Other failures
    /// reach every caller unchanged.
    pub async fn optimize(&self, content: &str, prompt: Option<&str>) -> Result<OptimizationResult, AiError> {
        let prompt = prompt.map(str::trim).filter(|p| !p.is_empty());
        let (outcome, launch) = {
            let mut slot = self.lock();
            if let Some(flight) = &slot.current {
                debug!(generation = flight.generation, "ai: joining in-flight optimization");
                (flight.outcome.clone(), None)
            } else {
                let generation = slot.next_generation;
                slot.next_generation += 1;
                info!(generation, content_len = content.len(), has_prompt = prompt.is_some(), "ai: optimization started");
                let (settle, settled) = oneshot::channel();
                let outcome = async move {
                    settled.await.unwrap_or_else(|_| {
                        Err(AiError::Failure { message: "optimization task ended without a result".into() })
                    })
                }
                .boxed()
                .shared();
                slot.current = Some(Flight { generation, outcome: outcome.clone() });
                (outcome, Some((generation, settle)))
            }
        };
        let started = launch.is_some();
        // Spawned outside the slot lock; a refused task releases the slot on drop.
        if let Some((generation, settle)) = launch {
            self.spawn(generation, settle, content.to_owned(), prompt.map(str::to_owned));
        }

        match outcome.await {
            Err(AiError::Cancelled) if started => Err(AiError::Busy),
            other => other,
        }
    }

    fn spawn(&self, generation: u64, settle: Settle, content: String, prompt: Option<String>) {
        let api = self.api.clone();
        let release = SlotRelease { slot: Arc::clone(&self.slot), generation };
        tokio::spawn(async move {
            let release = release;
            let request = OptimizeRequest { content, prompt };
            let result = api
                .optimize(&request)
                .await
                .map(|resp| OptimizationResult::from_response(resp, &request.content, request.prompt.as_deref()))
                .map_err(AiError::from);
            drop(release);
            match &result {
                Ok(r) => info!(generation, mode = ?r.mode, "ai: optimization settled"),
                Err(e) => warn!(generation, error = %e, code = e.error_code(), "ai: optimization failed"),
            }
            let _ = settle.send(result);
        });
    }

    #[must_use]
    pub fn is_optimizing(&self) -> bool {
        self.lock().current.is_some()
    }

    /// Forget the current flight so the next call starts a new one.
    ///
    /// The network call is not cancelled; callers already joined still get
    /// its result.
    pub fn reset_state(&self) {
        if let Some(flight) = self.lock().current.take() {
            info!(generation = flight.generation, "ai: optimization state reset");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        lock_slot(&self.slot)
    }
}

fn lock_slot(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Clears the slot on drop if it still holds `generation`, so a flight
/// that panics or is never polled frees it too.
struct SlotRelease {
    slot: Arc<Mutex<Slot>>,
    generation: u64,
}

impl Drop for SlotRelease {
    fn drop(&mut self) {
        let mut slot = lock_slot(&self.slot);
        if slot.current.as_ref().is_some_and(|f| f.generation == self.generation) {
            slot.current = None;
        }
    }
}

#[cfg(test)]
#[path = "ai_test.rs"]
mod tests;

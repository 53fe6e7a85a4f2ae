use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde_json::json;

use crate::net::transport::Transport;
use crate::net::types::{HttpRequest, HttpResponse};

// =========================================================================
// EchoTransport
// =========================================================================

/// Answers `/optimize` with `"<content>-rewritten"` after `delay`, or with a
/// fixed status and body when one is set.
struct EchoTransport {
    delay: Duration,
    fixed: Option<(u16, serde_json::Value)>,
    calls: AtomicUsize,
}

impl EchoTransport {
    fn new(delay: Duration) -> Self {
        Self { delay, fixed: None, calls: AtomicUsize::new(0) }
    }

    fn fixed(status: u16, body: serde_json::Value) -> Self {
        Self { delay: Duration::ZERO, fixed: Some((status, body)), calls: AtomicUsize::new(0) }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Transport for EchoTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if let Some((status, body)) = &self.fixed {
            return Ok(HttpResponse { status: *status, body: body.to_string() });
        }
        let body = request.body.unwrap_or_default();
        let content = body["content"].as_str().unwrap_or_default();
        Ok(HttpResponse { status: 200, body: json!({ "optimized": format!("{content}-rewritten") }).to_string() })
    }
}

fn api(stub: &Arc<EchoTransport>, timeout: Duration) -> ApiClient {
    let transport: Arc<dyn Transport> = stub.clone();
    ApiClient::new(transport, "http://notes.test/api", timeout)
}

fn optimizer(stub: &Arc<EchoTransport>) -> AiOptimizer {
    AiOptimizer::new(api(stub, Duration::from_secs(300)))
}

fn spawn_optimize(
    ai: &AiOptimizer,
    content: &'static str,
    prompt: Option<&'static str>,
) -> tokio::task::JoinHandle<Result<OptimizationResult, AiError>> {
    let ai = ai.clone();
    tokio::spawn(async move { ai.optimize(content, prompt).await })
}

// =========================================================================
// single flight
// =========================================================================

#[tokio::test(start_paused = true)]
async fn late_caller_receives_first_callers_result() {
    let stub = Arc::new(EchoTransport::new(Duration::from_millis(100)));
    let ai = optimizer(&stub);

    let first = spawn_optimize(&ai, "A", Some("p1"));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(ai.is_optimizing());

    let second = ai.optimize("B", Some("p2")).await.unwrap();
    let first = first.await.unwrap().unwrap();

    assert_eq!(first.optimized, "A-rewritten");
    assert_eq!(second.optimized, "A-rewritten");
    assert_eq!(stub.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_share_one_http_call() {
    let stub = Arc::new(EchoTransport::new(Duration::from_millis(50)));
    let ai = optimizer(&stub);

    let (a, b, c) = tokio::join!(ai.optimize("x", None), ai.optimize("y", None), ai.optimize("z", Some("p")));

    assert_eq!(stub.calls(), 1);
    let a = a.unwrap();
    assert_eq!(a, b.unwrap());
    assert_eq!(a, c.unwrap());
}

#[tokio::test(start_paused = true)]
async fn slot_is_empty_after_settle() {
    let stub = Arc::new(EchoTransport::new(Duration::from_millis(20)));
    let ai = optimizer(&stub);

    ai.optimize("A", None).await.unwrap();
    assert!(!ai.is_optimizing());

    let again = ai.optimize("B", None).await.unwrap();
    assert_eq!(again.optimized, "B-rewritten");
    assert_eq!(stub.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn slot_is_empty_after_failure() {
    let stub = Arc::new(EchoTransport::fixed(500, json!({ "detail": "boom" })));
    let ai = optimizer(&stub);

    let err = ai.optimize("A", None).await.unwrap_err();

    assert_eq!(err, AiError::Failure { message: "boom".into() });
    assert!(!ai.is_optimizing());
}

// =========================================================================
// reset_state
// =========================================================================

#[tokio::test(start_paused = true)]
async fn reset_starts_a_new_flight_and_stale_flight_keeps_its_hands_off() {
    let stub = Arc::new(EchoTransport::new(Duration::from_millis(100)));
    let ai = optimizer(&stub);

    let first = spawn_optimize(&ai, "A", None);
    tokio::time::sleep(Duration::from_millis(10)).await;
    ai.reset_state();
    assert!(!ai.is_optimizing());

    let second = spawn_optimize(&ai, "B", None);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(stub.calls(), 2);

    // First settles at 100ms; second is still running until 110ms.
    tokio::time::sleep(Duration::from_millis(85)).await;
    assert_eq!(first.await.unwrap().unwrap().optimized, "A-rewritten");
    assert!(ai.is_optimizing());

    assert_eq!(second.await.unwrap().unwrap().optimized, "B-rewritten");
    assert!(!ai.is_optimizing());
}

#[test]
fn refused_spawn_fails_and_frees_the_slot() {
    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    let handle = rt.handle().clone();
    drop(rt);
    // Spawning on a shut-down runtime drops the task future on the spot.
    let _ctx = handle.enter();

    let stub = Arc::new(EchoTransport::new(Duration::ZERO));
    let ai = optimizer(&stub);
    let result = ai.optimize("A", None).now_or_never();

    assert!(matches!(result, Some(Err(AiError::Failure { .. }))), "{result:?}");
    assert!(!ai.is_optimizing());
    assert_eq!(stub.calls(), 0);
}

#[test]
fn reset_when_idle_is_a_no_op() {
    let stub = Arc::new(EchoTransport::new(Duration::ZERO));
    let ai = optimizer(&stub);
    ai.reset_state();
    assert!(!ai.is_optimizing());
}

// =========================================================================
// error translation
// =========================================================================

#[tokio::test(start_paused = true)]
async fn cancellation_is_busy_for_starter_and_silent_for_joiners() {
    let stub = Arc::new(EchoTransport::new(Duration::from_secs(10)));
    let client = api(&stub, Duration::from_secs(300));
    let ai = AiOptimizer::new(client.clone());

    let starter = spawn_optimize(&ai, "A", None);
    tokio::time::sleep(Duration::from_millis(1)).await;
    let joiner = spawn_optimize(&ai, "B", None);
    tokio::time::sleep(Duration::from_millis(1)).await;

    assert_eq!(client.cancel_pending(), 1);

    assert_eq!(starter.await.unwrap(), Err(AiError::Busy));
    assert_eq!(joiner.await.unwrap(), Err(AiError::Cancelled));
    assert!(!ai.is_optimizing());
}

#[tokio::test(start_paused = true)]
async fn timeout_is_not_swallowed() {
    let stub = Arc::new(EchoTransport::new(Duration::from_secs(5)));
    let ai = AiOptimizer::new(api(&stub, Duration::from_secs(1)));

    let err = ai.optimize("A", None).await.unwrap_err();

    assert_eq!(err, AiError::Timeout { after_ms: 1000 });
    assert!(err.retryable());
    assert!(!ai.is_optimizing());
}

#[tokio::test]
async fn unauthorized_maps_to_unauthenticated() {
    let stub = Arc::new(EchoTransport::fixed(401, json!({ "detail": "未登录" })));
    let ai = optimizer(&stub);

    assert_eq!(ai.optimize("A", None).await, Err(AiError::Unauthenticated));
}

#[test]
fn api_errors_convert() {
    assert_eq!(AiError::from(ApiError::Cancelled), AiError::Cancelled);
    assert_eq!(AiError::from(ApiError::Api { message: "x".into(), status: Some(403) }), AiError::Unauthenticated);
    assert_eq!(
        AiError::from(ApiError::Network("down".into())),
        AiError::Failure { message: "network error: down".into() }
    );
    assert_eq!(AiError::Busy.error_code(), "E_AI_BUSY");
}

// =========================================================================
// result defaults
// =========================================================================

#[test]
fn sparse_response_gets_defaults() {
    let result = OptimizationResult::from_response(OptimizeResponse::default(), "original", None);

    assert_eq!(result.title, "");
    assert_eq!(result.optimized, "original");
    assert_eq!(result.category, DEFAULT_CATEGORY);
    assert_eq!(result.tags, Tags::parse(DEFAULT_TAGS));
    assert!(result.key_points.is_empty());
    assert_eq!(result.graph, Graph::default());
    assert_eq!(result.mode, OptimizeMode::Analyze);
}

#[test]
fn empty_strings_count_as_missing() {
    let response = OptimizeResponse {
        optimized: Some(String::new()),
        category: Some(String::new()),
        ..OptimizeResponse::default()
    };
    let result = OptimizationResult::from_response(response, "original", Some("p"));

    assert_eq!(result.optimized, "original");
    assert_eq!(result.category, DEFAULT_CATEGORY);
    assert_eq!(result.mode, OptimizeMode::Rewrite);
}

#[test]
fn empty_tag_list_is_kept_but_empty_tag_string_is_defaulted() {
    let parse = |body: serde_json::Value| {
        let response: OptimizeResponse = serde_json::from_value(body).unwrap();
        OptimizationResult::from_response(response, "c", None).tags
    };

    assert!(parse(json!({ "tags": [] })).is_empty());
    assert_eq!(parse(json!({ "tags": "" })), Tags::parse(DEFAULT_TAGS));
    assert_eq!(parse(json!({ "tags": null })), Tags::parse(DEFAULT_TAGS));
    assert_eq!(parse(json!({})), Tags::parse(DEFAULT_TAGS));
    assert_eq!(parse(json!({ "tags": "a, b" })).as_slice(), ["a", "b"]);
}

#[tokio::test]
async fn server_empty_tag_list_reaches_the_caller() {
    let stub = Arc::new(EchoTransport::fixed(200, json!({ "optimized": "x", "tags": [] })));
    let ai = optimizer(&stub);

    let result = ai.optimize("A", None).await.unwrap();

    assert!(result.tags.is_empty());
}

#[tokio::test]
async fn server_reported_mode_wins() {
    let body = json!({ "optimized": "x", "tags": ["a", "b"], "mode": "rewrite" });
    let stub = Arc::new(EchoTransport::fixed(200, body));
    let ai = optimizer(&stub);

    let result = ai.optimize("A", None).await.unwrap();

    assert_eq!(result.mode, OptimizeMode::Rewrite);
    assert_eq!(result.tags.as_slice(), ["a", "b"]);
}

#[tokio::test]
async fn blank_prompt_is_analyze() {
    let stub = Arc::new(EchoTransport::new(Duration::ZERO));
    let ai = optimizer(&stub);

    let result = ai.optimize("A", Some("   ")).await.unwrap();

    assert_eq!(result.mode, OptimizeMode::Analyze);
}

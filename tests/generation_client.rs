#[allow(dead_code)]
mod helpers;

use std::sync::Arc;
use std::time::Duration;

use helpers::*;
use node_to_code::generate::*;
use node_to_code::ir::TargetLanguage;
use node_to_code::lower::lower;

const TIMEOUT: Duration = Duration::from_secs(10);

fn request() -> GenerationRequest {
    let document = lower(&begin_play_graph().build(), &[], TargetLanguage::Cpp)
        .unwrap()
        .document;
    GenerationRequest::new(document, GenerationOptions::default())
}

fn client(backend: Arc<ScriptedBackend>, max_attempts: u32) -> GenerationClient {
    let retry = RetryPolicy {
        max_attempts,
        initial_backoff_ms: 500,
        multiplier: 2.0,
        max_backoff_ms: 8_000,
    };
    GenerationClient::new(backend, retry, TIMEOUT)
}

// =============================================================================
// Retries
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_two_timeouts_then_success() {
    let backend = Arc::new(ScriptedBackend::new().script(
        "EventGraph",
        vec![Step::Hang, Step::Hang, Step::Reply(BEGIN_PLAY_CPP.into())],
    ));
    let response = client(Arc::clone(&backend), 3)
        .send(&request(), &CancelToken::new())
        .await
        .unwrap();

    assert_eq!(response.attempts, 3);
    assert_eq!(response.raw_text, BEGIN_PLAY_CPP);
    assert_eq!(response.status, 200);
    // Two full timeouts plus 500ms and 1000ms of backoff.
    assert!(response.elapsed >= TIMEOUT * 2 + Duration::from_millis(1_500));
    assert_eq!(backend.calls(), 3);
    assert!(backend.torn_down());
}

#[tokio::test(start_paused = true)]
async fn test_retry_bound_counts_first_attempt() {
    let backend = Arc::new(ScriptedBackend::new().script(
        "EventGraph",
        vec![
            Step::Fail(GenerationError::Network("connection reset".into())),
            Step::Fail(GenerationError::Network("connection reset".into())),
            Step::Reply(BEGIN_PLAY_CPP.into()),
        ],
    ));
    let err = client(Arc::clone(&backend), 2)
        .send(&request(), &CancelToken::new())
        .await
        .unwrap_err();

    assert_eq!(err, GenerationError::Network("connection reset".into()));
    assert_eq!(backend.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_rejection_is_not_retried() {
    let rejected = GenerationError::BackendRejected {
        status: 401,
        message: "invalid api key".into(),
    };
    let backend = Arc::new(
        ScriptedBackend::new().script("EventGraph", vec![Step::Fail(rejected.clone())]),
    );
    let err = client(Arc::clone(&backend), 5)
        .send(&request(), &CancelToken::new())
        .await
        .unwrap_err();

    assert_eq!(err, rejected);
    assert_eq!(err.code(), "G003");
    assert_eq!(backend.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_reply_within_timeout_succeeds() {
    let backend = Arc::new(ScriptedBackend::new().script(
        "EventGraph",
        vec![Step::Slow(Duration::from_secs(9), BEGIN_PLAY_CPP.into())],
    ));
    let response = client(backend, 1)
        .send(&request(), &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(response.attempts, 1);
    assert!(response.elapsed >= Duration::from_secs(9));
    assert!(response.elapsed < TIMEOUT);
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_cancel_tears_down_in_flight_attempt() {
    let backend = Arc::new(ScriptedBackend::new().script("EventGraph", vec![Step::Hang]));
    let cancel = CancelToken::new();
    let client = client(Arc::clone(&backend), 3);
    let request = request();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        trigger.cancel();
    });

    let err = client.send(&request, &cancel).await.unwrap_err();
    assert_eq!(err, GenerationError::Cancelled);
    assert_eq!(backend.calls(), 1);
    assert!(backend.torn_down());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_backoff() {
    let backend = Arc::new(ScriptedBackend::new().script(
        "EventGraph",
        vec![
            Step::Fail(GenerationError::Timeout(TIMEOUT)),
            Step::Reply(BEGIN_PLAY_CPP.into()),
        ],
    ));
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let err = client(Arc::clone(&backend), 3)
        .send(&request(), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err, GenerationError::Cancelled);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test]
async fn test_already_cancelled_token_skips_backend() {
    let backend = Arc::new(ScriptedBackend::new());
    let cancel = CancelToken::new();
    cancel.cancel();
    let err = client(Arc::clone(&backend), 3)
        .send(&request(), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err, GenerationError::Cancelled);
    assert_eq!(backend.calls(), 0);
}

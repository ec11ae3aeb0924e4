//! Integration tests for the submission workflow against a mock grading service.
//!
//! These tests run the real `reqwest` client against an in-process `axum`
//! server and check the whole path from a block program to a presented result.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use blockgrade_grading::{
    CompiledBlocks, FailureCategory, GradingClient, NoToken, StaticToken, SubmissionController,
    SubmissionOutcome, SubmissionStatus, TextSource,
};
use blockgrade_report::{present, ScoreTier};
use blockgrade_workspace::{
    BlockCompiler, HeadlessContainer, Size, ToolboxSpec, ViewOptions, WorkspaceManager,
};
use serde_json::{json, Value};

const SUBMIT_PATH: &str = "/api/code-submissions/submit";

/// Requests the mock service has received: body plus `Authorization` header.
type Received = Arc<Mutex<Vec<(Value, Option<String>)>>>;

/// Spawns the mock server and returns its base URL.
async fn spawn_test_server(router: Router) -> (String, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    (format!("http://{addr}"), handle)
}

/// A grading service that records each request and answers with a fixed grade.
fn grading_service(received: Received) -> Router {
    async fn submit(
        State(received): State<Received>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        let auth = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        received.lock().expect("lock").push((body, auth));
        Json(json!({
            "score": "92.5",
            "aiFeedback": "Clear and correct.",
            "suggestions": ["Use better variable names"]
        }))
    }

    Router::new()
        .route(SUBMIT_PATH, post(submit))
        .with_state(received)
}

/// A grading service whose reply depends on the assignment id.
fn failing_service() -> Router {
    async fn submit(Json(body): Json<Value>) -> Response {
        match body["assignmentId"].as_i64() {
            Some(401) => (StatusCode::UNAUTHORIZED, Json(json!({"message": "expired"}))).into_response(),
            Some(429) => StatusCode::TOO_MANY_REQUESTS.into_response(),
            Some(500) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"message": "boom"})),
            )
                .into_response(),
            Some(503) => StatusCode::SERVICE_UNAVAILABLE.into_response(),
            _ => (StatusCode::OK, "not json").into_response(),
        }
    }

    Router::new().route(SUBMIT_PATH, post(submit))
}

fn controller_for(base_url: &str) -> SubmissionController {
    let client = GradingClient::new(base_url, Arc::new(NoToken)).expect("client");
    SubmissionController::new(Arc::new(client))
}

fn print_hi_program() -> &'static str {
    r#"{
        "blocks": {
            "languageVersion": 0,
            "blocks": [
                {
                    "type": "text_print",
                    "id": "print",
                    "x": 20,
                    "y": 20,
                    "inputs": {
                        "TEXT": {"block": {"type": "text", "id": "msg", "fields": {"TEXT": "hi"}}}
                    }
                }
            ]
        }
    }"#
}

// ============================================================================
// End to end
// ============================================================================

#[tokio::test]
async fn block_program_is_compiled_submitted_and_presented() {
    let received: Received = Arc::default();
    let (base_url, _server) = spawn_test_server(grading_service(Arc::clone(&received))).await;

    let manager = WorkspaceManager::new();
    let container = Arc::new(HeadlessContainer::new("blockly-div", Size::new(800, 600)));
    let workspace = manager
        .create(container, ToolboxSpec::standard(), ViewOptions::default())
        .expect("workspace");
    workspace
        .workspace()
        .load_json(print_hi_program())
        .expect("program");

    let code = BlockCompiler::javascript().compile(&workspace).expect("compile");
    assert!(code.contains("window.alert('hi');"));

    let client = GradingClient::new(&base_url, Arc::new(StaticToken::new("secret"))).expect("client");
    let controller = SubmissionController::new(Arc::new(client));
    let attempt = controller
        .submit(1, &CompiledBlocks::javascript(&workspace), "javascript")
        .await;
    workspace.dispose();

    let SubmissionOutcome::Succeeded(result) = &attempt.outcome else {
        panic!("expected success, got {:?}", attempt.outcome);
    };
    assert!(!attempt.stale);
    assert_eq!(controller.status(1), SubmissionStatus::Succeeded);

    let model = present(result);
    assert_eq!(model.score_text, "92.5");
    assert_eq!(model.tier, ScoreTier::High);
    assert_eq!(model.feedback(), Some("Clear and correct."));
    assert_eq!(model.suggestions().len(), 1);
    assert_eq!(model.suggestions()[0].number, 1);
    assert_eq!(model.suggestions()[0].text, "Use better variable names");

    let received = received.lock().expect("lock");
    assert_eq!(received.len(), 1);
    let (body, auth) = &received[0];
    assert_eq!(body["enrollmentId"], 1);
    assert_eq!(body["assignmentId"], 1);
    assert_eq!(body["language"], "javascript");
    assert_eq!(body["code"].as_str(), Some(code.as_str()));
    assert_eq!(auth.as_deref(), Some("Bearer secret"));
}

#[tokio::test]
async fn text_submission_without_token_sends_no_authorization() {
    let received: Received = Arc::default();
    let (base_url, _server) = spawn_test_server(grading_service(Arc::clone(&received))).await;

    let attempt = controller_for(&base_url)
        .submit(3, &TextSource::new("print('hi')"), "python")
        .await;

    assert!(attempt.outcome.is_success());
    let received = received.lock().expect("lock");
    assert_eq!(received[0].0["language"], "python");
    assert_eq!(received[0].1, None);
}

#[tokio::test]
async fn empty_workspace_never_reaches_the_service() {
    let received: Received = Arc::default();
    let (base_url, _server) = spawn_test_server(grading_service(Arc::clone(&received))).await;

    let manager = WorkspaceManager::new();
    let container = Arc::new(HeadlessContainer::new("empty", Size::new(640, 480)));
    let workspace = manager
        .create(container, ToolboxSpec::standard(), ViewOptions::default())
        .expect("workspace");

    let attempt = controller_for(&base_url)
        .submit(1, &CompiledBlocks::javascript(&workspace), "javascript")
        .await;

    let failure = attempt.outcome.failure().expect("failure");
    assert_eq!(failure.category, FailureCategory::Validation);
    assert_eq!(failure.message, "Please create some blocks before submitting.");
    assert!(received.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn unrepresentable_score_still_succeeds_with_zero() {
    async fn submit() -> Response {
        (
            [(header::CONTENT_TYPE, "application/json")],
            r#"{"score": 1e400, "suggestions": ["Check the loop bounds"]}"#,
        )
            .into_response()
    }
    let (base_url, _server) =
        spawn_test_server(Router::new().route(SUBMIT_PATH, post(submit))).await;

    let attempt = controller_for(&base_url)
        .submit(2, &TextSource::new("console.log(1)"), "javascript")
        .await;

    let result = attempt.outcome.grading_result().expect("graded");
    assert_eq!(result.score, 0.0);
    assert_eq!(result.suggestions, vec!["Check the loop bounds"]);
    assert_eq!(present(result).tier, ScoreTier::Low);
}

// ============================================================================
// Failure classification
// ============================================================================

#[tokio::test]
async fn failing_statuses_are_classified() {
    let (base_url, _server) = spawn_test_server(failing_service()).await;
    let controller = controller_for(&base_url);
    let source = TextSource::new("console.log(1)");

    let cases = [
        (401, FailureCategory::Unauthorized, "Please login to submit your code."),
        (
            429,
            FailureCategory::RateLimited,
            "You've reached the submission limit. Please try again later.",
        ),
        (500, FailureCategory::ServerError, "boom"),
        (503, FailureCategory::ServerError, "503 Service Unavailable"),
        (
            1,
            FailureCategory::ServerError,
            "unexpected grading response",
        ),
    ];

    for (assignment, category, message) in cases {
        let attempt = controller.submit(assignment, &source, "javascript").await;
        let failure = attempt.outcome.failure().expect("failure");
        assert_eq!(failure.category, category, "assignment {assignment}");
        assert_eq!(failure.message, message, "assignment {assignment}");
        assert_eq!(controller.status(assignment), SubmissionStatus::Failed);
    }
}

#[tokio::test]
async fn unreachable_service_is_a_network_failure() {
    // Bind and release a port so nothing is listening on it.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");
    drop(listener);

    let attempt = controller_for(&format!("http://{addr}"))
        .submit(1, &TextSource::new("console.log(1)"), "javascript")
        .await;

    let failure = attempt.outcome.failure().expect("failure");
    assert_eq!(failure.category, FailureCategory::Network);
    assert_eq!(
        failure.message,
        "Cannot connect to server. Please check your connection."
    );
    assert_eq!(failure.title(), "Cannot Connect");
}

#[tokio::test]
async fn slow_service_times_out_as_network_failure() {
    async fn slow() -> Json<Value> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Json(json!({"score": 100}))
    }
    let (base_url, _server) =
        spawn_test_server(Router::new().route(SUBMIT_PATH, post(slow))).await;

    let controller = controller_for(&base_url).with_timeout(Duration::from_millis(100));
    let attempt = controller
        .submit(1, &TextSource::new("console.log(1)"), "javascript")
        .await;

    let failure = attempt.outcome.failure().expect("failure");
    assert_eq!(failure.category, FailureCategory::Network);
    assert_eq!(controller.status(1), SubmissionStatus::Failed);
}

#[tokio::test]
async fn cancelled_submission_does_not_stay_submitting() {
    async fn slow() -> Json<Value> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Json(json!({"score": 100}))
    }
    let (base_url, _server) =
        spawn_test_server(Router::new().route(SUBMIT_PATH, post(slow))).await;

    let controller = controller_for(&base_url);
    let cancel = tokio_util::sync::CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let attempt = controller
        .submit_with_cancel(7, &TextSource::new("x"), "javascript", &cancel)
        .await;

    assert_eq!(
        attempt.outcome.failure().map(|f| f.category),
        Some(FailureCategory::Network)
    );
    assert_eq!(controller.status(7), SubmissionStatus::Failed);
}

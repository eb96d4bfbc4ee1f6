use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use comfyui_nodes::api::routes::{router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn call(state: &Arc<AppState>, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = router(state.clone()).oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn root_answers() {
    let state = Arc::new(AppState::new(None));
    let response = router(state)
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn execute_runs_dispatcher_per_item() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/queue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"queue_pending": []})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/interrupt"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let state = Arc::new(AppState::new(None));
    let (status, body) = call(
        &state,
        "POST",
        "/execute",
        Some(json!({
            "parameters": {"serverUrl": server.uri()},
            "items": [
                {"queueOperation": "getQueueStatus"},
                {"queueOperation": "interruptExecution"},
            ],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([
            {"queue_pending": []},
            {"success": true, "message": "Current execution interrupted"},
        ])
    );
}

#[tokio::test]
async fn execute_maps_errors_to_status_codes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let state = Arc::new(AppState::new(None));
    let (status, _) = call(&state, "POST", "/execute", Some(json!({"parameters": {}}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &state,
        "POST",
        "/execute",
        Some(json!({"parameters": {"serverUrl": server.uri()}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("(500)"));

    let (status, body) = call(
        &state,
        "POST",
        "/execute",
        Some(json!({"parameters": {"serverUrl": server.uri()}, "continueOnFail": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["status"], 500);
}

#[tokio::test]
async fn trigger_lifecycle() {
    let state = Arc::new(AppState::new(None));

    let (status, _) = call(&state, "POST", "/triggers", Some(json!({"parameters": {}}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(
        &state,
        "POST",
        "/triggers",
        Some(json!({"parameters": {"serverUrl": "http://127.0.0.1:1", "eventTypeChoice": "custom", "customEventType": "x"}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = body["id"].as_str().unwrap().to_string();
    assert!(body["clientId"].is_string());

    let (status, events) = call(&state, "GET", &format!("/triggers/{}/events", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(events, json!([]));

    let (status, body) = call(&state, "DELETE", &format!("/triggers/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stopped"], true);

    let (status, _) = call(&state, "DELETE", &format!("/triggers/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&state, "GET", &format!("/triggers/{}/events", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn trigger_registry_is_capped() {
    let state = Arc::new(AppState::new(None).with_trigger_limit(1));
    let request = json!({"parameters": {"serverUrl": "http://127.0.0.1:1", "reconnectInterval": 60}});

    let (status, body) = call(&state, "POST", "/triggers", Some(request.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let id = body["id"].as_str().unwrap().to_string();

    let (status, body) = call(&state, "POST", "/triggers", Some(request.clone())).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body["error"].is_string());

    let (status, _) = call(&state, "DELETE", &format!("/triggers/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = call(&state, "POST", "/triggers", Some(request)).await;
    assert_eq!(status, StatusCode::OK);

    let id = body["id"].as_str().unwrap();
    call(&state, "DELETE", &format!("/triggers/{}", id), None).await;
}

use std::time::Duration;

use comfyui_nodes::comfyui::client::{ComfyUIClient, Route};
use comfyui_nodes::dispatcher::failure::{FailureKind, RequestFailure};
use comfyui_nodes::dispatcher::Dispatcher;
use comfyui_nodes::error::AppError;
use comfyui_nodes::host::{HeaderCredential, ItemParameters};
use serde_json::{json, Map, Value};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn params(server: &MockServer, extra: Value) -> Map<String, Value> {
    let mut map = extra.as_object().cloned().unwrap_or_default();
    map.insert("serverUrl".into(), json!(format!("{}/", server.uri())));
    map
}

#[tokio::test]
async fn queue_status_uses_primary_path_when_it_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/queue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"queue_running": [], "queue_pending": []})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/api/queue"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let records = Dispatcher::new()
        .execute(&params(&server, json!({"queueOperation": "getQueueStatus"})), 1, None, false)
        .await
        .unwrap();
    assert_eq!(records, vec![json!({"queue_running": [], "queue_pending": []})]);
}

#[tokio::test]
async fn queue_status_falls_back_to_api_prefix_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/queue"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/queue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"queue_running": [1]})))
        .expect(1)
        .mount(&server)
        .await;

    let records = Dispatcher::new()
        .execute(&params(&server, json!({})), 1, None, false)
        .await
        .unwrap();
    assert_eq!(records[0], json!({"queue_running": [1]}));
}

#[tokio::test]
async fn failed_fallback_raises_annotated_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/system_stats"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/system_stats"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let err = Dispatcher::new()
        .execute(&params(&server, json!({"queueOperation": "getSystemInfo"})), 1, None, false)
        .await
        .unwrap_err();
    let AppError::Api(failure) = &err else {
        panic!("expected an API error, got {err:?}");
    };
    assert_eq!(failure.status, Some(404));
    assert!(failure.url.as_deref().unwrap().ends_with("/api/system_stats"));
    let text = err.to_string();
    assert!(text.starts_with("ComfyUI API Error (404)"));
    assert!(text.contains("Suggestion: 404 Not Found"));
}

#[tokio::test]
async fn continue_on_fail_emits_error_record() {
    let server = MockServer::start().await;
    Mock::given(path("/interrupt"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/api/interrupt"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let records = Dispatcher::new()
        .execute(&params(&server, json!({"queueOperation": "interruptExecution"})), 1, None, true)
        .await
        .unwrap();
    let record = &records[0];
    assert_eq!(record["status"], 403);
    assert_eq!(record["statusText"], "Forbidden");
    assert!(record["url"].as_str().unwrap().ends_with("/api/interrupt"));
    assert!(record["suggestion"].as_str().unwrap().starts_with("403 Forbidden"));
}

#[tokio::test]
async fn recent_history_falls_back_to_bare_api_history() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/history"))
        .and(query_param("max_items", "5"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/history"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"abc": {"outputs": {}}})))
        .expect(1)
        .mount(&server)
        .await;

    let records = Dispatcher::new()
        .execute(&params(&server, json!({"queueOperation": "getRecentHistory"})), 1, None, false)
        .await
        .unwrap();
    assert_eq!(records[0], json!({"abc": {"outputs": {}}}));
}

#[tokio::test]
async fn delete_history_item_reports_synthesized_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/history"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"delete": ["abc"]})))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json at all"))
        .expect(1)
        .mount(&server)
        .await;

    let p = params(&server, json!({"queueOperation": "deleteHistoryItem", "promptId": "abc"}));
    let records = Dispatcher::new().execute(&p, 1, None, false).await.unwrap();
    assert_eq!(records[0], json!({"success": true, "message": "History item abc deleted"}));
}

#[tokio::test]
async fn clear_queue_posts_clear_directive_with_fallback() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/queue"))
        .respond_with(ResponseTemplate::new(405))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/queue"))
        .and(body_json(json!({"clear": true})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let p = params(&server, json!({"queueOperation": "clearQueue"}));
    let records = Dispatcher::new().execute(&p, 1, None, false).await.unwrap();
    assert_eq!(records[0], json!({"success": true, "message": "Queue cleared"}));
}

#[tokio::test]
async fn clear_history_and_interrupt_send_expected_bodies() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/history"))
        .and(body_json(json!({"clear": true})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/interrupt"))
        .and(body_json(json!({})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let p = ItemParameters::new(
        params(&server, json!({})),
        vec![
            json!({"queueOperation": "clearHistory"}).as_object().cloned().unwrap(),
            json!({"queueOperation": "interruptExecution"}).as_object().cloned().unwrap(),
        ],
    );
    let records = Dispatcher::new().execute(&p, p.item_count(), None, false).await.unwrap();
    assert_eq!(
        records,
        vec![
            json!({"success": true, "message": "History cleared"}),
            json!({"success": true, "message": "Current execution interrupted"}),
        ]
    );
}

#[tokio::test]
async fn model_operations_never_fall_back() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/object_info"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/api/object_info"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let p = params(&server, json!({"operationCategory": "models", "modelsOperation": "getAllModels"}));
    let err = Dispatcher::new().execute(&p, 1, None, false).await.unwrap_err();
    assert!(err.to_string().contains("(404)"));
}

#[tokio::test]
async fn models_by_type_with_absent_key_is_empty_mapping() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/object_info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "checkpoints": ["sdxl.safetensors"],
            "KSampler": {"input": {}},
        })))
        .expect(2)
        .mount(&server)
        .await;

    let dispatcher = Dispatcher::new();
    let p = params(
        &server,
        json!({"operationCategory": "models", "modelsOperation": "getModelsByType", "modelType": "loras"}),
    );
    assert_eq!(dispatcher.execute(&p, 1, None, false).await.unwrap(), vec![json!({})]);

    let p = params(&server, json!({"operationCategory": "models", "modelsOperation": "getModelsByType"}));
    assert_eq!(
        dispatcher.execute(&p, 1, None, false).await.unwrap(),
        vec![json!({"checkpoints": ["sdxl.safetensors"]})]
    );
}

#[tokio::test]
async fn model_lists_hit_their_endpoints() {
    let server = MockServer::start().await;
    for (endpoint, body) in [
        ("/samplers", json!(["euler", "dpmpp_2m"])),
        ("/schedulers", json!(["normal", "karras"])),
        ("/extensions", json!(["/extensions/core/a.js"])),
        ("/embeddings", json!(["easynegative"])),
    ] {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .mount(&server)
            .await;
    }

    let ops = ["getSamplers", "getSchedulers", "getExtensions", "getEmbeddings"];
    let items = ops
        .iter()
        .map(|op| json!({"modelsOperation": op}).as_object().cloned().unwrap())
        .collect();
    let p = ItemParameters::new(params(&server, json!({"operationCategory": "models"})), items);
    let records = Dispatcher::new().execute(&p, p.item_count(), None, false).await.unwrap();
    assert_eq!(records[0], json!(["euler", "dpmpp_2m"]));
    assert_eq!(records[3], json!(["easynegative"]));
}

#[tokio::test]
async fn manual_header_wins_and_gets_omit_content_type() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/queue"))
        .and(header("X-Key", "manual"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let credential = HeaderCredential { name: Some("X-Key".into()), value: Some("stored".into()) };
    let p = params(&server, json!({"manualHeaderValue": "manual"}));
    Dispatcher::new().execute(&p, 1, Some(&credential), false).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].headers.get("content-type").is_none());
}

#[tokio::test]
async fn stored_credential_used_without_manual_override() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/queue"))
        .and(header("Authorization", "Bearer stored"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let credential = HeaderCredential { name: None, value: Some("Bearer stored".into()) };
    Dispatcher::new()
        .execute(&params(&server, json!({})), 1, Some(&credential), false)
        .await
        .unwrap();
}

#[tokio::test]
async fn unreachable_server_yields_statusless_record() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut p = Map::new();
    p.insert("serverUrl".into(), json!(format!("http://{}", addr)));
    let records = Dispatcher::new().execute(&p, 1, None, true).await.unwrap();
    assert!(records[0]["status"].is_null());
    assert!(!records[0]["suggestion"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn parameter_errors_stop_the_run_without_continue_on_fail() {
    let server = MockServer::start().await;
    let p = params(&server, json!({"queueOperation": "deleteHistoryItem"}));
    let err = Dispatcher::new().execute(&p, 1, None, false).await.unwrap_err();
    assert!(err.to_string().contains("promptId"));

    let records = Dispatcher::new().execute(&p, 1, None, true).await.unwrap();
    assert!(records[0]["error"].as_str().unwrap().contains("promptId"));
}

const SLOW: Duration = Duration::from_millis(600);
const SHORT_TIMEOUT: Duration = Duration::from_millis(150);

#[tokio::test]
async fn timed_out_primary_and_fallback_classify_as_timeout() {
    let server = MockServer::start().await;
    for route in ["/queue", "/api/queue"] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})).set_delay(SLOW))
            .expect(1)
            .mount(&server)
            .await;
    }

    let client = ComfyUIClient::new(server.uri()).with_timeout(Some(SHORT_TIMEOUT));
    let err = client
        .get_with_fallback(Route::with_fallback("/queue", "/api/queue"))
        .await
        .unwrap_err();
    let failure = RequestFailure::from_app_error(&err);
    assert_eq!(failure.kind, FailureKind::TimedOut);
    assert_eq!(failure.status, None);
    assert!(failure.url.as_ref().unwrap().ends_with("/api/queue"));
    assert!(failure.suggestion().starts_with("Request timeout"));
}

#[tokio::test]
async fn queue_operations_time_out_but_model_operations_do_not() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/queue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})).set_delay(SLOW))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/queue"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})).set_delay(SLOW))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/samplers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["euler"])).set_delay(SLOW))
        .expect(1)
        .mount(&server)
        .await;

    let dispatcher = Dispatcher::new().with_queue_timeout(SHORT_TIMEOUT);

    let records = dispatcher
        .execute(&params(&server, json!({"queueOperation": "getQueueStatus"})), 1, None, true)
        .await
        .unwrap();
    assert!(records[0]["status"].is_null());
    assert!(records[0]["suggestion"].as_str().unwrap().starts_with("Request timeout"));

    let models = params(&server, json!({"operationCategory": "models", "modelsOperation": "getSamplers"}));
    let records = dispatcher.execute(&models, 1, None, false).await.unwrap();
    assert_eq!(records, vec![json!(["euler"])]);
}

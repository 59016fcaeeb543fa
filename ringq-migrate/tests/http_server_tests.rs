//! HTTP server & routing integration tests
//!
//! Drives the router in-process with `tower::ServiceExt::oneshot`; the
//! backend is replaced by scripted transports.

mod helpers;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use helpers::{app_state, RefusingTransport, ScriptedTransport, SUCCESSFUL_RUN};
use http_body_util::BodyExt;
use ringq_migrate::build_router;
use serde_json::Value;
use tower::ServiceExt;

async fn send(app: &Router, method: &str, uri: &str, body: Body) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body)
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = build_router(app_state(RefusingTransport));

    let (status, body) = send(&app, "GET", "/health", Body::empty()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "ringq-migrate");
    assert_eq!(body["migration_active"], false);
    assert!(body.get("last_error").is_none());
}

#[tokio::test]
async fn test_status_is_not_found_before_first_run() {
    let app = build_router(app_state(RefusingTransport));

    let (status, body) = send(&app, "GET", "/migrate/status", Body::empty()).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_start_then_status_reports_completed_run() {
    let transport = ScriptedTransport::new(SUCCESSFUL_RUN);
    let requests = transport.requests.clone();
    let state = app_state(transport);
    let app = build_router(state.clone());

    let (status, body) = send(
        &app,
        "POST",
        "/migrate/start",
        Body::from(r#"{"spreadsheet_id":"abc"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "RUNNING");
    let run_id = body["run_id"].as_str().unwrap().to_string();

    state.controller.wait().await.unwrap();

    let (status, body) = send(&app, "GET", "/migrate/status", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["run_id"], run_id.as_str());
    assert_eq!(body["status"], "COMPLETED");
    assert_eq!(body["progress"], 100);
    assert_eq!(body["running"], false);
    assert_eq!(body["log"].as_array().unwrap().len(), SUCCESSFUL_RUN.len());

    let requests = requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["spreadsheet_id"], "abc");
}

#[tokio::test]
async fn test_empty_body_is_forwarded_as_empty_object() {
    let transport = ScriptedTransport::new(&[]);
    let requests = transport.requests.clone();
    let state = app_state(transport);
    let app = build_router(state.clone());

    let (status, _) = send(&app, "POST", "/migrate/start", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    state.controller.wait().await.unwrap();

    assert_eq!(requests.lock().unwrap()[0], serde_json::json!({}));
}

#[tokio::test]
async fn test_invalid_json_body_is_rejected() {
    let app = build_router(app_state(RefusingTransport));

    let (status, body) = send(&app, "POST", "/migrate/start", Body::from("{not json")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_second_start_conflicts_until_cancelled() {
    let state = app_state(ScriptedTransport::new(&["data: Starting merge\n\n"]).hanging());
    let app = build_router(state.clone());

    let (status, first) = send(&app, "POST", "/migrate/start", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "POST", "/migrate/start", Body::empty()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");

    let (_, health) = send(&app, "GET", "/health", Body::empty()).await;
    assert_eq!(health["migration_active"], true);

    let (status, body) = send(&app, "POST", "/migrate/cancel", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["run_id"], first["run_id"]);

    let final_state = state.controller.wait().await.unwrap();
    assert_eq!(final_state.error.as_deref(), Some("cancelled"));

    let (_, health) = send(&app, "GET", "/health", Body::empty()).await;
    assert_eq!(health["migration_active"], false);
    assert_eq!(health["last_error"], "cancelled");

    let (status, _) = send(&app, "POST", "/migrate/start", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_cancel_without_run_is_not_found() {
    let app = build_router(app_state(RefusingTransport));

    let (status, body) = send(&app, "POST", "/migrate/cancel", Body::empty()).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_unreachable_backend_reports_failed_run() {
    let state = app_state(RefusingTransport);
    let app = build_router(state.clone());

    let (status, _) = send(&app, "POST", "/migrate/start", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    state.controller.wait().await.unwrap();

    let (status, body) = send(&app, "GET", "/migrate/status", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "FAILED");
    assert!(body["error"].as_str().unwrap().contains("connection refused"));
}

#[tokio::test]
async fn test_event_stream_route_serves_sse() {
    let app = build_router(app_state(RefusingTransport));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/migrate/events")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get(header::CONTENT_TYPE).unwrap();
    assert!(content_type.to_str().unwrap().starts_with("text/event-stream"));
}

#[tokio::test]
async fn test_error_frame_on_open_stream_allows_new_start() {
    let state = app_state(
        ScriptedTransport::new(&["data: Starting merge\n\n", "data: ERROR: worksheet locked\n\n"])
            .hanging(),
    );
    let app = build_router(state.clone());

    let (status, _) = send(&app, "POST", "/migrate/start", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);

    let final_state = tokio::time::timeout(std::time::Duration::from_secs(5), state.controller.wait())
        .await
        .expect("error frame should end the run")
        .unwrap();
    assert_eq!(final_state.error.as_deref(), Some("ERROR: worksheet locked"));

    let (_, health) = send(&app, "GET", "/health", Body::empty()).await;
    assert_eq!(health["migration_active"], false);
    assert_eq!(health["last_error"], "ERROR: worksheet locked");

    let (status, _) = send(&app, "POST", "/migrate/start", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
}

//! HTTP Server & Routing Integration Tests
//!
//! Drives the router with `tower::ServiceExt::oneshot` against a real
//! worker pool and a temporary SQLite store.

mod helpers;

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use ingest_common::TaskOutcome;
use ingest_service::api::cors_layer;
use ingest_service::build_router;
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use helpers::*;

const MATCHES: &str = "GameID,Kills,Deaths\n1,10,2\n2,4,7\n";

async fn send(app: &Router, method: Method, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn task_id_of(body: &Value) -> Uuid {
    Uuid::parse_str(body["task_id"].as_str().unwrap()).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let env = create_test_env(&[("input.csv", MATCHES)]).await;
    let workers = start_workers(&env, 1);
    let app = build_router(app_state(&env, &workers));

    let (status, body) = send(&app, Method::GET, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

    workers.stop().await;
}

#[tokio::test]
async fn test_trigger_then_poll_until_success() {
    let env = create_test_env(&[("matches.csv", MATCHES)]).await;
    let workers = start_workers(&env, 2);
    let app = build_router(app_state(&env, &workers));

    let (status, body) = send(&app, Method::POST, "/api/v1/ingest?file_name=matches.csv").await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["message"], "Ingestion task queued");
    assert_eq!(body["file"], "matches.csv");

    let task_id = task_id_of(&body);
    wait_for_terminal(&env.pool, task_id).await;

    let (status, body) = send(&app, Method::GET, &format!("/api/v1/ingest/{}", task_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "succeeded");
    assert_eq!(body["attempts"], 1);
    assert_eq!(body["result"], serde_json::json!({"status": "success", "rows": 2}));
    assert_eq!(count_rows(&env.pool).await, 2);

    workers.stop().await;
}

#[tokio::test]
async fn test_trigger_accepted_while_writer_holds_lock() {
    let env = create_test_env_with_busy_timeout(&[("input.csv", MATCHES)], Duration::from_millis(20)).await;
    let workers = start_workers(&env, 1);
    let app = build_router(app_state(&env, &workers));

    // A long load holds the write lock well past the busy timeout
    let holder = hold_write_lock(&env.pool).await;

    let request = {
        let app = app.clone();
        tokio::spawn(async move { send(&app, Method::POST, "/api/v1/ingest").await })
    };

    tokio::time::sleep(Duration::from_millis(300)).await;
    holder.rollback().await.unwrap();

    let (status, body) = request.await.unwrap();
    assert_eq!(status, StatusCode::ACCEPTED);

    let task = wait_for_terminal(&env.pool, task_id_of(&body)).await;
    assert_eq!(task.result, Some(TaskOutcome::Success { rows: 2 }));

    workers.stop().await;
}

#[tokio::test]
async fn test_trigger_defaults_to_input_csv() {
    let env = create_test_env(&[("input.csv", MATCHES)]).await;
    let workers = start_workers(&env, 1);
    let app = build_router(app_state(&env, &workers));

    let (status, body) = send(&app, Method::POST, "/api/v1/ingest").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["file"], "input.csv");

    let task = wait_for_terminal(&env.pool, task_id_of(&body)).await;
    assert!(task.result.unwrap().is_success());

    workers.stop().await;
}

#[tokio::test]
async fn test_missing_file_is_accepted_then_fails() {
    let env = create_test_env(&[("input.csv", MATCHES)]).await;
    let workers = start_workers(&env, 1);
    let app = build_router(app_state(&env, &workers));

    // The trigger never checks the file; failure shows up in the status
    let (status, body) = send(&app, Method::POST, "/api/v1/ingest?file_name=nope.csv").await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let task_id = task_id_of(&body);
    wait_for_terminal(&env.pool, task_id).await;

    let (status, body) = send(&app, Method::GET, &format!("/api/v1/ingest/{}", task_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "failed");
    assert_eq!(body["result"]["status"], "error");
    assert!(body["result"]["message"].as_str().unwrap().contains("nope.csv"));
    assert_eq!(count_rows(&env.pool).await, 0);

    workers.stop().await;
}

#[tokio::test]
async fn test_path_outside_source_dir_fails() {
    let env = create_test_env(&[("input.csv", MATCHES)]).await;
    let workers = start_workers(&env, 1);
    let app = build_router(app_state(&env, &workers));

    let (status, body) =
        send(&app, Method::POST, "/api/v1/ingest?file_name=../ingest.db").await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let task = wait_for_terminal(&env.pool, task_id_of(&body)).await;
    assert!(!task.result.unwrap().is_success());

    workers.stop().await;
}

#[tokio::test]
async fn test_unknown_task_returns_404() {
    let env = create_test_env(&[("input.csv", MATCHES)]).await;
    let workers = start_workers(&env, 1);
    let app = build_router(app_state(&env, &workers));

    let (status, body) =
        send(&app, Method::GET, &format!("/api/v1/ingest/{}", Uuid::new_v4())).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    workers.stop().await;
}

#[tokio::test]
async fn test_malformed_task_id_returns_400() {
    let env = create_test_env(&[("input.csv", MATCHES)]).await;
    let workers = start_workers(&env, 1);
    let app = build_router(app_state(&env, &workers));

    let (status, body) = send(&app, Method::GET, "/api/v1/ingest/not-a-uuid").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    workers.stop().await;
}

#[tokio::test]
async fn test_cors_preflight_allows_frontend_origin() {
    let env = create_test_env(&[("input.csv", MATCHES)]).await;
    let workers = start_workers(&env, 1);
    let origin = "http://localhost:3000";
    let app = build_router(app_state(&env, &workers)).layer(cors_layer(origin).unwrap());

    let response = app
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/v1/ingest")
                .header(header::ORIGIN, origin)
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        origin
    );
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS],
        "true"
    );

    workers.stop().await;
}

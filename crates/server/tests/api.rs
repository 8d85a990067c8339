//! API integration tests exercising the router directly

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use testwatch_common::{CheckConfig, SiteConfig, WatchConfig};
use testwatch_server::server::Service;
use testwatch_server::state::AppState;

fn test_config(root: &std::path::Path) -> WatchConfig {
    let mut config = WatchConfig::default();
    config.runner.root = root.to_path_buf();
    // no live sites: post-run sweeps and check-all stay local
    config.sites = vec![SiteConfig {
        key: "portal".to_string(),
        name: "Customer Portal".to_string(),
        base: "http://127.0.0.1:1".to_string(),
        checks: vec![CheckConfig {
            label: "Home page".to_string(),
            path: "/".to_string(),
            ok: vec![200],
            content_type: None,
            min_bytes: None,
        }],
    }];
    config
}

fn test_service(root: &std::path::Path) -> Service {
    Service::new(AppState::new(test_config(root))).unwrap()
}

async fn get(service: &Service, uri: &str) -> axum::response::Response {
    service
        .router()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn post(service: &Service, uri: &str) -> axum::response::Response {
    service
        .router()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn healthz_is_alive() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(dir.path());

    let response = get(&service, "/healthz").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, serde_json::json!({ "ok": true }));
}

#[tokio::test]
async fn run_trigger_reports_queue_state() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(dir.path());

    let response = post(&service, "/run").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["queued"], false);
}

#[tokio::test]
async fn unknown_site_check_is_a_client_error() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(dir.path());

    let response = post(&service, "/site/check?site=unknown").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["ok"], false);
}

#[tokio::test]
async fn missing_site_param_is_a_client_error() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(dir.path());

    let response = post(&service, "/site/check").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = get(&service, "/site/logs").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn site_status_is_null_before_any_check() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(dir.path());

    let response = get(&service, "/site/status?site=portal").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["ok"], true);
    assert!(body["status"].is_null());
}

#[tokio::test]
async fn invalid_schedules_are_rejected_without_state_change() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(dir.path());

    for uri in [
        "/start?mode=minutes&value=0",
        "/start?mode=days&value=5",
        "/start?mode=minutes",
        "/start",
    ] {
        let response = post(&service, uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        let body = body_json(response).await;
        assert_eq!(body["ok"], false);
    }

    let status = body_json(get(&service, "/status").await).await;
    assert!(status["schedule"]["mode"].is_null());
}

#[tokio::test]
async fn schedule_roundtrip_start_then_stop() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(dir.path());

    let response = post(&service, "/start?mode=minutes&value=5").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["schedule"]["ms"], 300_000);

    let status = body_json(get(&service, "/status").await).await;
    assert_eq!(status["schedule"]["mode"], "minutes");

    // stop is idempotent
    for _ in 0..2 {
        let response = post(&service, "/stop").await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    let status = body_json(get(&service, "/status").await).await;
    assert!(status["schedule"]["mode"].is_null());
}

#[tokio::test]
async fn logs_start_with_placeholder_text() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(dir.path());

    let response = get(&service, "/logs").await;
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/plain"));

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(std::str::from_utf8(&bytes).unwrap(), "No logs yet.");
}

#[tokio::test]
async fn site_list_returns_registered_sites() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(dir.path());

    let body = body_json(get(&service, "/site/list").await).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["sites"][0]["key"], "portal");
    assert_eq!(body["sites"][0]["checks"][0]["label"], "Home page");
}

#[tokio::test]
async fn summary_is_empty_without_any_evidence() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(dir.path());

    let body = body_json(get(&service, "/pw/summary").await).await;
    assert_eq!(body["summary"]["total"], 0);
    assert_eq!(body["failures"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn status_exposes_report_links() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(dir.path());

    let body = body_json(get(&service, "/status").await).await;
    assert_eq!(body["running"], false);
    assert_eq!(body["report_html"], "/playwright-report/index.html");
    assert_eq!(body["report_json"], "/playwright-report/report.json");
}

#[tokio::test]
async fn artifacts_reject_unknown_directories() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(dir.path());

    let response = get(&service, "/artifacts/secrets/passwd").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn artifacts_serve_known_files_with_content_type() {
    let dir = tempfile::tempdir().unwrap();
    let results = dir.path().join("test-results/t1");
    std::fs::create_dir_all(&results).unwrap();
    std::fs::write(results.join("shot.png"), b"not really a png").unwrap();

    let service = test_service(dir.path());

    let response = get(&service, "/artifacts/test-results/t1/shot.png").await;
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(axum::http::header::CONTENT_TYPE)
        .unwrap()
        .to_str()
        .unwrap();
    assert_eq!(content_type, "image/png");

    let response = get(&service, "/artifacts/test-results/t1/missing.png").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn check_all_embeds_per_site_outcomes() {
    let dir = tempfile::tempdir().unwrap();
    let service = test_service(dir.path());

    // the configured site points at a closed port, so the check fails but
    // the sweep itself succeeds
    let response = post(&service, "/site/check-all").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["ok"], true);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["site"], "portal");
    assert_eq!(results[0]["ok"], false);
}

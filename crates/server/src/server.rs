//! HTTP API surface

use axum::{
    extract::{Path as UrlPath, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use testwatch_common::{Error, Result, ScheduleMode};

use crate::artifacts;
use crate::report;
use crate::runner::RunCoordinator;
use crate::scheduler::Scheduler;
use crate::sitecheck::SiteChecker;
use crate::state::AppState;

/// Handles shared by every route.
#[derive(Clone)]
pub struct Service {
    pub state: Arc<AppState>,
    pub coordinator: Arc<RunCoordinator>,
    pub scheduler: Arc<Scheduler>,
    pub checker: Arc<SiteChecker>,
}

impl Service {
    pub fn new(state: Arc<AppState>) -> Result<Self> {
        let checker = SiteChecker::new(Arc::clone(&state))?;
        let coordinator = RunCoordinator::new(Arc::clone(&state), Arc::clone(&checker));
        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&state),
            Arc::clone(&coordinator),
        ));
        Ok(Self {
            state,
            coordinator,
            scheduler,
            checker,
        })
    }

    pub fn router(&self) -> Router {
        let report_dir = self.state.config.runner.report_dir_abs();

        Router::new()
            .route("/run", post(run_handler))
            .route("/start", post(start_handler))
            .route("/stop", post(stop_handler))
            .route("/status", get(status_handler))
            .route("/logs", get(logs_handler))
            .route("/site/list", get(site_list_handler))
            .route("/site/check", post(site_check_handler))
            .route("/site/check-all", post(site_check_all_handler))
            .route("/site/status", get(site_status_handler))
            .route("/site/logs", get(site_logs_handler))
            .route("/pw/summary", get(summary_handler))
            .route("/artifacts/:dir/*path", get(artifact_handler))
            .route("/healthz", get(health_handler))
            .nest_service("/playwright-report", ServeDir::new(report_dir))
            .layer(TraceLayer::new_for_http())
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .with_state(self.clone())
    }

    pub async fn serve(self, addr: SocketAddr) -> anyhow::Result<()> {
        info!("TestWatch listening on http://{}", addr);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

// ============================================================================
// Handlers
// ============================================================================

fn bad_request(error: &Error) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "ok": false, "error": error.to_string() })),
    )
        .into_response()
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn run_handler(State(service): State<Service>) -> impl IntoResponse {
    let queued = service.coordinator.trigger();
    Json(json!({ "ok": true, "queued": queued }))
}

#[derive(Debug, Deserialize)]
struct StartParams {
    mode: Option<String>,
    value: Option<String>,
}

async fn start_handler(
    State(service): State<Service>,
    Query(params): Query<StartParams>,
) -> Response {
    let mode = match params.mode.as_deref() {
        Some("minutes") => ScheduleMode::Minutes,
        Some("hours") => ScheduleMode::Hours,
        _ => {
            return bad_request(&Error::InvalidConfig(
                "mode must be minutes or hours".to_string(),
            ))
        }
    };
    let value = match params.value.as_deref().and_then(|v| v.parse::<u64>().ok()) {
        Some(value) => value,
        None => {
            return bad_request(&Error::InvalidConfig(
                "value must be a positive number".to_string(),
            ))
        }
    };

    match service.scheduler.configure(mode, value) {
        Ok(schedule) => Json(json!({ "ok": true, "schedule": schedule })).into_response(),
        Err(e) => bad_request(&e),
    }
}

async fn stop_handler(State(service): State<Service>) -> impl IntoResponse {
    service.scheduler.cancel();
    Json(json!({ "ok": true }))
}

async fn status_handler(State(service): State<Service>) -> impl IntoResponse {
    let run = service.state.run_state();
    Json(json!({
        "running": run.running,
        "schedule": service.state.schedule_snapshot(),
        "last_run": run.last_run,
        "report_html": "/playwright-report/index.html",
        "report_json": "/playwright-report/report.json",
    }))
}

async fn logs_handler(State(service): State<Service>) -> impl IntoResponse {
    let text = service.state.log.contents();
    let body = if text.is_empty() {
        "No logs yet.".to_string()
    } else {
        text
    };
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body)
}

async fn site_list_handler(State(service): State<Service>) -> impl IntoResponse {
    Json(json!({ "ok": true, "sites": service.state.config.sites }))
}

#[derive(Debug, Deserialize)]
struct SiteParams {
    site: Option<String>,
}

fn require_site(service: &Service, params: &SiteParams) -> std::result::Result<String, Response> {
    let Some(key) = params.site.clone() else {
        return Err(bad_request(&Error::InvalidConfig(
            "missing site query parameter".to_string(),
        )));
    };
    if service.state.site(&key).is_none() {
        return Err(bad_request(&Error::NotFound {
            kind: "site".to_string(),
            key,
        }));
    }
    Ok(key)
}

async fn site_check_handler(
    State(service): State<Service>,
    Query(params): Query<SiteParams>,
) -> Response {
    let key = match require_site(&service, &params) {
        Ok(key) => key,
        Err(response) => return response,
    };

    match service.checker.check_site(&key).await {
        Ok(result) => Json(json!({ "ok": true, "result": result })).into_response(),
        Err(e @ Error::NotFound { .. }) => bad_request(&e),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "ok": false, "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn site_check_all_handler(State(service): State<Service>) -> impl IntoResponse {
    let results = service.checker.check_all_sites().await;
    Json(json!({ "ok": true, "results": results }))
}

async fn site_status_handler(
    State(service): State<Service>,
    Query(params): Query<SiteParams>,
) -> Response {
    let key = match require_site(&service, &params) {
        Ok(key) => key,
        Err(response) => return response,
    };
    Json(json!({ "ok": true, "status": service.state.site_status(&key) })).into_response()
}

async fn site_logs_handler(
    State(service): State<Service>,
    Query(params): Query<SiteParams>,
) -> Response {
    let key = match require_site(&service, &params) {
        Ok(key) => key,
        Err(response) => return response,
    };
    Json(json!({ "ok": true, "logs": service.state.site_logs(&key) })).into_response()
}

async fn summary_handler(State(service): State<Service>) -> impl IntoResponse {
    let log_text = service.state.log.contents();
    Json(report::summarize(&service.state.config.runner, &log_text))
}

async fn artifact_handler(
    State(service): State<Service>,
    UrlPath((dir, path)): UrlPath<(String, String)>,
) -> Response {
    artifacts::serve_artifact(&service.state.config.runner.root, &dir, &path).await
}

//! Operator JSON API

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use crate::job::JobKind;
use crate::runner::RunnerStatus;
use crate::suspicious::SuspiciousKind;
use crate::{Console, ConsoleError, ExportReport};

/// Build the dashboard axum router
pub fn build_router(console: Console) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/job", get(job_handler))
        .route("/api/health", get(backend_health_handler))
        .route("/api/runner", get(runner_handler))
        .route("/api/runner/reset", post(runner_reset_handler))
        .route("/api/jobs", post(start_job_handler))
        .route("/api/notices", get(notices_handler))
        .route("/api/notices/{id}", delete(dismiss_handler))
        .route("/api/export/progress", get(export_progress_handler))
        .route("/api/export/{kind}", post(export_handler))
        .layer(CorsLayer::permissive())
        .with_state(console)
}

/// A [`ConsoleError`] rendered as `{"detail": ...}`
struct ApiError(ConsoleError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ConsoleError::Api {
                status: Some(code), ..
            } if (400..500).contains(code) => {
                StatusCode::from_u16(*code).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            ConsoleError::Api { .. } | ConsoleError::Http(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let detail = self.0.user_message("Request failed");
        (status, Json(serde_json::json!({ "detail": detail }))).into_response()
    }
}

async fn health_handler() -> impl IntoResponse {
    "OK"
}

async fn job_handler(State(console): State<Console>) -> impl IntoResponse {
    Json((*console.job_store().snapshot()).clone())
}

async fn backend_health_handler(State(console): State<Console>) -> impl IntoResponse {
    Json((*console.health_store().snapshot()).clone())
}

async fn runner_handler(State(console): State<Console>) -> impl IntoResponse {
    Json(console.runner().view())
}

async fn runner_reset_handler(State(console): State<Console>) -> impl IntoResponse {
    console.runner().reset();
    Json(console.runner().view())
}

async fn start_job_handler(
    State(console): State<Console>,
    Json(kind): Json<JobKind>,
) -> Response {
    let runner = console.runner();
    if !runner.run_kind(&kind).await {
        return (
            StatusCode::CONFLICT,
            Json(serde_json::json!({ "detail": "Another job is already running" })),
        )
            .into_response();
    }
    let view = runner.view();
    let status = if view.status == RunnerStatus::Error {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::ACCEPTED
    };
    (status, Json(view)).into_response()
}

async fn notices_handler(State(console): State<Console>) -> impl IntoResponse {
    Json(console.notices().notices())
}

async fn dismiss_handler(
    State(console): State<Console>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    console.notices().dismiss(&id);
    StatusCode::NO_CONTENT
}

async fn export_progress_handler(State(console): State<Console>) -> impl IntoResponse {
    Json(console.export_progress())
}

#[derive(Debug, Default, Deserialize)]
struct ExportRequest {
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    search: Option<String>,
    #[serde(default)]
    confirm: bool,
}

async fn export_handler(
    State(console): State<Console>,
    Path(kind): Path<SuspiciousKind>,
    Json(request): Json<ExportRequest>,
) -> Response {
    match console
        .export(kind, request.date, request.search, request.confirm)
        .await
    {
        Ok(report @ ExportReport::NeedsConfirmation { .. }) => {
            (StatusCode::CONFLICT, Json(report)).into_response()
        }
        Ok(ExportReport::Busy) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "status": "busy",
                "detail": "An export is already running",
            })),
        )
            .into_response(),
        Ok(report) => Json(report).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

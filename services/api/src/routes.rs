use crate::infra::{AppState, SurveyBackend};
use axum::extract::Path;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use field_survey::surveys::survey_router;
use serde_json::json;
use std::io::ErrorKind;
use tracing::error;

pub(crate) fn with_survey_routes(backend: &SurveyBackend) -> Router {
    survey_router(backend.catalog(), backend.intake(), backend.support())
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
        .route("/media/:file", get(media_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Serves recordings written by the local media store.
pub(crate) async fn media_endpoint(
    Extension(state): Extension<AppState>,
    Path(file): Path<String>,
) -> Response {
    let not_found = || {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "Media not found." })),
        )
            .into_response()
    };

    let Some(path) = state.media.resolve(&file) else {
        return not_found();
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let content_type = mime_guess::from_path(&path).first_or_octet_stream();
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, content_type.essence_str().to_string())],
                bytes,
            )
                .into_response()
        }
        Err(err) if err.kind() == ErrorKind::NotFound => not_found(),
        Err(err) => {
            error!(error = %err, file = %file, "failed to read media file");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "message": "Server error" })),
            )
                .into_response()
        }
    }
}

// Copyright 2026 Fixture Cache Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP REST API for the fixture cache.
//!
//! Each endpoint maps 1:1 to a [`FixtureService`] operation. Failures are
//! returned as `{ "error": message }` with a status that tells callers
//! whether to fix the request (400) or try again later (500 / 503).

use crate::error::{FetchError, RenderError};
use crate::model::{FetchResult, WeekDiscovery, WeekOption};
use crate::service::FixtureService;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;
use std::net::SocketAddr;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the axum Router with all REST endpoints.
pub fn router(service: FixtureService) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/fixtures", get(handle_current))
        .route("/api/fixtures/:date", get(handle_by_date))
        .route("/api/weeks", get(handle_weeks))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Serve the REST API on `addr` until Ctrl-C.
pub async fn start(addr: SocketAddr, service: FixtureService) -> anyhow::Result<()> {
    let app = router(service);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("REST API listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("REST API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("could not listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}

// ── Errors ──────────────────────────────────────────────────────

/// A failure rendered as `{ "error": .. }`.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<FetchError> for ApiError {
    fn from(e: FetchError) -> Self {
        let status = match &e {
            FetchError::InvalidDate(_) => StatusCode::BAD_REQUEST,
            FetchError::Render(RenderError::CircuitOpen { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            FetchError::Render(_) | FetchError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("fetch failed: {e}");
        }
        Self::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(serde_json::json!({ "error": self.message })),
        )
            .into_response()
    }
}

// ── Handlers ────────────────────────────────────────────────────

async fn health() -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn handle_current(
    State(service): State<FixtureService>,
) -> Result<Json<FetchResult>, ApiError> {
    Ok(Json(service.fetch_current().await?))
}

async fn handle_by_date(
    State(service): State<FixtureService>,
    Path(date): Path<String>,
) -> Result<Json<FetchResult>, ApiError> {
    Ok(Json(service.fetch_by_date(&date).await?))
}

async fn handle_weeks(
    State(service): State<FixtureService>,
) -> Result<Json<Vec<WeekOption>>, ApiError> {
    match service.list_available_weeks().await {
        WeekDiscovery::Available(options) => Ok(Json(options)),
        WeekDiscovery::Empty => Ok(Json(Vec::new())),
        WeekDiscovery::Failed { reason } => Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            format!("week discovery unavailable: {reason}"),
        )),
    }
}

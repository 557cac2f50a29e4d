// SPDX-License-Identifier: Apache-2.0

use crate::service::InsightsService;
use crate::{InsightsError, InsightsErrorCode};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<InsightsService>,
}

impl AppState {
    #[must_use]
    pub fn new(service: Arc<InsightsService>) -> Self {
        Self { service }
    }
}

#[derive(Debug, Default, Deserialize)]
struct InsightsQuery {
    year: Option<String>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/v1/insights/:dataset", get(insights_handler))
        .with_state(state)
}

async fn healthz_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "memory_entries": state.service.memory_entries().await,
        "inflight": state.service.inflight(),
        "engine_runs": state.service.engine_runs(),
        "durable_cache": state.service.durable_metrics(),
    }))
}

async fn insights_handler(
    State(state): State<AppState>,
    Path(dataset): Path<String>,
    Query(query): Query<InsightsQuery>,
) -> Response {
    let year = query.year.as_deref().unwrap_or("");
    match state.service.aggregate_insights(&dataset, year).await {
        Ok(result) => Json(&*result).into_response(),
        Err(e) => error_response(&e),
    }
}

fn status_for(code: InsightsErrorCode) -> StatusCode {
    match code {
        InsightsErrorCode::Validation => StatusCode::BAD_REQUEST,
        InsightsErrorCode::Resolution => StatusCode::BAD_GATEWAY,
        InsightsErrorCode::Processing | InsightsErrorCode::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(e: &InsightsError) -> Response {
    (
        status_for(e.code),
        Json(json!({ "code": e.code.as_str(), "message": e.message })),
    )
        .into_response()
}

//! Minimal status/query HTTP surface for the `serve` CLI verb.
//!
//! `create_router`/`/api/status`/`#[axum::debug_handler]`/JSON error-body
//! shape via `serde_json::json!`; the directory-picker and ingest-trigger
//! endpoints of an earlier web-UI shaped API are dropped since `create` is
//! its own CLI verb, not a web action.

use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::app_state::AppState;
use crate::retrieval::{global, local};

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/query", post(query_handler))
        .with_state(app_state)
}

#[derive(Deserialize)]
pub struct QueryPayload {
    question: String,
    #[serde(default)]
    global: bool,
}

#[derive(Serialize)]
pub struct QueryResponse {
    answer: String,
}

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<crate::app_state::Status> {
    Json(state.status.lock().unwrap().clone())
}

#[axum::debug_handler]
async fn query_handler(
    State(state): State<AppState>,
    Json(payload): Json<QueryPayload>,
) -> Result<Json<QueryResponse>, (StatusCode, Json<serde_json::Value>)> {
    let result = if payload.global {
        global::answer_global(
            &state.graph,
            state.llm.clone(),
            &state.config.global_retrieval,
            state.config.concurrency.max_concurrency,
            &payload.question,
        )
        .await
    } else {
        local::answer_local(&state.graph, &state.llm, &state.config, &payload.question).await
    };

    result.map(|answer| Json(QueryResponse { answer })).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": e.to_string()})),
        )
    })
}

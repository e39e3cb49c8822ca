//! Signing request handlers.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use custody_core::types::Request;
use serde::Deserialize;
use serde_json::Value;
use signing_engine::PollSummary;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::state::AppState;

/// Body of `POST /requests`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub account_id: Uuid,
    pub method: String,
    /// JSON-RPC params as the wallet received them.
    #[serde(default)]
    pub params: Value,
}

pub async fn list_requests(State(state): State<Arc<AppState>>) -> Json<Vec<Request>> {
    Json(state.orchestrator.lock().await.list_requests())
}

pub async fn get_request(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Request>> {
    let Path(id) = id?;
    Ok(Json(state.orchestrator.lock().await.get_request(id)?))
}

pub async fn submit_request(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Request>)> {
    let Json(body) = payload?;
    let request = state
        .orchestrator
        .lock()
        .await
        .submit(body.account_id, &body.method, &body.params)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn reject_request(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Request>> {
    let Path(id) = id?;
    Ok(Json(
        state.orchestrator.lock().await.reject_request(id).await?,
    ))
}

/// Run one poll cycle now instead of waiting for the poller.
pub async fn poll_requests(State(state): State<Arc<AppState>>) -> Json<PollSummary> {
    Json(state.orchestrator.lock().await.poll_all().await)
}

//! Account handlers.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use custody_core::types::{Account, NewAccount};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::state::AppState;

pub async fn list_accounts(State(state): State<Arc<AppState>>) -> Json<Vec<Account>> {
    Json(state.orchestrator.lock().await.list_accounts())
}

pub async fn get_account(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Account>> {
    let Path(id) = id?;
    Ok(Json(state.orchestrator.lock().await.get_account(id)?))
}

pub async fn create_account(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewAccount>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Account>)> {
    let Json(input) = payload?;
    let account = state.orchestrator.lock().await.create_account(input).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Account>> {
    let Path(id) = id?;
    Ok(Json(state.orchestrator.lock().await.delete_account(id).await?))
}

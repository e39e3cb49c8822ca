//! Configuration handler.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use signing_engine::{ConfigurationUpdate, Settings};
use std::sync::Arc;

use crate::error::ApiResult;
use crate::state::AppState;

/// Install custody credentials and change runtime settings.
pub async fn update_configuration(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ConfigurationUpdate>, JsonRejection>,
) -> ApiResult<Json<Settings>> {
    let Json(update) = payload?;
    let settings = state
        .orchestrator
        .lock()
        .await
        .update_configuration(update)
        .await?;
    Ok(Json(settings))
}

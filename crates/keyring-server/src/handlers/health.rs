//! Health check handlers.

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub started_at: DateTime<Utc>,
    pub accounts: usize,
    pub pending_requests: usize,
    pub enhanced_mode: bool,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let orchestrator = state.orchestrator.lock().await;
    let pending_requests = orchestrator
        .list_requests()
        .iter()
        .filter(|r| !r.is_terminal())
        .count();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        started_at: state.started_at,
        accounts: orchestrator.list_accounts().len(),
        pending_requests,
        enhanced_mode: orchestrator.settings().enhanced_mode,
    })
}

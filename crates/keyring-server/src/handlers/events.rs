use axum::extract::State;
use axum::Json;
use std::sync::Arc;

use crate::host::JournalEntry;
use crate::state::AppState;

/// Recent keyring events and user notices.
pub async fn list_events(State(state): State<Arc<AppState>>) -> Json<Vec<JournalEntry>> {
    Json(state.host.journal())
}

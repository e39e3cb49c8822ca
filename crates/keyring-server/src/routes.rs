//! API route definitions.

use axum::routing::{get, post, put};
use axum::Router;
use std::sync::Arc;

use crate::handlers::{accounts, configuration, events, health, requests};
use crate::state::AppState;

/// Create the main router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        // Accounts
        .route(
            "/accounts",
            get(accounts::list_accounts).post(accounts::create_account),
        )
        .route(
            "/accounts/{id}",
            get(accounts::get_account).delete(accounts::delete_account),
        )
        // Requests
        .route(
            "/requests",
            get(requests::list_requests).post(requests::submit_request),
        )
        .route("/requests/poll", post(requests::poll_requests))
        .route("/requests/{id}", get(requests::get_request))
        .route("/requests/{id}/reject", post(requests::reject_request))
        // Host integration
        .route("/configuration", put(configuration::update_configuration))
        .route("/events", get(events::list_events))
        .with_state(state)
}

//! Keyring Server
//!
//! HTTP surface the host wallet talks to, backed by a file-persisted
//! signing orchestrator and a background poller.

pub mod config;
pub mod error;
pub mod handlers;
pub mod host;
pub mod poller;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use error::ApiError;
pub use host::FileHost;
pub use poller::spawn_poller;
pub use routes::create_router;
pub use state::AppState;

use axum::http::{header, Method, Request};
use custody_core::config::KeyringConfig;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

pub struct KeyringServer {
    config: ServerConfig,
    keyring: KeyringConfig,
    state: Arc<AppState>,
}

impl KeyringServer {
    pub async fn new(config: ServerConfig, keyring: KeyringConfig) -> anyhow::Result<Self> {
        let state = AppState::build(&keyring, &config).await?;
        Ok(Self {
            config,
            keyring,
            state,
        })
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let router = create_router(self.state.clone())
            .layer(
                TraceLayer::new_for_http()
                    .on_request(|request: &Request<_>, _span: &tracing::Span| {
                        tracing::info!(
                            method = %request.method(),
                            uri = %request.uri(),
                            "Incoming request"
                        );
                    })
                    .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
            )
            .layer(if self.config.cors_permissive {
                CorsLayer::permissive()
            } else {
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                    .allow_headers([header::CONTENT_TYPE])
            });

        spawn_poller(self.state.clone(), self.keyring.poller.interval_secs);

        let addr = self.config.socket_addr()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!(
            address = %addr,
            state_path = %self.config.state_path.display(),
            custody = %self.keyring.custody.api_url,
            "Keyring server listening"
        );
        axum::serve(listener, router).await?;
        Ok(())
    }
}

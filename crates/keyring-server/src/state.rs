//! Application state shared across handlers.

use anyhow::Context;
use auth::CredentialStore;
use chrono::{DateTime, Utc};
use custody_core::api::{CustodyClient, HttpRpcProbe};
use custody_core::config::KeyringConfig;
use signing_engine::SigningOrchestrator;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::config::ServerConfig;
use crate::host::FileHost;

/// Shared application state.
pub struct AppState {
    /// One operation at a time runs against the keyring.
    pub orchestrator: Mutex<SigningOrchestrator>,
    /// Host runtime, kept for its event journal.
    pub host: Arc<FileHost>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Wire the custody client, probe and host together and load saved state.
    pub async fn build(config: &KeyringConfig, server: &ServerConfig) -> anyhow::Result<Arc<Self>> {
        let seed = server
            .entropy_seed
            .as_deref()
            .context("KEYRING_ENTROPY_SEED must be set")?;
        let host = Arc::new(FileHost::new(server.state_path.clone(), seed)?);

        let credentials = CredentialStore::new();
        let custody = CustodyClient::from_config(&config.custody, credentials.clone())?
            .with_observer(host.clone());

        let mut orchestrator =
            SigningOrchestrator::new(host.clone(), Arc::new(custody), credentials, config);
        if let Some(probe_url) = &config.enhanced_mode.probe_url {
            orchestrator = orchestrator.with_probe(Arc::new(HttpRpcProbe::new(probe_url.clone())?));
        }
        orchestrator
            .load()
            .await
            .context("failed to load keyring state")?;

        Ok(Arc::new(Self {
            orchestrator: Mutex::new(orchestrator),
            host,
            started_at: Utc::now(),
        }))
    }
}

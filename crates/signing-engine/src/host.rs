//! Boundary to the wallet runtime hosting the keyring.

use async_trait::async_trait;
use auth::SecretSeed;
use custody_core::types::{Account, SigningResult};
use custody_core::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::KeyringState;

/// Events the host relays to the wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum KeyringEvent {
    AccountCreated { account: Account },
    AccountDeleted { account_id: Uuid },
    RequestApproved { request_id: Uuid, result: SigningResult },
    RequestRejected { request_id: Uuid },
}

/// User-facing notices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum Notice {
    /// Enhanced mode is on but chain RPC does not go through the custody proxy.
    ProxyNotConfigured,
    /// A session expired and could not be refreshed.
    SessionInvalidated { organization_id: String },
}

/// Services the host wallet provides to the keyring.
#[async_trait]
pub trait HostRuntime: Send + Sync {
    /// Last saved state, or `None` on first run.
    async fn load_state(&self) -> Result<Option<KeyringState>>;

    /// Replace the saved state.
    async fn save_state(&self, state: &KeyringState) -> Result<()>;

    /// Stable entropy bound to `salt`. The same salt always yields the same
    /// seed for this host.
    async fn entropy(&self, salt: &str) -> Result<SecretSeed>;

    async fn notify(&self, notice: Notice);

    async fn emit(&self, event: KeyringEvent);
}

//! Persisted keyring state.

use auth::SessionToken;
use custody_core::types::{Account, Request, RequestStatus, RpcRoute};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Runtime settings changed through configuration updates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    #[serde(default)]
    pub enhanced_mode: bool,
    #[serde(default)]
    pub rpc_routes: Vec<RpcRoute>,
}

impl Settings {
    /// Custody relay endpoint for a chain, if one is configured.
    pub fn relay_for(&self, chain_id: u64) -> Option<&str> {
        self.rpc_routes
            .iter()
            .find(|route| route.chain_id == chain_id)
            .map(|route| route.url.as_str())
    }
}

/// Everything the host persists on the keyring's behalf.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyringState {
    #[serde(default)]
    pub accounts: BTreeMap<Uuid, Account>,
    #[serde(default)]
    pub requests: BTreeMap<Uuid, Request>,
    #[serde(default)]
    pub credentials: BTreeMap<String, SessionToken>,
    #[serde(default)]
    pub settings: Settings,
}

impl KeyringState {
    /// Ids of pending requests, oldest first.
    pub fn pending_request_ids(&self) -> Vec<Uuid> {
        let mut pending: Vec<&Request> = self
            .requests
            .values()
            .filter(|r| r.status == RequestStatus::Pending)
            .collect();
        pending.sort_by_key(|r| r.created_at);
        pending.into_iter().map(|r| r.id).collect()
    }

    pub fn has_pending_requests(&self, account_id: Uuid) -> bool {
        self.requests
            .values()
            .any(|r| r.account_id == account_id && r.status == RequestStatus::Pending)
    }
}

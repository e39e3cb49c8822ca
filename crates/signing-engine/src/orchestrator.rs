//! Signing request lifecycle.
//!
//! ```text
//! submit ──► Pending ──poll: remote success──► Signed
//!               │
//!               ├──poll: remote failure──────► Rejected
//!               └──reject (host)─────────────► Rejected
//! ```
//!
//! A request is only recorded once the custody service has accepted the
//! job. Polling never moves a request out of `Pending` on a local error;
//! only a remote failure status rejects it.

use auth::{Credential, CredentialStore, DeterministicKeyVault};
use chrono::Utc;
use custody_core::api::{
    CreateMessageSignature, CreateTransaction, CustodyApi, MessageKind, RpcProbe,
    TransactionInput,
};
use custody_core::config::KeyringConfig;
use custody_core::signing::{decode_raw_signature, reconstruct_signature};
use custody_core::types::{
    Account, NewAccount, Request, RequestStatus, RpcRoute, SigningRequest, SigningResult,
    TransactionKind,
};
use custody_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::host::{HostRuntime, KeyringEvent, Notice};
use crate::state::{KeyringState, Settings};

/// Host entropy salt for the keys that unwrap custody signatures.
pub const SIGNATURE_ENTROPY_SALT: &str = "vault-keyring/signature-encryption";

/// Outcome of one poll cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollSummary {
    pub checked: usize,
    pub signed: usize,
    pub rejected: usize,
    pub still_pending: usize,
    pub failed: usize,
    /// Enhanced mode is on and the custody proxy was not detected.
    pub skipped: bool,
}

/// Credentials and settings pushed by the host.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationUpdate {
    #[serde(default)]
    pub credentials: Vec<Credential>,
    #[serde(default)]
    pub enhanced_mode: Option<bool>,
    #[serde(default)]
    pub rpc_routes: Option<Vec<RpcRoute>>,
}

/// Owns accounts, requests and credentials, and drives requests to a
/// terminal state.
pub struct SigningOrchestrator {
    host: Arc<dyn HostRuntime>,
    custody: Arc<dyn CustodyApi>,
    probe: Option<Arc<dyn RpcProbe>>,
    credentials: CredentialStore,
    vault: DeterministicKeyVault,
    source_tag: String,
    /// Outcome of the last proxy probe.
    proxy_missing: AtomicBool,
    state: KeyringState,
}

impl SigningOrchestrator {
    /// `credentials` must be the store the custody client reads from.
    pub fn new(
        host: Arc<dyn HostRuntime>,
        custody: Arc<dyn CustodyApi>,
        credentials: CredentialStore,
        config: &KeyringConfig,
    ) -> Self {
        let state = KeyringState {
            settings: Settings {
                enhanced_mode: config.enhanced_mode.enabled,
                rpc_routes: config.enhanced_mode.rpc_routes.clone(),
            },
            ..Default::default()
        };
        Self {
            host,
            custody,
            probe: None,
            credentials,
            vault: DeterministicKeyVault::new(),
            source_tag: config.custody.source_tag.clone(),
            proxy_missing: AtomicBool::new(false),
            state,
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn RpcProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Restore saved state from the host. Keeps the configured defaults on
    /// first run.
    pub async fn load(&mut self) -> Result<()> {
        if let Some(state) = self.host.load_state().await? {
            info!(
                accounts = state.accounts.len(),
                requests = state.requests.len(),
                "Loaded keyring state"
            );
            self.credentials.restore(state.credentials.clone()).await;
            self.state = state;
        }
        Ok(())
    }

    /// Save the full state, including the current credentials.
    pub async fn persist(&mut self) -> Result<()> {
        self.state.credentials = self.credentials.snapshot().await;
        self.host.save_state(&self.state).await
    }

    pub fn settings(&self) -> &Settings {
        &self.state.settings
    }

    // ==================== Accounts ====================

    pub fn list_accounts(&self) -> Vec<Account> {
        self.state.accounts.values().cloned().collect()
    }

    pub fn get_account(&self, id: Uuid) -> Result<Account> {
        self.state
            .accounts
            .get(&id)
            .cloned()
            .ok_or(Error::AccountNotFound(id))
    }

    pub async fn create_account(&mut self, input: NewAccount) -> Result<Account> {
        let account = input.into_account()?;

        if self
            .state
            .accounts
            .values()
            .any(|existing| existing.address == account.address)
        {
            return Err(Error::Validation(format!(
                "account {} already exists",
                account.address
            )));
        }
        if !self.credentials.contains(&account.organization_id).await {
            return Err(Error::Validation(format!(
                "no credential installed for organization {}",
                account.organization_id
            )));
        }

        self.state.accounts.insert(account.id, account.clone());
        self.persist().await?;
        info!(account_id = %account.id, address = %account.address, "Account created");
        self.host
            .emit(KeyringEvent::AccountCreated {
                account: account.clone(),
            })
            .await;
        Ok(account)
    }

    /// Remove an account. Refused while it still has pending requests;
    /// finished requests are kept.
    pub async fn delete_account(&mut self, id: Uuid) -> Result<Account> {
        if !self.state.accounts.contains_key(&id) {
            return Err(Error::AccountNotFound(id));
        }
        if self.state.has_pending_requests(id) {
            return Err(Error::Validation(format!(
                "account {} has pending requests",
                id
            )));
        }

        let account = self
            .state
            .accounts
            .remove(&id)
            .ok_or(Error::AccountNotFound(id))?;
        self.persist().await?;
        info!(account_id = %id, "Account deleted");
        self.host
            .emit(KeyringEvent::AccountDeleted { account_id: id })
            .await;
        Ok(account)
    }

    // ==================== Requests ====================

    pub fn list_requests(&self) -> Vec<Request> {
        self.state.requests.values().cloned().collect()
    }

    pub fn get_request(&self, id: Uuid) -> Result<Request> {
        self.state
            .requests
            .get(&id)
            .cloned()
            .ok_or(Error::RequestNotFound(id))
    }

    /// Create a custody signing job and record it as pending.
    ///
    /// Nothing is recorded if the custody service refuses the job.
    pub async fn submit(&mut self, account_id: Uuid, method: &str, params: &Value) -> Result<Request> {
        let account = self.get_account(account_id)?;
        let signing_request = SigningRequest::parse(method, params)?;
        if !account.supports(method) {
            return Err(Error::UnsupportedMethod(method.to_string()));
        }
        if let Some(signer) = signing_request.signer()? {
            if signer != account.address {
                return Err(Error::Validation(format!(
                    "signer {} does not match account {}",
                    signer, account.address
                )));
            }
        }

        let id = Uuid::new_v4();
        let outcome = self.create_remote_job(id, &account, &signing_request).await;
        let remote_request_id = match outcome {
            Ok(remote_request_id) => remote_request_id,
            Err(e) => {
                // Credentials may have been refreshed or dropped on the way.
                if let Err(persist_error) = self.persist().await {
                    warn!(error = %persist_error, "Failed to save state after rejected submission");
                }
                return Err(e);
            }
        };

        let request = Request::pending(
            id,
            account.id,
            account.address,
            signing_request,
            remote_request_id,
        );
        self.state.requests.insert(id, request.clone());
        self.persist().await?;
        info!(
            request_id = %id,
            remote_request_id = %request.remote_request_id,
            method = %request.method,
            "Signing request submitted"
        );
        Ok(request)
    }

    async fn create_remote_job(
        &self,
        id: Uuid,
        account: &Account,
        request: &SigningRequest,
    ) -> Result<String> {
        let organization_id = account.organization_id.as_str();
        match request {
            SigningRequest::LegacyTransaction(tx) | SigningRequest::Eip1559Transaction(tx) => {
                let enhanced = self.state.settings.enhanced_mode;
                if enhanced && !self.probe_proxy().await.0 {
                    self.host.notify(Notice::ProxyNotConfigured).await;
                    return Err(Error::ProxyNotConfigured);
                }
                let chain_id = tx.chain_id()?;
                let kind = match request {
                    SigningRequest::LegacyTransaction(_) => TransactionKind::Legacy,
                    _ => TransactionKind::Eip1559,
                };
                let job = CreateTransaction {
                    kind,
                    transaction: TransactionInput::from_params(tx, account.address)?,
                    source: self.source_tag.clone(),
                    submit: false,
                    relay_node_url: enhanced
                        .then(|| self.state.settings.relay_for(chain_id))
                        .flatten()
                        .map(str::to_string),
                    currency: tx.currency()?.to_string(),
                };
                self.custody.create_transaction(organization_id, &job).await
            }
            SigningRequest::PersonalSign { message, address } => {
                let job = CreateMessageSignature {
                    kind: MessageKind::PersonalSign,
                    message: message.clone(),
                    address: address.to_checksum(None),
                    version: None,
                    source: self.source_tag.clone(),
                    raw_signing: true,
                    encryption_public_key: self.encryption_key(id).await?,
                };
                self.custody
                    .create_message_signature(organization_id, &job)
                    .await
            }
            SigningRequest::SignTypedData {
                version,
                address,
                data,
            } => {
                let job = CreateMessageSignature {
                    kind: MessageKind::TypedData(*version),
                    message: data.to_string(),
                    address: address.to_checksum(None),
                    version: Some(version.as_str().to_string()),
                    source: self.source_tag.clone(),
                    raw_signing: true,
                    encryption_public_key: self.encryption_key(id).await?,
                };
                self.custody
                    .create_message_signature(organization_id, &job)
                    .await
            }
        }
    }

    /// Public key the custody service encrypts this request's signature to.
    async fn encryption_key(&self, request_id: Uuid) -> Result<String> {
        let seed = self.host.entropy(SIGNATURE_ENTROPY_SALT).await?;
        Ok(self
            .vault
            .public_key_hex(seed, &request_id.to_string())?)
    }

    /// Reject a pending request on the host's behalf.
    pub async fn reject_request(&mut self, id: Uuid) -> Result<Request> {
        let request = self.get_request(id)?;
        if request.is_terminal() {
            return Err(Error::RequestAlreadyFinalized(id));
        }
        let request = self.transition(id, RequestStatus::Rejected, None).await?;
        info!(request_id = %id, "Request rejected by host");
        Ok(request)
    }

    // ==================== Finalization ====================

    /// Check one request against the custody service.
    ///
    /// Returns the request's status afterwards. A request that is already
    /// terminal is refused before any remote call.
    pub async fn finalize(&mut self, id: Uuid) -> Result<RequestStatus> {
        let outcome = self.finalize_request(id).await;
        if !matches!(outcome, Err(Error::RequestAlreadyFinalized(_) | Error::RequestNotFound(_))) {
            self.persist().await?;
        }
        outcome
    }

    async fn finalize_request(&mut self, id: Uuid) -> Result<RequestStatus> {
        let request = self.get_request(id)?;
        if request.is_terminal() {
            return Err(Error::RequestAlreadyFinalized(id));
        }
        let organization_id = self.get_account(request.account_id)?.organization_id;

        if request.params.is_transaction() {
            self.finalize_transaction(&request, &organization_id).await
        } else {
            self.finalize_message(&request, &organization_id).await
        }
    }

    async fn finalize_transaction(
        &mut self,
        request: &Request,
        organization_id: &str,
    ) -> Result<RequestStatus> {
        let tx_info = self
            .custody
            .transaction_info(organization_id, &request.remote_request_id)
            .await?;

        if tx_info.status.is_failure() {
            info!(request_id = %request.id, status = ?tx_info.status, "Custody rejected transaction");
            self.transition(request.id, RequestStatus::Rejected, None)
                .await?;
            return Ok(RequestStatus::Rejected);
        }
        if !tx_info.status.is_success() {
            debug!(request_id = %request.id, status = ?tx_info.status, "Transaction not final yet");
            return Ok(RequestStatus::Pending);
        }

        let signed = tx_info.signed_transaction.ok_or_else(|| {
            Error::Protocol("signed transaction missing from final transaction info".into())
        })?;
        self.transition(
            request.id,
            RequestStatus::Signed,
            Some(SigningResult::Transaction(signed.transaction)),
        )
        .await?;
        info!(request_id = %request.id, "Transaction signed");
        Ok(RequestStatus::Signed)
    }

    async fn finalize_message(
        &mut self,
        request: &Request,
        organization_id: &str,
    ) -> Result<RequestStatus> {
        let remote = self
            .custody
            .get_request(organization_id, &request.remote_request_id)
            .await?;
        if !remote.status.is_success() {
            debug!(request_id = %request.id, status = ?remote.status, "Message signature not final yet");
            return Ok(RequestStatus::Pending);
        }

        let encrypted = remote
            .signatures
            .and_then(|s| s.raw)
            .ok_or_else(|| Error::Protocol("final request carries no raw signature".into()))?;
        let payload = hex::decode(encrypted.trim_start_matches("0x"))
            .map_err(|e| Error::Protocol(format!("raw signature is not hex: {}", e)))?;

        let seed = self.host.entropy(SIGNATURE_ENTROPY_SALT).await?;
        let plaintext = self
            .vault
            .decrypt(seed, &request.id.to_string(), &payload)?;
        let raw = decode_raw_signature(&plaintext)?;
        let digest = request.params.digest()?;
        let signature = reconstruct_signature(&digest, &raw, &request.address)?;

        self.transition(
            request.id,
            RequestStatus::Signed,
            Some(SigningResult::Message { signature }),
        )
        .await?;
        info!(request_id = %request.id, "Message signed");
        Ok(RequestStatus::Signed)
    }

    /// Move a pending request to a terminal status, save, then tell the host.
    async fn transition(
        &mut self,
        id: Uuid,
        status: RequestStatus,
        result: Option<SigningResult>,
    ) -> Result<Request> {
        let request = self
            .state
            .requests
            .get_mut(&id)
            .ok_or(Error::RequestNotFound(id))?;
        if request.is_terminal() {
            return Err(Error::RequestAlreadyFinalized(id));
        }
        request.status = status;
        request.result = result.clone();
        request.updated_at = Utc::now();
        let request = request.clone();

        self.persist().await?;

        let event = match (status, result) {
            (RequestStatus::Signed, Some(result)) => KeyringEvent::RequestApproved {
                request_id: id,
                result,
            },
            _ => KeyringEvent::RequestRejected { request_id: id },
        };
        self.host.emit(event).await;
        Ok(request)
    }

    /// Check every pending request once.
    ///
    /// Failures are logged per request and leave it pending. Skipped
    /// entirely when enhanced mode is on and the custody proxy is missing.
    pub async fn poll_all(&mut self) -> PollSummary {
        let mut summary = PollSummary::default();

        if self.state.settings.enhanced_mode {
            let (detected, changed) = self.probe_proxy().await;
            if !detected {
                // Repeated ticks against a missing proxy notify once.
                if changed {
                    self.host.notify(Notice::ProxyNotConfigured).await;
                }
                warn!("Skipping poll: custody RPC proxy not detected");
                summary.skipped = true;
                return summary;
            }
        }

        for id in self.state.pending_request_ids() {
            summary.checked += 1;
            match self.finalize_request(id).await {
                Ok(RequestStatus::Signed) => summary.signed += 1,
                Ok(RequestStatus::Rejected) => summary.rejected += 1,
                Ok(RequestStatus::Pending) => summary.still_pending += 1,
                Err(e) => {
                    warn!(request_id = %id, error = %e, "Failed to finalize request");
                    summary.failed += 1;
                }
            }
        }

        if let Err(e) = self.persist().await {
            warn!(error = %e, "Failed to save state after poll");
        }
        if summary.checked > 0 {
            info!(
                checked = summary.checked,
                signed = summary.signed,
                rejected = summary.rejected,
                failed = summary.failed,
                "Poll cycle complete"
            );
        }
        summary
    }

    /// Probe the custody proxy. Returns whether it was detected and whether
    /// that differs from the previous probe.
    async fn probe_proxy(&self) -> (bool, bool) {
        let detected = match &self.probe {
            Some(probe) => match probe.proxy_enabled().await {
                Ok(detected) => detected,
                Err(e) => {
                    warn!(error = %e, "RPC proxy probe failed");
                    false
                }
            },
            None => {
                warn!("Enhanced mode is on but no RPC probe is configured");
                false
            }
        };
        let was_missing = self.proxy_missing.swap(!detected, Ordering::Relaxed);
        (detected, was_missing == detected)
    }

    // ==================== Configuration ====================

    /// Install credentials and update settings.
    pub async fn update_configuration(&mut self, update: ConfigurationUpdate) -> Result<Settings> {
        for credential in &update.credentials {
            if credential.organization_id.trim().is_empty() {
                return Err(Error::Validation("organizationId must not be empty".into()));
            }
            if !credential.session_token.is_complete() {
                return Err(Error::Validation(format!(
                    "session token for {} is incomplete",
                    credential.organization_id
                )));
            }
        }
        if let Some(routes) = &update.rpc_routes {
            for route in routes {
                route.validate()?;
            }
        }

        for credential in update.credentials {
            self.credentials
                .install(&credential.organization_id, credential.session_token)
                .await;
        }
        if let Some(enabled) = update.enhanced_mode {
            self.state.settings.enhanced_mode = enabled;
        }
        if let Some(routes) = update.rpc_routes {
            self.state.settings.rpc_routes = routes;
        }
        self.persist().await?;
        info!(
            enhanced_mode = self.state.settings.enhanced_mode,
            routes = self.state.settings.rpc_routes.len(),
            "Configuration updated"
        );
        Ok(self.state.settings.clone())
    }
}

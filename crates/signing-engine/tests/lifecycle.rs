//! Request lifecycle scenarios against in-memory host and custody fakes.

use alloy_primitives::B256;
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use auth::{Credential, CredentialStore, SecretSeed, SessionToken};
use custody_core::api::{
    CreateMessageSignature, CreateTransaction, CustodyApi, RemoteRequest, RpcProbe,
    TransactionInfo,
};
use custody_core::config::KeyringConfig;
use custody_core::types::{
    Account, NewAccount, RequestStatus, RpcRoute, SigningResult, ETH_SIGN_TRANSACTION,
    PERSONAL_SIGN,
};
use custody_core::{Error, Result};
use serde_json::{json, Value};
use signing_engine::{
    ConfigurationUpdate, HostRuntime, KeyringEvent, KeyringState, Notice, SigningOrchestrator,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const ORG: &str = "org-1";
const HARDHAT_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
const HARDHAT_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

// ==================== Fakes ====================

#[derive(Default)]
struct FakeHost {
    state: Mutex<Option<KeyringState>>,
    saves: AtomicUsize,
    events: Mutex<Vec<KeyringEvent>>,
    notices: Mutex<Vec<Notice>>,
}

impl FakeHost {
    fn events(&self) -> Vec<KeyringEvent> {
        self.events.lock().unwrap().clone()
    }

    fn rejections(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, KeyringEvent::RequestRejected { .. }))
            .count()
    }
}

#[async_trait]
impl HostRuntime for FakeHost {
    async fn load_state(&self) -> Result<Option<KeyringState>> {
        Ok(self.state.lock().unwrap().clone())
    }

    async fn save_state(&self, state: &KeyringState) -> Result<()> {
        *self.state.lock().unwrap() = Some(state.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn entropy(&self, _salt: &str) -> Result<SecretSeed> {
        Ok(SecretSeed::new([7u8; 32]))
    }

    async fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }

    async fn emit(&self, event: KeyringEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[derive(Default)]
struct FakeCustody {
    calls: Mutex<Vec<&'static str>>,
    last_transaction: Mutex<Option<CreateTransaction>>,
    last_message: Mutex<Option<CreateMessageSignature>>,
    transaction_info: Mutex<Option<Value>>,
    remote_request: Mutex<Option<Value>>,
    refuse_jobs: Mutex<bool>,
}

impl FakeCustody {
    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn set_transaction_info(&self, value: Value) {
        *self.transaction_info.lock().unwrap() = Some(value);
    }

    fn set_remote_request(&self, value: Value) {
        *self.remote_request.lock().unwrap() = Some(value);
    }
}

#[async_trait]
impl CustodyApi for FakeCustody {
    async fn create_transaction(&self, _org: &str, request: &CreateTransaction) -> Result<String> {
        self.calls.lock().unwrap().push("create_transaction");
        if *self.refuse_jobs.lock().unwrap() {
            return Err(Error::BadStatus(503));
        }
        *self.last_transaction.lock().unwrap() = Some(request.clone());
        Ok("remote-tx".to_string())
    }

    async fn create_message_signature(
        &self,
        _org: &str,
        request: &CreateMessageSignature,
    ) -> Result<String> {
        self.calls.lock().unwrap().push("create_message_signature");
        if *self.refuse_jobs.lock().unwrap() {
            return Err(Error::BadStatus(503));
        }
        *self.last_message.lock().unwrap() = Some(request.clone());
        Ok("remote-msg".to_string())
    }

    async fn transaction_info(&self, _org: &str, _remote_id: &str) -> Result<TransactionInfo> {
        self.calls.lock().unwrap().push("transaction_info");
        let value = self.transaction_info.lock().unwrap().clone();
        match value {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Err(Error::BadStatus(503)),
        }
    }

    async fn get_request(&self, _org: &str, _remote_id: &str) -> Result<RemoteRequest> {
        self.calls.lock().unwrap().push("get_request");
        let value = self.remote_request.lock().unwrap().clone();
        match value {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Err(Error::BadStatus(503)),
        }
    }
}

struct FakeProbe(AtomicBool);

impl FakeProbe {
    fn set(&self, proxied: bool) {
        self.0.store(proxied, Ordering::SeqCst);
    }
}

#[async_trait]
impl RpcProbe for FakeProbe {
    async fn proxy_enabled(&self) -> Result<bool> {
        Ok(self.0.load(Ordering::SeqCst))
    }
}

// ==================== Helpers ====================

struct Harness {
    orchestrator: SigningOrchestrator,
    host: Arc<FakeHost>,
    custody: Arc<FakeCustody>,
    credentials: CredentialStore,
    probe: Option<Arc<FakeProbe>>,
    account: Account,
}

async fn harness(enhanced: bool, probe: Option<bool>) -> Harness {
    let host = Arc::new(FakeHost::default());
    let custody = Arc::new(FakeCustody::default());
    let credentials = CredentialStore::new();

    let mut config = KeyringConfig::test_config("http://custody.invalid/graphql");
    config.enhanced_mode.enabled = enhanced;

    let mut orchestrator =
        SigningOrchestrator::new(host.clone(), custody.clone(), credentials.clone(), &config);
    let probe = probe.map(|proxied| Arc::new(FakeProbe(AtomicBool::new(proxied))));
    if let Some(probe) = &probe {
        orchestrator = orchestrator.with_probe(probe.clone());
    }

    orchestrator
        .update_configuration(ConfigurationUpdate {
            credentials: vec![Credential {
                organization_id: ORG.to_string(),
                session_token: SessionToken::new("enc", "iv", "tag"),
            }],
            ..Default::default()
        })
        .await
        .unwrap();
    let account = orchestrator
        .create_account(NewAccount {
            address: HARDHAT_ADDRESS.to_string(),
            organization_id: ORG.to_string(),
            supported_methods: None,
        })
        .await
        .unwrap();

    Harness {
        orchestrator,
        host,
        custody,
        credentials,
        probe,
        account,
    }
}

fn eip1559_tx() -> Value {
    json!([{
        "type": "0x2",
        "from": HARDHAT_ADDRESS.to_lowercase(),
        "to": "0x70997970c51812dc3a010c7d01b50e0d17dc79c8",
        "value": "0x0",
        "gas": "0x5208",
        "maxFeePerGas": "0x3b9aca00",
        "maxPriorityFeePerGas": "0x3b9aca00",
        "chainId": "0x89",
        "nonce": "0x0"
    }])
}

/// What the custody service would return for a raw signature of `digest`
/// encrypted to `encryption_public_key`.
fn custody_signature(digest: B256, encryption_public_key: &str) -> (String, [u8; 65]) {
    let signer: PrivateKeySigner = HARDHAT_KEY.parse().unwrap();
    let signature = signer.sign_hash_sync(&digest).unwrap().as_bytes();
    let public_key = hex::decode(encryption_public_key.trim_start_matches("0x")).unwrap();
    let sealed = auth::ecies::encrypt(&public_key, &signature[..64]).unwrap();
    (format!("0x{}", hex::encode(sealed)), signature)
}

// ==================== Scenarios ====================

#[tokio::test]
async fn test_personal_sign_is_reconstructed() {
    let mut h = harness(false, None).await;

    let request = h
        .orchestrator
        .submit(h.account.id, PERSONAL_SIGN, &json!(["hello", HARDHAT_ADDRESS]))
        .await
        .unwrap();
    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.remote_request_id, "remote-msg");

    let job = h.custody.last_message.lock().unwrap().clone().unwrap();
    assert!(job.raw_signing);
    assert_eq!(job.message, "hello");

    let digest = request.params.digest().unwrap();
    let (raw, expected) = custody_signature(digest, &job.encryption_public_key);
    h.custody
        .set_remote_request(json!({ "status": "SIGNED", "signatures": { "raw": raw } }));

    let summary = h.orchestrator.poll_all().await;
    assert_eq!(summary.checked, 1);
    assert_eq!(summary.signed, 1);

    let signed = h.orchestrator.get_request(request.id).unwrap();
    assert_eq!(signed.status, RequestStatus::Signed);
    let Some(SigningResult::Message { signature }) = signed.result else {
        panic!("expected a message signature");
    };
    assert_eq!(signature.len(), 132);
    assert!(signature.starts_with("0x"));
    assert!(signature.ends_with("1b") || signature.ends_with("1c"));
    assert_eq!(signature, format!("0x{}", hex::encode(expected)));

    assert!(h.host.events().iter().any(|e| matches!(
        e,
        KeyringEvent::RequestApproved { request_id, .. } if *request_id == request.id
    )));
}

#[tokio::test]
async fn test_typed_data_is_reconstructed() {
    let mut h = harness(false, None).await;
    let typed = json!({
        "types": {
            "EIP712Domain": [{ "name": "name", "type": "string" }, { "name": "chainId", "type": "uint256" }],
            "Approval": [{ "name": "owner", "type": "address" }, { "name": "amount", "type": "uint256" }]
        },
        "primaryType": "Approval",
        "domain": { "name": "Keyring Test", "chainId": 1 },
        "message": { "owner": HARDHAT_ADDRESS, "amount": "1000" }
    });

    let request = h
        .orchestrator
        .submit(h.account.id, "eth_signTypedData_v4", &json!([HARDHAT_ADDRESS, typed]))
        .await
        .unwrap();
    let job = h.custody.last_message.lock().unwrap().clone().unwrap();
    assert_eq!(job.version.as_deref(), Some("v4"));

    let (raw, expected) = custody_signature(request.params.digest().unwrap(), &job.encryption_public_key);
    h.custody
        .set_remote_request(json!({ "status": "SUBMITTED", "signatures": { "raw": raw } }));

    assert_eq!(
        h.orchestrator.finalize(request.id).await.unwrap(),
        RequestStatus::Signed
    );
    let signed = h.orchestrator.get_request(request.id).unwrap();
    assert_eq!(
        signed.result,
        Some(SigningResult::Message {
            signature: format!("0x{}", hex::encode(expected))
        })
    );
}

#[tokio::test]
async fn test_user_cancelled_rejects_once() {
    let mut h = harness(false, None).await;
    let request = h
        .orchestrator
        .submit(h.account.id, ETH_SIGN_TRANSACTION, &eip1559_tx())
        .await
        .unwrap();

    h.custody
        .set_transaction_info(json!({ "status": "USER_CANCELLED" }));
    let summary = h.orchestrator.poll_all().await;
    assert_eq!(summary.rejected, 1);
    assert_eq!(
        h.orchestrator.get_request(request.id).unwrap().status,
        RequestStatus::Rejected
    );

    let summary = h.orchestrator.poll_all().await;
    assert_eq!(summary.checked, 0);
    assert_eq!(h.host.rejections(), 1);

    let calls_before = h.custody.calls().len();
    let err = h.orchestrator.finalize(request.id).await.unwrap_err();
    assert!(matches!(err, Error::RequestAlreadyFinalized(id) if id == request.id));
    assert_eq!(h.custody.calls().len(), calls_before);
}

#[tokio::test]
async fn test_signed_transaction_carries_remote_signature() {
    let mut h = harness(false, None).await;
    let request = h
        .orchestrator
        .submit(h.account.id, ETH_SIGN_TRANSACTION, &eip1559_tx())
        .await
        .unwrap();

    let job = h.custody.last_transaction.lock().unwrap().clone().unwrap();
    assert!(!job.submit);
    assert_eq!(job.currency, "MATIC");
    assert_eq!(job.transaction.chain_id, "0x89");
    assert!(job.relay_node_url.is_none());

    h.custody.set_transaction_info(json!({
        "status": "SIGNED",
        "signedTransaction": {
            "transactionDigest": "0xabc",
            "transaction": { "v": 309, "r": "0x11", "s": "0x22" }
        }
    }));
    assert_eq!(
        h.orchestrator.finalize(request.id).await.unwrap(),
        RequestStatus::Signed
    );

    match h.orchestrator.get_request(request.id).unwrap().result {
        Some(SigningResult::Transaction(sig)) => {
            assert_eq!(sig.v, "309");
            assert_eq!(sig.r, "0x11");
            assert_eq!(sig.s, "0x22");
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[tokio::test]
async fn test_non_final_status_is_a_no_op() {
    let mut h = harness(false, None).await;
    let request = h
        .orchestrator
        .submit(h.account.id, ETH_SIGN_TRANSACTION, &eip1559_tx())
        .await
        .unwrap();

    h.custody.set_transaction_info(json!({ "status": "QUEUED" }));
    let summary = h.orchestrator.poll_all().await;
    assert_eq!(summary.still_pending, 1);
    assert_eq!(
        h.orchestrator.get_request(request.id).unwrap().status,
        RequestStatus::Pending
    );
    assert!(h.host.events().iter().all(|e| !matches!(
        e,
        KeyringEvent::RequestApproved { .. } | KeyringEvent::RequestRejected { .. }
    )));
}

#[tokio::test]
async fn test_cancelled_message_stays_pending() {
    let mut h = harness(false, None).await;
    let request = h
        .orchestrator
        .submit(h.account.id, PERSONAL_SIGN, &json!(["hello", HARDHAT_ADDRESS]))
        .await
        .unwrap();

    // Message jobs only distinguish final from not final.
    h.custody
        .set_remote_request(json!({ "status": "USER_CANCELLED" }));
    assert_eq!(
        h.orchestrator.finalize(request.id).await.unwrap(),
        RequestStatus::Pending
    );
    assert!(h.host.events().iter().all(|e| !matches!(
        e,
        KeyringEvent::RequestRejected { .. }
    )));

    h.orchestrator.reject_request(request.id).await.unwrap();
    assert_eq!(
        h.orchestrator.get_request(request.id).unwrap().status,
        RequestStatus::Rejected
    );
}

#[tokio::test]
async fn test_poll_failures_are_isolated() {
    let mut h = harness(false, None).await;
    let tx = h
        .orchestrator
        .submit(h.account.id, ETH_SIGN_TRANSACTION, &eip1559_tx())
        .await
        .unwrap();
    let message = h
        .orchestrator
        .submit(h.account.id, PERSONAL_SIGN, &json!(["hello", HARDHAT_ADDRESS]))
        .await
        .unwrap();

    // Transaction lookups fail; the message signature is sealed to the
    // wrong key and cannot be decrypted.
    let stranger = auth::DeterministicKeyVault::new()
        .public_key_hex(SecretSeed::new([9u8; 32]), "elsewhere")
        .unwrap();
    let (raw, _) = custody_signature(message.params.digest().unwrap(), &stranger);
    h.custody
        .set_remote_request(json!({ "status": "SIGNED", "signatures": { "raw": raw } }));

    let summary = h.orchestrator.poll_all().await;
    assert_eq!(summary.checked, 2);
    assert_eq!(summary.failed, 2);
    for id in [tx.id, message.id] {
        assert_eq!(
            h.orchestrator.get_request(id).unwrap().status,
            RequestStatus::Pending
        );
    }
}

#[tokio::test]
async fn test_unsupported_transaction_type() {
    let mut h = harness(false, None).await;
    let mut tx = eip1559_tx();
    tx[0]["type"] = json!("0x1");

    let err = h
        .orchestrator
        .submit(h.account.id, ETH_SIGN_TRANSACTION, &tx)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedTransactionType(_)));
    assert!(h.custody.calls().is_empty());
    assert!(h.orchestrator.list_requests().is_empty());
}

#[tokio::test]
async fn test_unsupported_method_and_signer_mismatch() {
    let mut h = harness(false, None).await;

    let err = h
        .orchestrator
        .submit(h.account.id, "eth_sign", &json!([HARDHAT_ADDRESS, "0x00"]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedMethod(_)));

    let mut tx = eip1559_tx();
    tx[0]["from"] = json!("0x70997970c51812dc3a010c7d01b50e0d17dc79c8");
    let err = h
        .orchestrator
        .submit(h.account.id, ETH_SIGN_TRANSACTION, &tx)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(h.custody.calls().is_empty());
}

#[tokio::test]
async fn test_refused_job_records_nothing() {
    let mut h = harness(false, None).await;
    *h.custody.refuse_jobs.lock().unwrap() = true;

    let err = h
        .orchestrator
        .submit(h.account.id, PERSONAL_SIGN, &json!(["hello", HARDHAT_ADDRESS]))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BadStatus(503)));
    assert!(h.orchestrator.list_requests().is_empty());
}

#[tokio::test]
async fn test_proxy_gate_blocks_transactions() {
    let mut h = harness(true, Some(false)).await;

    let err = h
        .orchestrator
        .submit(h.account.id, ETH_SIGN_TRANSACTION, &eip1559_tx())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ProxyNotConfigured));
    assert!(!h.custody.calls().contains(&"create_transaction"));
    assert!(h
        .host
        .notices
        .lock()
        .unwrap()
        .contains(&Notice::ProxyNotConfigured));

    // Message signing is not gated.
    h.orchestrator
        .submit(h.account.id, PERSONAL_SIGN, &json!(["hello", HARDHAT_ADDRESS]))
        .await
        .unwrap();

    let calls_before = h.custody.calls().len();
    let summary = h.orchestrator.poll_all().await;
    assert!(summary.skipped);
    assert_eq!(summary.checked, 0);
    assert_eq!(h.custody.calls().len(), calls_before);
}

#[tokio::test]
async fn test_missing_proxy_notice_sent_once_per_outage() {
    let mut h = harness(true, Some(false)).await;
    let proxy_notices = |h: &Harness| {
        h.host
            .notices
            .lock()
            .unwrap()
            .iter()
            .filter(|n| **n == Notice::ProxyNotConfigured)
            .count()
    };

    for _ in 0..3 {
        assert!(h.orchestrator.poll_all().await.skipped);
    }
    assert_eq!(proxy_notices(&h), 1);

    let probe = h.probe.clone().unwrap();
    probe.set(true);
    assert!(!h.orchestrator.poll_all().await.skipped);
    assert_eq!(proxy_notices(&h), 1);

    probe.set(false);
    assert!(h.orchestrator.poll_all().await.skipped);
    assert!(h.orchestrator.poll_all().await.skipped);
    assert_eq!(proxy_notices(&h), 2);
}

#[tokio::test]
async fn test_enhanced_mode_without_probe_blocks_transactions() {
    let mut h = harness(true, None).await;
    let err = h
        .orchestrator
        .submit(h.account.id, ETH_SIGN_TRANSACTION, &eip1559_tx())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ProxyNotConfigured));
}

#[tokio::test]
async fn test_enhanced_mode_uses_relay_route() {
    let mut h = harness(true, Some(true)).await;
    h.orchestrator
        .update_configuration(ConfigurationUpdate {
            rpc_routes: Some(vec![RpcRoute {
                chain_id: 137,
                url: "https://relay.example/polygon".into(),
            }]),
            ..Default::default()
        })
        .await
        .unwrap();

    h.orchestrator
        .submit(h.account.id, ETH_SIGN_TRANSACTION, &eip1559_tx())
        .await
        .unwrap();
    let job = h.custody.last_transaction.lock().unwrap().clone().unwrap();
    assert_eq!(
        job.relay_node_url.as_deref(),
        Some("https://relay.example/polygon")
    );
}

#[tokio::test]
async fn test_host_rejection() {
    let mut h = harness(false, None).await;
    let request = h
        .orchestrator
        .submit(h.account.id, PERSONAL_SIGN, &json!(["hello", HARDHAT_ADDRESS]))
        .await
        .unwrap();

    let err = h.orchestrator.delete_account(h.account.id).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let rejected = h.orchestrator.reject_request(request.id).await.unwrap();
    assert_eq!(rejected.status, RequestStatus::Rejected);
    assert!(matches!(
        h.orchestrator.reject_request(request.id).await,
        Err(Error::RequestAlreadyFinalized(_))
    ));
    assert_eq!(h.host.rejections(), 1);

    h.orchestrator.delete_account(h.account.id).await.unwrap();
    assert!(h.orchestrator.list_accounts().is_empty());
    assert_eq!(h.orchestrator.list_requests().len(), 1);
}

#[tokio::test]
async fn test_account_validation() {
    let mut h = harness(false, None).await;

    let duplicate = h
        .orchestrator
        .create_account(NewAccount {
            address: HARDHAT_ADDRESS.to_lowercase(),
            organization_id: ORG.to_string(),
            supported_methods: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(duplicate, Error::Validation(_)));

    let no_credential = h
        .orchestrator
        .create_account(NewAccount {
            address: "0x70997970C51812dc3A010C7d01b50e0d17dc79C8".to_string(),
            organization_id: "org-unknown".to_string(),
            supported_methods: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(no_credential, Error::Validation(_)));
    assert_eq!(h.orchestrator.list_accounts().len(), 1);
}

#[tokio::test]
async fn test_incomplete_credential_rejected() {
    let mut h = harness(false, None).await;
    let err = h
        .orchestrator
        .update_configuration(ConfigurationUpdate {
            credentials: vec![Credential {
                organization_id: "org-2".into(),
                session_token: SessionToken::new("enc", "", "tag"),
            }],
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert!(!h.credentials.contains("org-2").await);
}

#[tokio::test]
async fn test_state_survives_reload() {
    let mut h = harness(false, None).await;
    let request = h
        .orchestrator
        .submit(h.account.id, ETH_SIGN_TRANSACTION, &eip1559_tx())
        .await
        .unwrap();
    assert!(h.host.saves.load(Ordering::SeqCst) >= 3);

    let credentials = CredentialStore::new();
    let config = KeyringConfig::test_config("http://custody.invalid/graphql");
    let mut reloaded =
        SigningOrchestrator::new(h.host.clone(), h.custody.clone(), credentials.clone(), &config);
    reloaded.load().await.unwrap();

    assert_eq!(reloaded.get_account(h.account.id).unwrap(), h.account);
    assert_eq!(reloaded.get_request(request.id).unwrap(), request);
    assert_eq!(
        credentials.get(ORG).await,
        Some(SessionToken::new("enc", "iv", "tag"))
    );
}

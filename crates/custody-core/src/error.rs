//! Error types for the vault keyring.

use thiserror::Error;
use uuid::Uuid;

use crate::api::graphql::GraphqlError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),

    #[error("Request not found: {0}")]
    RequestNotFound(Uuid),

    #[error("Unsupported method: {0}")]
    UnsupportedMethod(String),

    #[error("Unsupported transaction type: {0}")]
    UnsupportedTransactionType(String),

    #[error("Request {0} is already finalized")]
    RequestAlreadyFinalized(Uuid),

    #[error("Custody service unreachable: {0}")]
    Unreachable(#[source] reqwest::Error),

    #[error("Custody service returned HTTP {0}")]
    BadStatus(u16),

    #[error("Custody service error: {}", describe_errors(.0))]
    RemoteError(Vec<GraphqlError>),

    #[error("Malformed custody response: {0}")]
    Protocol(String),

    #[error("No session credential installed for organization {0}")]
    MissingCredential(String),

    #[error("Session refresh failed for organization {organization_id}")]
    RefreshFailed { organization_id: String },

    #[error("Invalid signature length: expected 64 bytes, got {0}")]
    InvalidSignatureLength(usize),

    #[error("Signature does not recover to signer {address}")]
    SignatureAddressMismatch { address: String },

    #[error("Typed data error: {0}")]
    TypedData(String),

    #[error("Key vault error: {0}")]
    KeyVault(#[from] auth::KeyVaultError),

    #[error("RPC traffic is not routed through the custody proxy")]
    ProxyNotConfigured,

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Host error: {message}")]
    Host { message: String },
}

impl Error {
    /// Errors caused by the caller's input; never retried.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::Validation(_)
                | Error::UnsupportedMethod(_)
                | Error::UnsupportedTransactionType(_)
                | Error::TypedData(_)
        )
    }
}

fn describe_errors(errors: &[GraphqlError]) -> String {
    errors
        .iter()
        .map(|e| match e.kind() {
            Some(kind) => format!("{} ({})", e.message, kind),
            None => e.message.clone(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, Error>;

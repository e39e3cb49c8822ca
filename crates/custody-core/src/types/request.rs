//! Signing request records and their outcomes.

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::method::{quantity, SigningRequest};

/// Lifecycle status of a signing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Signed,
    Rejected,
}

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestStatus::Pending => write!(f, "pending"),
            RequestStatus::Signed => write!(f, "signed"),
            RequestStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// `(v, r, s)` of a transaction signed by the custody service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSignature {
    #[serde(deserialize_with = "quantity::deserialize")]
    pub v: String,
    pub r: String,
    pub s: String,
}

/// What an approved request resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SigningResult {
    Transaction(TransactionSignature),
    /// `0x`-prefixed 65-byte `r || s || v` signature.
    Message { signature: String },
}

/// A signing request tracked by the keyring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub id: Uuid,
    pub account_id: Uuid,
    /// Signer address captured at submission.
    pub address: Address,
    pub method: String,
    pub params: SigningRequest,
    pub remote_request_id: String,
    pub status: RequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<SigningResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Request {
    /// A freshly submitted request.
    pub fn pending(
        id: Uuid,
        account_id: Uuid,
        address: Address,
        params: SigningRequest,
        remote_request_id: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            account_id,
            address,
            method: params.method().to_string(),
            params,
            remote_request_id,
            status: RequestStatus::Pending,
            result: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

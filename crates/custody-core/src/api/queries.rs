//! GraphQL documents and payloads for the custody service.

use alloy_primitives::Address;
use auth::SessionToken;
use serde::{Deserialize, Serialize};

use crate::types::{
    parse_quantity, TransactionKind, TransactionParams, TransactionSignature, TypedDataVersion,
};
use crate::{Error, Result};

pub const CREATE_EIP1559_TRANSACTION: &str = r#"
mutation CreateEip1559Transaction($input: CreateTransactionInput!) {
  createEip1559Transaction(input: $input) { requestId }
}"#;

pub const CREATE_ETHEREUM_TRANSACTION: &str = r#"
mutation CreateEthereumTransaction($input: CreateTransactionInput!) {
  createEthereumTransaction(input: $input) { requestId }
}"#;

pub const CREATE_ETH_PERSONAL_SIGN: &str = r#"
mutation CreateEthPersonalSign($input: CreateMessageSignatureInput!) {
  createEthPersonalSign(input: $input) { requestId }
}"#;

pub const CREATE_ETH_SIGN_TYPED_DATA: &str = r#"
mutation CreateEthSignTypedData($input: CreateMessageSignatureInput!) {
  createEthSignTypedData(input: $input) { requestId }
}"#;

pub const TRANSACTION_INFO: &str = r#"
query TransactionInfo($input: RequestLookupInput!) {
  transactionInfo(input: $input) {
    status
    signedTransaction { transactionDigest transaction { r s v } }
  }
}"#;

pub const GET_REQUEST: &str = r#"
query GetRequest($input: RequestLookupInput!) {
  getRequest(input: $input) {
    status
    signatures { raw }
  }
}"#;

pub const REFRESH_AUTHENTICATION_TOKENS: &str = r#"
query RefreshAuthenticationTokens($input: RefreshInput!) {
  refreshAuthenticationTokens(input: $input) { enc iv tag }
}"#;

/// Remote job status vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteStatus {
    Pending,
    Queued,
    Signed,
    Submitted,
    UserCancelled,
    Blocked,
    Error,
    #[serde(other)]
    Unknown,
}

impl RemoteStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, RemoteStatus::Signed | RemoteStatus::Submitted)
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            RemoteStatus::UserCancelled | RemoteStatus::Blocked | RemoteStatus::Error
        )
    }
}

/// Transaction fields as sent to the custody service.
///
/// Quantities are re-encoded as `0x`-prefixed hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInput {
    pub from: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    pub value: String,
    pub data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    pub chain_id: String,
    pub gas_limit: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_fee_per_gas: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_priority_fee_per_gas: Option<String>,
}

impl TransactionInput {
    pub fn from_params(params: &TransactionParams, from: Address) -> Result<Self> {
        let gas_limit = params
            .gas_limit
            .as_deref()
            .ok_or_else(|| Error::Validation("gas is required".into()))?;
        Ok(Self {
            from: from.to_checksum(None),
            to: params.to.clone(),
            value: params
                .value
                .as_deref()
                .map(hex_quantity)
                .transpose()?
                .unwrap_or_else(|| "0x0".to_string()),
            data: params.data.clone().unwrap_or_else(|| "0x".to_string()),
            nonce: params.nonce.as_deref().map(hex_quantity).transpose()?,
            chain_id: format!("{:#x}", params.chain_id()?),
            gas_limit: hex_quantity(gas_limit)?,
            gas_price: params.gas_price.as_deref().map(hex_quantity).transpose()?,
            max_fee_per_gas: params.max_fee_per_gas.as_deref().map(hex_quantity).transpose()?,
            max_priority_fee_per_gas: params
                .max_priority_fee_per_gas
                .as_deref()
                .map(hex_quantity)
                .transpose()?,
        })
    }
}

fn hex_quantity(raw: &str) -> Result<String> {
    parse_quantity(raw)
        .map(|q| format!("0x{:x}", q))
        .ok_or_else(|| Error::Validation(format!("invalid quantity: {}", raw)))
}

/// Body of a create-transaction mutation, minus authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransaction {
    #[serde(skip)]
    pub kind: TransactionKind,
    pub transaction: TransactionInput,
    pub source: String,
    /// Whether the custody service broadcasts after signing.
    pub submit: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relay_node_url: Option<String>,
    pub currency: String,
}

/// Which message-signing mutation to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    PersonalSign,
    TypedData(TypedDataVersion),
}

/// Body of a message-signing mutation, minus authentication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMessageSignature {
    #[serde(skip)]
    pub kind: MessageKind,
    /// Message text, hex, or serialized typed-data JSON.
    pub message: String,
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    pub source: String,
    /// Ask for the bare `r || s` instead of a wallet-formatted signature.
    pub raw_signing: bool,
    /// ECIES public key the raw signature is encrypted to.
    pub encryption_public_key: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedRequest {
    pub request_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTransaction {
    #[serde(default)]
    pub transaction_digest: Option<String>,
    pub transaction: TransactionSignature,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInfo {
    pub status: RemoteStatus,
    #[serde(default)]
    pub signed_transaction: Option<SignedTransaction>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSignatures {
    #[serde(default)]
    pub raw: Option<String>,
}

/// Generic remote request, used for message signatures.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteRequest {
    pub status: RemoteStatus,
    #[serde(default)]
    pub signatures: Option<RemoteSignatures>,
}

/// Token material returned by a refresh. Any part may be missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefreshedTokens {
    #[serde(default)]
    pub enc: Option<String>,
    #[serde(default)]
    pub iv: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
}

impl RefreshedTokens {
    /// The new session token, if all parts are present.
    pub fn into_token(self) -> Option<SessionToken> {
        let token = SessionToken::new(self.enc?, self.iv?, self.tag?);
        token.is_complete().then_some(token)
    }
}

//! Signing methods and their parsed parameters.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::signing::{personal_sign_digest, typed_data_digest};
use crate::{Error, Result};

pub const ETH_SIGN_TRANSACTION: &str = "eth_signTransaction";
pub const PERSONAL_SIGN: &str = "personal_sign";
pub const ETH_SIGN_TYPED_DATA_V3: &str = "eth_signTypedData_v3";
pub const ETH_SIGN_TYPED_DATA_V4: &str = "eth_signTypedData_v4";

/// Every method the keyring accepts.
pub const SUPPORTED_METHODS: [&str; 4] = [
    ETH_SIGN_TRANSACTION,
    PERSONAL_SIGN,
    ETH_SIGN_TYPED_DATA_V3,
    ETH_SIGN_TYPED_DATA_V4,
];

/// Typed-data encoding version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypedDataVersion {
    V3,
    V4,
}

impl TypedDataVersion {
    /// Version string sent to the custody service.
    pub fn as_str(&self) -> &'static str {
        match self {
            TypedDataVersion::V3 => "v3",
            TypedDataVersion::V4 => "v4",
        }
    }
}

/// A signing request with its parameters parsed per method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SigningRequest {
    /// Transaction type `0x0`.
    LegacyTransaction(TransactionParams),
    /// Transaction type `0x2`.
    Eip1559Transaction(TransactionParams),
    PersonalSign {
        /// `0x`-prefixed hex bytes or UTF-8 text.
        message: String,
        address: Address,
    },
    SignTypedData {
        version: TypedDataVersion,
        address: Address,
        data: Value,
    },
}

impl SigningRequest {
    /// Parse wallet-style JSON-RPC params for `method`.
    ///
    /// Message digests are computed eagerly so malformed payloads are
    /// rejected before anything is sent to the custody service.
    pub fn parse(method: &str, params: &Value) -> Result<Self> {
        let request = match method {
            ETH_SIGN_TRANSACTION => {
                let raw = match params {
                    Value::Array(items) => items.first().cloned().ok_or_else(|| {
                        Error::Validation("eth_signTransaction expects one transaction".into())
                    })?,
                    other => other.clone(),
                };
                let tx: TransactionParams = serde_json::from_value(raw)
                    .map_err(|e| Error::Validation(format!("invalid transaction: {}", e)))?;
                let kind = tx.kind()?;
                tx.validate(kind)?;
                match kind {
                    TransactionKind::Legacy => SigningRequest::LegacyTransaction(tx),
                    TransactionKind::Eip1559 => SigningRequest::Eip1559Transaction(tx),
                }
            }
            PERSONAL_SIGN => {
                let [message, address] = string_pair(params, method)?;
                SigningRequest::PersonalSign {
                    message,
                    address: parse_address(&address)?,
                }
            }
            ETH_SIGN_TYPED_DATA_V3 | ETH_SIGN_TYPED_DATA_V4 => {
                let version = if method == ETH_SIGN_TYPED_DATA_V3 {
                    TypedDataVersion::V3
                } else {
                    TypedDataVersion::V4
                };
                let items = params.as_array().filter(|items| items.len() >= 2).ok_or_else(|| {
                    Error::Validation(format!("{} expects [address, typedData]", method))
                })?;
                let address = items[0].as_str().ok_or_else(|| {
                    Error::Validation(format!("{} address must be a string", method))
                })?;
                let data = match &items[1] {
                    Value::String(raw) => serde_json::from_str(raw).map_err(|e| {
                        Error::TypedData(format!("typed data is not valid JSON: {}", e))
                    })?,
                    other => other.clone(),
                };
                SigningRequest::SignTypedData {
                    version,
                    address: parse_address(address)?,
                    data,
                }
            }
            other => return Err(Error::UnsupportedMethod(other.to_string())),
        };

        if !request.is_transaction() {
            request.digest()?;
        }
        Ok(request)
    }

    pub fn method(&self) -> &'static str {
        match self {
            SigningRequest::LegacyTransaction(_) | SigningRequest::Eip1559Transaction(_) => {
                ETH_SIGN_TRANSACTION
            }
            SigningRequest::PersonalSign { .. } => PERSONAL_SIGN,
            SigningRequest::SignTypedData { version, .. } => match version {
                TypedDataVersion::V3 => ETH_SIGN_TYPED_DATA_V3,
                TypedDataVersion::V4 => ETH_SIGN_TYPED_DATA_V4,
            },
        }
    }

    pub fn is_transaction(&self) -> bool {
        matches!(
            self,
            SigningRequest::LegacyTransaction(_) | SigningRequest::Eip1559Transaction(_)
        )
    }

    /// The address the caller names as signer, if any.
    pub fn signer(&self) -> Result<Option<Address>> {
        match self {
            SigningRequest::LegacyTransaction(tx) | SigningRequest::Eip1559Transaction(tx) => {
                tx.from.as_deref().map(parse_address).transpose()
            }
            SigningRequest::PersonalSign { address, .. }
            | SigningRequest::SignTypedData { address, .. } => Ok(Some(*address)),
        }
    }

    /// Digest the custody service signs for message requests.
    pub fn digest(&self) -> Result<B256> {
        match self {
            SigningRequest::PersonalSign { message, .. } => personal_sign_digest(message),
            SigningRequest::SignTypedData { version, data, .. } => {
                typed_data_digest(*version, data)
            }
            _ => Err(Error::Validation(
                "transactions are signed by the custody service".into(),
            )),
        }
    }
}

/// Transaction envelope selected by the `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    Legacy,
    Eip1559,
}

/// Transaction parameters as sent by wallets.
///
/// Quantities are kept as the caller wrote them; numbers are accepted
/// alongside hex and decimal strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionParams {
    #[serde(
        rename = "type",
        default,
        deserialize_with = "quantity::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub tx_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(
        default,
        deserialize_with = "quantity::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<String>,
    #[serde(default, alias = "input", skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(
        default,
        deserialize_with = "quantity::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub nonce: Option<String>,
    #[serde(
        default,
        deserialize_with = "quantity::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub chain_id: Option<String>,
    #[serde(
        default,
        alias = "gas",
        deserialize_with = "quantity::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub gas_limit: Option<String>,
    #[serde(
        default,
        deserialize_with = "quantity::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub gas_price: Option<String>,
    #[serde(
        default,
        deserialize_with = "quantity::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_fee_per_gas: Option<String>,
    #[serde(
        default,
        deserialize_with = "quantity::deserialize_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_priority_fee_per_gas: Option<String>,
}

impl TransactionParams {
    /// Resolve the envelope. Without an explicit type the fee fields decide.
    pub fn kind(&self) -> Result<TransactionKind> {
        match &self.tx_type {
            Some(raw) => match parse_quantity(raw) {
                Some(t) if t == U256::ZERO => Ok(TransactionKind::Legacy),
                Some(t) if t == U256::from(2u8) => Ok(TransactionKind::Eip1559),
                _ => Err(Error::UnsupportedTransactionType(raw.clone())),
            },
            None if self.max_fee_per_gas.is_some() => Ok(TransactionKind::Eip1559),
            None if self.gas_price.is_some() => Ok(TransactionKind::Legacy),
            None => Err(Error::Validation(
                "transaction type is missing and cannot be inferred".into(),
            )),
        }
    }

    pub fn chain_id(&self) -> Result<u64> {
        let raw = self
            .chain_id
            .as_deref()
            .ok_or_else(|| Error::Validation("chainId is required".into()))?;
        parse_quantity(raw)
            .and_then(|id| u64::try_from(id).ok())
            .filter(|id| *id > 0)
            .ok_or_else(|| Error::Validation(format!("invalid chainId: {}", raw)))
    }

    /// Check that the fields required by `kind` are present and well formed.
    pub fn validate(&self, kind: TransactionKind) -> Result<()> {
        self.chain_id()?;

        let required = match kind {
            TransactionKind::Legacy => vec![("gas", &self.gas_limit), ("gasPrice", &self.gas_price)],
            TransactionKind::Eip1559 => vec![
                ("gas", &self.gas_limit),
                ("maxFeePerGas", &self.max_fee_per_gas),
                ("maxPriorityFeePerGas", &self.max_priority_fee_per_gas),
            ],
        };
        for (name, field) in required {
            if field.is_none() {
                return Err(Error::Validation(format!("{} is required", name)));
            }
        }

        for (name, field) in [
            ("value", &self.value),
            ("nonce", &self.nonce),
            ("gas", &self.gas_limit),
            ("gasPrice", &self.gas_price),
            ("maxFeePerGas", &self.max_fee_per_gas),
            ("maxPriorityFeePerGas", &self.max_priority_fee_per_gas),
        ] {
            if let Some(raw) = field {
                if parse_quantity(raw).is_none() {
                    return Err(Error::Validation(format!("invalid {}: {}", name, raw)));
                }
            }
        }

        if let Some(to) = &self.to {
            parse_address(to)?;
        }
        if let Some(from) = &self.from {
            parse_address(from)?;
        }
        if let Some(data) = &self.data {
            let body = data.strip_prefix("0x").unwrap_or(data);
            hex::decode(body)
                .map_err(|_| Error::Validation("data must be hex encoded".into()))?;
        }
        Ok(())
    }

    /// Native currency ticker for the transaction's chain.
    pub fn currency(&self) -> Result<&'static str> {
        Ok(currency_for_chain(self.chain_id()?))
    }
}

/// Native currency ticker reported to the custody service.
pub fn currency_for_chain(chain_id: u64) -> &'static str {
    match chain_id {
        137 | 80001 | 80002 => "MATIC",
        56 | 97 => "BNB",
        _ => "ETH",
    }
}

/// Parse a `0x`-prefixed hex or plain decimal quantity.
pub fn parse_quantity(raw: &str) -> Option<U256> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some("") => Some(U256::ZERO),
        Some(digits) => U256::from_str_radix(digits, 16).ok(),
        None => U256::from_str_radix(raw, 10).ok(),
    }
}

/// Parse a `0x`-prefixed 20-byte address, in any letter case.
pub fn parse_address(raw: &str) -> Result<Address> {
    let raw = raw.trim();
    let valid = raw.len() == 42
        && raw.starts_with("0x")
        && raw[2..].bytes().all(|b| b.is_ascii_hexdigit());
    if !valid {
        return Err(Error::Validation(format!("invalid address: {}", raw)));
    }
    raw.parse::<Address>()
        .map_err(|e| Error::Validation(format!("invalid address {}: {}", raw, e)))
}

fn string_pair(params: &Value, method: &str) -> Result<[String; 2]> {
    let items = params
        .as_array()
        .filter(|items| items.len() >= 2)
        .ok_or_else(|| Error::Validation(format!("{} expects two parameters", method)))?;
    let first = items[0].as_str();
    let second = items[1].as_str();
    match (first, second) {
        (Some(a), Some(b)) => Ok([a.to_string(), b.to_string()]),
        _ => Err(Error::Validation(format!(
            "{} parameters must be strings",
            method
        ))),
    }
}

/// Quantity fields that may arrive as JSON numbers or strings.
pub(crate) mod quantity {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(s),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(D::Error::custom(format!("expected quantity, got {}", other))),
        }
    }

    pub fn deserialize_opt<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(Value::Number(n)) => Ok(Some(n.to_string())),
            Some(other) => Err(D::Error::custom(format!("expected quantity, got {}", other))),
        }
    }
}

//! Message digests for `personal_sign` and `eth_signTypedData_*`.

use alloy_dyn_abi::TypedData;
use alloy_primitives::{eip191_hash_message, B256};
use serde_json::Value;

use crate::types::TypedDataVersion;
use crate::{Error, Result};

/// EIP-191 digest of a `personal_sign` message.
///
/// A `0x`-prefixed message that decodes as hex is signed as those bytes;
/// anything else, including `0x` text that is not hex, is UTF-8.
pub fn personal_sign_digest(message: &str) -> Result<B256> {
    let bytes = message
        .strip_prefix("0x")
        .and_then(|body| hex::decode(body).ok())
        .unwrap_or_else(|| message.as_bytes().to_vec());
    Ok(eip191_hash_message(bytes))
}

/// EIP-712 digest of a typed-data payload.
///
/// Version 3 predates array support, so any array-typed field is rejected.
pub fn typed_data_digest(version: TypedDataVersion, data: &Value) -> Result<B256> {
    if version == TypedDataVersion::V3 {
        if let Some(field) = first_array_field(data) {
            return Err(Error::TypedData(format!(
                "arrays are not supported by eth_signTypedData_v3 ({})",
                field
            )));
        }
    }

    let typed: TypedData = serde_json::from_value(data.clone())
        .map_err(|e| Error::TypedData(format!("malformed typed data: {}", e)))?;
    typed
        .eip712_signing_hash()
        .map_err(|e| Error::TypedData(e.to_string()))
}

fn first_array_field(data: &Value) -> Option<String> {
    let types = data.get("types")?.as_object()?;
    types.iter().find_map(|(type_name, fields)| {
        fields.as_array()?.iter().find_map(|field| {
            let ty = field.get("type")?.as_str()?;
            ty.trim_end()
                .ends_with(']')
                .then(|| format!("{}.{}", type_name, ty))
        })
    })
}

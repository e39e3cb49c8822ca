//! Domain types shared by the keyring crates.

mod account;
mod method;
mod request;

pub use account::{Account, NewAccount};
pub use method::{
    currency_for_chain, parse_address, parse_quantity, SigningRequest, TransactionKind,
    TransactionParams, TypedDataVersion, ETH_SIGN_TRANSACTION, ETH_SIGN_TYPED_DATA_V3,
    ETH_SIGN_TYPED_DATA_V4, PERSONAL_SIGN, SUPPORTED_METHODS,
};
pub(crate) use method::quantity;
pub use request::{Request, RequestStatus, SigningResult, TransactionSignature};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Custody-proxied RPC endpoint for a chain, used in enhanced mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcRoute {
    pub chain_id: u64,
    pub url: String,
}

impl RpcRoute {
    pub fn validate(&self) -> Result<()> {
        if self.chain_id == 0 {
            return Err(Error::Validation("rpc route chainId must be positive".into()));
        }
        let url = Url::parse(&self.url)
            .map_err(|e| Error::Validation(format!("invalid rpc route url {}: {}", self.url, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Validation(format!(
                "rpc route url must use http or https: {}",
                self.url
            )));
        }
        Ok(())
    }
}

//! Custody RPC proxy detection.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration as StdDuration;
use tracing::debug;

use super::RpcProbe;
use crate::{Error, Result};

/// Probes an RPC endpoint with `eth_chainId` and looks for the proxy marker.
///
/// The custody proxy answers with a top-level `"proxy": true` next to the
/// JSON-RPC result; a plain node does not.
#[derive(Debug, Clone)]
pub struct HttpRpcProbe {
    url: String,
    http_client: reqwest::Client,
}

impl HttpRpcProbe {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(10))
            .build()
            .map_err(|e| Error::Config {
                message: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            url: url.into(),
            http_client,
        })
    }
}

#[async_trait]
impl RpcProbe for HttpRpcProbe {
    async fn proxy_enabled(&self) -> Result<bool> {
        let response = self
            .http_client
            .post(&self.url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": "eth_chainId",
                "params": []
            }))
            .send()
            .await
            .map_err(Error::Unreachable)?;

        if !response.status().is_success() {
            return Err(Error::BadStatus(response.status().as_u16()));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::Protocol(format!("invalid probe response: {}", e)))?;
        let proxied = body.get("proxy").and_then(Value::as_bool).unwrap_or(false);
        debug!(url = %self.url, proxied, "RPC proxy probe");
        Ok(proxied)
    }
}

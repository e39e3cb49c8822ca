//! Minimal GraphQL-over-HTTP transport.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration as StdDuration;
use tracing::debug;

use crate::{Error, Result};

/// Error types the custody service uses for an invalid or expired session.
pub const SESSION_INVALID_TYPES: [&str; 2] = ["INVALID_SESSION_TOKEN", "EXPIRED_SESSION_TOKEN"];

/// One entry of a GraphQL `errors` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphqlError {
    pub message: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphqlError {
    /// Machine-readable error type, from `type` or `extensions.{type,code}`.
    pub fn kind(&self) -> Option<&str> {
        self.error_type.as_deref().or_else(|| {
            let extensions = self.extensions.as_ref()?;
            extensions
                .get("type")
                .or_else(|| extensions.get("code"))
                .and_then(Value::as_str)
        })
    }

    pub fn is_session_invalid(&self) -> bool {
        self.kind()
            .map(|kind| SESSION_INVALID_TYPES.contains(&kind))
            .unwrap_or(false)
    }
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Serialize)]
struct GraphqlRequest<'a> {
    query: &'a str,
    variables: Value,
}

/// Posts `{query, variables}` documents to a single endpoint.
#[derive(Debug, Clone)]
pub struct GraphqlClient {
    endpoint: String,
    http_client: reqwest::Client,
}

impl GraphqlClient {
    pub fn new(endpoint: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(timeout_secs))
            .connect_timeout(StdDuration::from_secs(10))
            .build()
            .map_err(|e| Error::Config {
                message: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            endpoint: endpoint.into(),
            http_client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Execute one document.
    ///
    /// A non-empty `errors` list wins over any partial `data`.
    pub async fn execute<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&GraphqlRequest { query, variables })
            .send()
            .await
            .map_err(Error::Unreachable)?;

        let status = response.status();
        if !status.is_success() {
            debug!(status = %status, endpoint = %self.endpoint, "GraphQL call failed");
            return Err(Error::BadStatus(status.as_u16()));
        }

        let body: GraphqlResponse<T> = response
            .json()
            .await
            .map_err(|e| Error::Protocol(format!("invalid GraphQL response: {}", e)))?;

        if !body.errors.is_empty() {
            return Err(Error::RemoteError(body.errors));
        }
        body.data
            .ok_or_else(|| Error::Protocol("GraphQL response has neither data nor errors".into()))
    }
}

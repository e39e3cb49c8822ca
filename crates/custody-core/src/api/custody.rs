//! Authenticated custody client with session refresh.
//!
//! Every call carries the organization's session token. When the service
//! answers with a session-invalid error the client refreshes the token once
//! and retries the original call once with the new token:
//!
//! ```text
//! call(token) ──ok──────────────────────────────────► result
//!     │
//!     └─session invalid─► refresh(token) ──fail──► remove credential,
//!                               │                  notify observer,
//!                               │                  RefreshFailed
//!                               ▼
//!                         install(new) ─► call(new) ──session invalid──► RefreshFailed
//!                                              └────────────other──────► result
//! ```

use async_trait::async_trait;
use auth::{CredentialStore, SessionObserver, SessionToken};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::graphql::{GraphqlClient, GraphqlError};
use super::queries::{
    CreateMessageSignature, CreateTransaction, CreatedRequest, MessageKind, RefreshedTokens,
    RemoteRequest, TransactionInfo, CREATE_EIP1559_TRANSACTION, CREATE_ETHEREUM_TRANSACTION,
    CREATE_ETH_PERSONAL_SIGN, CREATE_ETH_SIGN_TYPED_DATA, GET_REQUEST,
    REFRESH_AUTHENTICATION_TOKENS, TRANSACTION_INFO,
};
use super::CustodyApi;
use crate::config::CustodyConfig;
use crate::types::TransactionKind;
use crate::{Error, Result};

/// Custody service client bound to a credential store.
pub struct CustodyClient {
    graphql: GraphqlClient,
    credentials: CredentialStore,
    observer: Option<Arc<dyn SessionObserver>>,
}

impl CustodyClient {
    pub fn new(graphql: GraphqlClient, credentials: CredentialStore) -> Self {
        Self {
            graphql,
            credentials,
            observer: None,
        }
    }

    pub fn from_config(config: &CustodyConfig, credentials: CredentialStore) -> Result<Self> {
        let graphql = GraphqlClient::new(config.api_url.clone(), config.timeout_secs)?;
        Ok(Self::new(graphql, credentials))
    }

    /// Notify `observer` when a session cannot be refreshed.
    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Run `query` for an organization, refreshing the session at most once.
    async fn call<T: DeserializeOwned>(
        &self,
        organization_id: &str,
        query: &str,
        field: &str,
        body: &impl Serialize,
    ) -> Result<T> {
        let mut token = self
            .credentials
            .get(organization_id)
            .await
            .ok_or_else(|| Error::MissingCredential(organization_id.to_string()))?;
        let mut refreshed = false;

        loop {
            let variables = json!({ "input": with_authentication(body, &token)? });
            match self.execute_field::<T>(query, field, variables).await {
                Err(Error::RemoteError(errors))
                    if errors.first().is_some_and(GraphqlError::is_session_invalid) =>
                {
                    if refreshed {
                        warn!(organization_id, field, "Session still invalid after refresh");
                        return Err(Error::RefreshFailed {
                            organization_id: organization_id.to_string(),
                        });
                    }
                    info!(organization_id, field, "Session invalid, refreshing");
                    token = self.refresh(organization_id, &token).await?;
                    refreshed = true;
                }
                result => return result,
            }
        }
    }

    async fn refresh(&self, organization_id: &str, current: &SessionToken) -> Result<SessionToken> {
        let variables = json!({ "input": { "authentication": current } });
        let outcome = self
            .execute_field::<RefreshedTokens>(
                REFRESH_AUTHENTICATION_TOKENS,
                "refreshAuthenticationTokens",
                variables,
            )
            .await
            .map(RefreshedTokens::into_token);

        match outcome {
            Ok(Some(token)) => {
                self.credentials.install(organization_id, token.clone()).await;
                debug!(organization_id, "Session refreshed");
                Ok(token)
            }
            Ok(None) => {
                warn!(organization_id, "Refresh returned incomplete token material");
                self.invalidate(organization_id).await;
                Err(Error::RefreshFailed {
                    organization_id: organization_id.to_string(),
                })
            }
            Err(e) => {
                warn!(organization_id, error = %e, "Session refresh failed");
                self.invalidate(organization_id).await;
                Err(Error::RefreshFailed {
                    organization_id: organization_id.to_string(),
                })
            }
        }
    }

    async fn invalidate(&self, organization_id: &str) {
        self.credentials.remove(organization_id).await;
        if let Some(observer) = &self.observer {
            observer.session_invalidated(organization_id).await;
        }
    }

    async fn execute_field<T: DeserializeOwned>(
        &self,
        query: &str,
        field: &str,
        variables: Value,
    ) -> Result<T> {
        let mut data: Value = self.graphql.execute(query, variables).await?;
        let value = data
            .get_mut(field)
            .map(Value::take)
            .filter(|v| !v.is_null())
            .ok_or_else(|| Error::Protocol(format!("response is missing {}", field)))?;
        serde_json::from_value(value)
            .map_err(|e| Error::Protocol(format!("malformed {}: {}", field, e)))
    }
}

fn with_authentication(body: &impl Serialize, token: &SessionToken) -> Result<Value> {
    let mut input = serde_json::to_value(body)?;
    let map = input
        .as_object_mut()
        .ok_or_else(|| Error::Protocol("request body must be an object".into()))?;
    map.insert("authentication".to_string(), serde_json::to_value(token)?);
    Ok(input)
}

#[async_trait]
impl CustodyApi for CustodyClient {
    async fn create_transaction(
        &self,
        organization_id: &str,
        request: &CreateTransaction,
    ) -> Result<String> {
        let (query, field) = match request.kind {
            TransactionKind::Legacy => (CREATE_ETHEREUM_TRANSACTION, "createEthereumTransaction"),
            TransactionKind::Eip1559 => (CREATE_EIP1559_TRANSACTION, "createEip1559Transaction"),
        };
        let created: CreatedRequest = self.call(organization_id, query, field, request).await?;
        Ok(created.request_id)
    }

    async fn create_message_signature(
        &self,
        organization_id: &str,
        request: &CreateMessageSignature,
    ) -> Result<String> {
        let (query, field) = match request.kind {
            MessageKind::PersonalSign => (CREATE_ETH_PERSONAL_SIGN, "createEthPersonalSign"),
            MessageKind::TypedData(_) => (CREATE_ETH_SIGN_TYPED_DATA, "createEthSignTypedData"),
        };
        let created: CreatedRequest = self.call(organization_id, query, field, request).await?;
        Ok(created.request_id)
    }

    async fn transaction_info(
        &self,
        organization_id: &str,
        remote_request_id: &str,
    ) -> Result<TransactionInfo> {
        let body = json!({ "requestId": remote_request_id });
        self.call(organization_id, TRANSACTION_INFO, "transactionInfo", &body)
            .await
    }

    async fn get_request(
        &self,
        organization_id: &str,
        remote_request_id: &str,
    ) -> Result<RemoteRequest> {
        let body = json!({ "requestId": remote_request_id });
        self.call(organization_id, GET_REQUEST, "getRequest", &body).await
    }
}

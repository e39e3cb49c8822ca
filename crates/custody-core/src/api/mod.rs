//! Clients for the custody service and the chain RPC proxy.

pub mod custody;
pub mod graphql;
pub mod probe;
pub mod queries;

pub use custody::CustodyClient;
pub use graphql::{GraphqlClient, GraphqlError};
pub use probe::HttpRpcProbe;
pub use queries::{
    CreateMessageSignature, CreateTransaction, MessageKind, RemoteRequest, RemoteStatus,
    TransactionInfo, TransactionInput,
};

use async_trait::async_trait;

use crate::Result;

/// Authenticated operations on the custody service.
///
/// Every call is made on behalf of an organization; implementations resolve
/// the session credential themselves.
#[async_trait]
pub trait CustodyApi: Send + Sync {
    /// Create a transaction signing job. Returns the remote request id.
    async fn create_transaction(
        &self,
        organization_id: &str,
        request: &CreateTransaction,
    ) -> Result<String>;

    /// Create a message signing job. Returns the remote request id.
    async fn create_message_signature(
        &self,
        organization_id: &str,
        request: &CreateMessageSignature,
    ) -> Result<String>;

    async fn transaction_info(
        &self,
        organization_id: &str,
        remote_request_id: &str,
    ) -> Result<TransactionInfo>;

    async fn get_request(&self, organization_id: &str, remote_request_id: &str)
        -> Result<RemoteRequest>;
}

/// Checks that chain RPC traffic is routed through the custody proxy.
#[async_trait]
pub trait RpcProbe: Send + Sync {
    async fn proxy_enabled(&self) -> Result<bool>;
}

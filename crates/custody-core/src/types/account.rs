//! Custodied account records.

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::method::{parse_address, SUPPORTED_METHODS};
use crate::{Error, Result};

/// An account whose key is held by the custody service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: Uuid,
    /// Immutable after creation; unique across the account table.
    pub address: Address,
    /// Resolves to the session credential used for this account's requests.
    pub organization_id: String,
    pub supported_methods: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn supports(&self, method: &str) -> bool {
        self.supported_methods.iter().any(|m| m == method)
    }
}

/// Input for creating an account.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    pub address: String,
    pub organization_id: String,
    /// Defaults to every supported method.
    #[serde(default)]
    pub supported_methods: Option<Vec<String>>,
}

impl NewAccount {
    /// Validate the input and build the account record.
    pub fn into_account(self) -> Result<Account> {
        let address = parse_address(&self.address)?;

        let organization_id = self.organization_id.trim().to_string();
        if organization_id.is_empty() {
            return Err(Error::Validation("organizationId must not be empty".into()));
        }

        let supported_methods = match self.supported_methods {
            Some(methods) if methods.is_empty() => {
                return Err(Error::Validation(
                    "supportedMethods must not be empty".into(),
                ))
            }
            Some(methods) => {
                if let Some(unknown) = methods
                    .iter()
                    .find(|m| !SUPPORTED_METHODS.contains(&m.as_str()))
                {
                    return Err(Error::UnsupportedMethod(unknown.clone()));
                }
                methods
            }
            None => SUPPORTED_METHODS.iter().map(|m| m.to_string()).collect(),
        };

        Ok(Account {
            id: Uuid::new_v4(),
            address,
            organization_id,
            supported_methods,
            created_at: Utc::now(),
        })
    }
}

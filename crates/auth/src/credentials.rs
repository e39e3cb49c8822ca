//! Session credentials issued by the custody service.
//!
//! One session token per organization. Tokens are opaque encrypted blobs
//! `{enc, iv, tag}`; a refresh replaces the whole token, never individual
//! fields.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Encrypted session token as issued by the custody service.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken {
    pub enc: String,
    pub iv: String,
    pub tag: String,
}

impl SessionToken {
    pub fn new(enc: impl Into<String>, iv: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            enc: enc.into(),
            iv: iv.into(),
            tag: tag.into(),
        }
    }

    /// All three parts present and non-empty.
    pub fn is_complete(&self) -> bool {
        !self.enc.is_empty() && !self.iv.is_empty() && !self.tag.is_empty()
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never expose token material in debug output
        f.debug_struct("SessionToken")
            .field("complete", &self.is_complete())
            .finish()
    }
}

/// A session token bound to its organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub organization_id: String,
    pub session_token: SessionToken,
}

/// Receives session lifecycle notifications from the transport.
#[async_trait]
pub trait SessionObserver: Send + Sync {
    /// The organization's session could not be refreshed and its credential
    /// was removed. The user has to re-authenticate.
    async fn session_invalidated(&self, organization_id: &str);
}

/// Shared organization → session token map.
///
/// Cloning yields another handle to the same store.
#[derive(Clone, Default)]
pub struct CredentialStore {
    tokens: Arc<RwLock<HashMap<String, SessionToken>>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, organization_id: &str) -> Option<SessionToken> {
        self.tokens.read().await.get(organization_id).cloned()
    }

    pub async fn contains(&self, organization_id: &str) -> bool {
        self.tokens.read().await.contains_key(organization_id)
    }

    /// Install or wholesale-replace the token for an organization.
    pub async fn install(&self, organization_id: &str, token: SessionToken) {
        let replaced = self
            .tokens
            .write()
            .await
            .insert(organization_id.to_string(), token)
            .is_some();
        info!(organization_id, replaced, "Installed session credential");
    }

    pub async fn remove(&self, organization_id: &str) -> Option<SessionToken> {
        let removed = self.tokens.write().await.remove(organization_id);
        debug!(
            organization_id,
            removed = removed.is_some(),
            "Removed session credential"
        );
        removed
    }

    /// Ordered copy of every credential, for persistence.
    pub async fn snapshot(&self) -> BTreeMap<String, SessionToken> {
        self.tokens
            .read()
            .await
            .iter()
            .map(|(org, token)| (org.clone(), token.clone()))
            .collect()
    }

    /// Replace the whole store with persisted credentials.
    pub async fn restore(&self, credentials: BTreeMap<String, SessionToken>) {
        let mut tokens = self.tokens.write().await;
        tokens.clear();
        tokens.extend(credentials);
    }
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(tag: &str) -> SessionToken {
        SessionToken::new("enc", "iv", tag)
    }

    #[tokio::test]
    async fn test_install_replaces_wholesale() {
        let store = CredentialStore::new();
        store.install("org-1", token("old")).await;
        store
            .install("org-1", SessionToken::new("enc2", "iv2", "new"))
            .await;

        let current = store.get("org-1").await.unwrap();
        assert_eq!(current, SessionToken::new("enc2", "iv2", "new"));
    }

    #[tokio::test]
    async fn test_organizations_are_independent() {
        let store = CredentialStore::new();
        store.install("org-1", token("a")).await;

        assert!(store.contains("org-1").await);
        assert!(!store.contains("org-2").await);
        assert!(store.get("org-2").await.is_none());
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = CredentialStore::new();
        let handle = store.clone();
        handle.install("org-1", token("a")).await;

        assert!(store.contains("org-1").await);
        assert!(store.remove("org-1").await.is_some());
        assert!(!handle.contains("org-1").await);
    }

    #[tokio::test]
    async fn test_snapshot_and_restore() {
        let store = CredentialStore::new();
        store.install("org-b", token("b")).await;
        store.install("org-a", token("a")).await;

        let snapshot = store.snapshot().await;
        assert_eq!(
            snapshot.keys().cloned().collect::<Vec<_>>(),
            vec!["org-a".to_string(), "org-b".to_string()]
        );

        let restored = CredentialStore::new();
        restored.install("stale", token("x")).await;
        restored.restore(snapshot).await;
        assert!(!restored.contains("stale").await);
        assert_eq!(restored.get("org-a").await, Some(token("a")));
    }

    #[test]
    fn test_completeness() {
        assert!(token("t").is_complete());
        assert!(!SessionToken::new("enc", "", "tag").is_complete());
    }

    #[test]
    fn test_debug_does_not_expose_token() {
        let debug_str = format!("{:?}", SessionToken::new("secret-enc", "iv", "tag"));
        assert!(!debug_str.contains("secret-enc"));
    }
}

//! File-backed host runtime.
//!
//! State is written as pretty JSON to a temp file and renamed into place.
//! Entropy is HMAC-SHA256 of the salt under a master seed, so keys derived
//! from it survive restarts as long as the seed does.

use async_trait::async_trait;
use auth::{SecretSeed, SessionObserver, SEED_SIZE};
use chrono::{DateTime, Utc};
use custody_core::{Error, Result};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use signing_engine::{HostRuntime, KeyringEvent, KeyringState, Notice};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};
use zeroize::Zeroizing;

type HmacSha256 = Hmac<Sha256>;

/// Journal entries kept in memory for `/events`.
const JOURNAL_CAPACITY: usize = 256;

/// Something the keyring told the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JournalEntry {
    Event {
        at: DateTime<Utc>,
        #[serde(flatten)]
        event: KeyringEvent,
    },
    Notice {
        at: DateTime<Utc>,
        #[serde(flatten)]
        notice: Notice,
    },
}

pub struct FileHost {
    path: PathBuf,
    master_seed: Zeroizing<[u8; SEED_SIZE]>,
    journal: Mutex<VecDeque<JournalEntry>>,
}

impl FileHost {
    /// `master_seed_hex` is 32 bytes of hex, optionally `0x`-prefixed.
    pub fn new(path: impl Into<PathBuf>, master_seed_hex: &str) -> Result<Self> {
        let body = master_seed_hex.trim();
        let body = body.strip_prefix("0x").unwrap_or(body);
        let bytes = Zeroizing::new(hex::decode(body).map_err(|_| Error::Config {
            message: "KEYRING_ENTROPY_SEED must be hex".to_string(),
        })?);
        if bytes.len() != SEED_SIZE {
            return Err(Error::Config {
                message: format!(
                    "KEYRING_ENTROPY_SEED must be {} bytes, got {}",
                    SEED_SIZE,
                    bytes.len()
                ),
            });
        }
        let mut master_seed = Zeroizing::new([0u8; SEED_SIZE]);
        master_seed.copy_from_slice(&bytes);

        Ok(Self {
            path: path.into(),
            master_seed,
            journal: Mutex::new(VecDeque::with_capacity(JOURNAL_CAPACITY)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Most recent events and notices, oldest first.
    pub fn journal(&self) -> Vec<JournalEntry> {
        match self.journal.lock() {
            Ok(journal) => journal.iter().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
        }
    }

    fn record(&self, entry: JournalEntry) {
        let mut journal = match self.journal.lock() {
            Ok(journal) => journal,
            Err(poisoned) => poisoned.into_inner(),
        };
        if journal.len() == JOURNAL_CAPACITY {
            journal.pop_front();
        }
        journal.push_back(entry);
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "keyring-state.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn host_error(context: &str, error: impl std::fmt::Display) -> Error {
    Error::Host {
        message: format!("{}: {}", context, error),
    }
}

#[async_trait]
impl HostRuntime for FileHost {
    async fn load_state(&self) -> Result<Option<KeyringState>> {
        let raw = match tokio::fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "No saved keyring state");
                return Ok(None);
            }
            Err(e) => return Err(host_error("failed to read state", e)),
        };
        let state = serde_json::from_slice(&raw)
            .map_err(|e| host_error("saved state is corrupt", e))?;
        Ok(Some(state))
    }

    async fn save_state(&self, state: &KeyringState) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| host_error("failed to create state directory", e))?;
        }
        let body = serde_json::to_vec_pretty(state)?;
        let temp = self.temp_path();
        tokio::fs::write(&temp, body)
            .await
            .map_err(|e| host_error("failed to write state", e))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| host_error("failed to replace state", e))?;
        Ok(())
    }

    async fn entropy(&self, salt: &str) -> Result<SecretSeed> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(self.master_seed.as_slice())
            .map_err(|e| host_error("invalid master seed", e))?;
        mac.update(salt.as_bytes());
        Ok(SecretSeed::from_slice(&mac.finalize().into_bytes())?)
    }

    async fn notify(&self, notice: Notice) {
        warn!(notice = ?notice, "User notice");
        self.record(JournalEntry::Notice {
            at: Utc::now(),
            notice,
        });
    }

    async fn emit(&self, event: KeyringEvent) {
        info!(event = ?event, "Keyring event");
        self.record(JournalEntry::Event {
            at: Utc::now(),
            event,
        });
    }
}

#[async_trait]
impl SessionObserver for FileHost {
    async fn session_invalidated(&self, organization_id: &str) {
        self.notify(Notice::SessionInvalidated {
            organization_id: organization_id.to_string(),
        })
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auth::DeterministicKeyVault;
    use signing_engine::Settings;

    const SEED: &str = "0x000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[tokio::test]
    async fn test_state_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let host = FileHost::new(dir.path().join("nested/state.json"), SEED).unwrap();
        assert!(host.load_state().await.unwrap().is_none());

        let state = KeyringState {
            settings: Settings {
                enhanced_mode: true,
                rpc_routes: Vec::new(),
            },
            ..Default::default()
        };
        host.save_state(&state).await.unwrap();

        assert_eq!(host.load_state().await.unwrap(), Some(state));
        assert!(!host.temp_path().exists());
    }

    #[tokio::test]
    async fn test_corrupt_state_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"{not json").unwrap();
        let host = FileHost::new(&path, SEED).unwrap();
        assert!(matches!(host.load_state().await, Err(Error::Host { .. })));
    }

    #[tokio::test]
    async fn test_entropy_is_stable_per_salt() {
        let dir = tempfile::tempdir().unwrap();
        let host = FileHost::new(dir.path().join("state.json"), SEED).unwrap();
        let again = FileHost::new(dir.path().join("other.json"), SEED).unwrap();
        let vault = DeterministicKeyVault::new();

        let a = vault
            .public_key_hex(host.entropy("salt-a").await.unwrap(), "request")
            .unwrap();
        let a_again = vault
            .public_key_hex(again.entropy("salt-a").await.unwrap(), "request")
            .unwrap();
        let b = vault
            .public_key_hex(host.entropy("salt-b").await.unwrap(), "request")
            .unwrap();
        assert_eq!(a, a_again);
        assert_ne!(a, b);
    }

    #[test]
    fn test_bad_seed_rejected() {
        assert!(FileHost::new("state.json", "not-hex").is_err());
        assert!(FileHost::new("state.json", "0x0102").is_err());
    }

    #[tokio::test]
    async fn test_journal_records_notices_and_events() {
        let host = FileHost::new("state.json", SEED).unwrap();
        host.session_invalidated("org-1").await;
        host.emit(KeyringEvent::RequestRejected {
            request_id: uuid::Uuid::nil(),
        })
        .await;

        let journal = host.journal();
        assert_eq!(journal.len(), 2);
        assert!(matches!(
            &journal[0],
            JournalEntry::Notice { notice: Notice::SessionInvalidated { organization_id }, .. }
                if organization_id == "org-1"
        ));

        let json = serde_json::to_value(&journal[1]).unwrap();
        assert_eq!(json["kind"], "event");
        assert_eq!(json["event"], "request_rejected");
    }
}

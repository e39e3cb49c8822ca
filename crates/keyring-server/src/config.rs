//! Server configuration.

use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: String,
    /// Where the keyring state file lives.
    pub state_path: PathBuf,
    /// Hex master seed for host entropy.
    pub entropy_seed: Option<String>,
    pub cors_permissive: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:3030".to_string(),
            state_path: PathBuf::from("keyring-state.json"),
            entropy_seed: None,
            cors_permissive: false,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            listen_addr: std::env::var("KEYRING_LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            state_path: std::env::var("KEYRING_STATE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.state_path),
            entropy_seed: std::env::var("KEYRING_ENTROPY_SEED")
                .ok()
                .filter(|s| !s.is_empty()),
            cors_permissive: std::env::var("CORS_PERMISSIVE")
                .map(|v| v == "true")
                .unwrap_or(defaults.cors_permissive),
        }
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        self.listen_addr
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid listen address {}: {}", self.listen_addr, e))
    }
}

//! Configuration management for the vault keyring.

use crate::types::RpcRoute;
use crate::{Error, Result};
use serde::Deserialize;
use std::env;
use url::Url;

/// Source tag reported to the custody service when none is configured.
pub const DEFAULT_SOURCE_TAG: &str = "vault-keyring";

/// Keyring configuration shared by the engine and the server.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyringConfig {
    pub custody: CustodyConfig,
    pub enhanced_mode: EnhancedModeConfig,
    pub poller: PollerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustodyConfig {
    /// GraphQL endpoint of the custody service.
    pub api_url: String,
    /// Source tag attached to every signing job.
    pub source_tag: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct EnhancedModeConfig {
    /// Initial enhanced-mode flag; later changes go through the keyring's
    /// configuration update and are persisted with its state.
    pub enabled: bool,
    /// Endpoint probed for the custody proxy marker.
    pub probe_url: Option<String>,
    pub rpc_routes: Vec<RpcRoute>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PollerConfig {
    pub interval_secs: u64,
}

impl KeyringConfig {
    /// Load configuration from environment variables.
    ///
    /// `RPC_ROUTES` is a comma-separated list of `chainId=url` pairs.
    #[allow(clippy::result_large_err)]
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let api_url = env::var("CUSTODY_API_URL").map_err(|_| Error::Config {
            message: "CUSTODY_API_URL environment variable not set".to_string(),
        })?;

        let config = Self {
            custody: CustodyConfig {
                api_url,
                source_tag: env::var("CUSTODY_SOURCE_TAG")
                    .unwrap_or_else(|_| DEFAULT_SOURCE_TAG.to_string()),
                timeout_secs: env::var("CUSTODY_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            },
            enhanced_mode: EnhancedModeConfig {
                enabled: env::var("ENHANCED_MODE")
                    .map(|v| v == "true" || v == "1")
                    .unwrap_or(false),
                probe_url: env::var("RPC_PROBE_URL").ok().filter(|s| !s.is_empty()),
                rpc_routes: env::var("RPC_ROUTES")
                    .ok()
                    .map(|raw| parse_rpc_routes(&raw))
                    .transpose()?
                    .unwrap_or_default(),
            },
            poller: PollerConfig {
                interval_secs: env::var("POLL_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(15),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Check URLs and intervals.
    pub fn validate(&self) -> Result<()> {
        validate_url("CUSTODY_API_URL", &self.custody.api_url)?;
        if let Some(probe_url) = &self.enhanced_mode.probe_url {
            validate_url("RPC_PROBE_URL", probe_url)?;
        }
        for route in &self.enhanced_mode.rpc_routes {
            route.validate()?;
        }
        if self.poller.interval_secs == 0 {
            return Err(Error::Config {
                message: "POLL_INTERVAL_SECS must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Configuration for tests (with defaults).
    pub fn test_config(api_url: impl Into<String>) -> Self {
        Self {
            custody: CustodyConfig {
                api_url: api_url.into(),
                source_tag: DEFAULT_SOURCE_TAG.to_string(),
                timeout_secs: 5,
            },
            enhanced_mode: EnhancedModeConfig::default(),
            poller: PollerConfig { interval_secs: 1 },
        }
    }
}

fn validate_url(name: &str, raw: &str) -> Result<()> {
    let url = Url::parse(raw).map_err(|e| Error::Config {
        message: format!("{} is not a valid URL: {}", name, e),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(Error::Config {
            message: format!("{} must use http or https, got {}", name, other),
        }),
    }
}

fn parse_rpc_routes(raw: &str) -> Result<Vec<RpcRoute>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (chain_id, url) = entry.split_once('=').ok_or_else(|| Error::Config {
                message: format!("RPC_ROUTES entry '{}' is not chainId=url", entry),
            })?;
            let chain_id = chain_id.trim().parse::<u64>().map_err(|_| Error::Config {
                message: format!("RPC_ROUTES chain id '{}' is not a number", chain_id),
            })?;
            Ok(RpcRoute {
                chain_id,
                url: url.trim().to_string(),
            })
        })
        .collect()
}

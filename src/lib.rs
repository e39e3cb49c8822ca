//! Vault Keyring: custody-held accounts exposed as asynchronous signing
//! accounts.
//!
//! This root crate ties the workspace together for cross-crate integration
//! tests. For actual functionality, use the individual crates directly:
//!
//! - `auth`: session credentials, the deterministic key vault, ECIES
//! - `custody-core`: domain types, signature codec, custody GraphQL client
//! - `signing-engine`: the request lifecycle orchestrator
//! - `keyring-server`: HTTP surface, file-backed host and poller

pub use auth;
pub use custody_core as core;
pub use keyring_server as server;
pub use signing_engine as engine;

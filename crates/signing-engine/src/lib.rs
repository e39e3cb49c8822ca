//! Signing Engine
//!
//! Tracks signing requests for custody-held accounts from submission to a
//! terminal outcome, and rebuilds message signatures returned by the
//! custody service.

pub mod host;
pub mod orchestrator;
pub mod state;

pub use host::{HostRuntime, KeyringEvent, Notice};
pub use orchestrator::{ConfigurationUpdate, PollSummary, SigningOrchestrator};
pub use state::{KeyringState, Settings};

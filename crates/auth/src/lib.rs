//! Authentication and Key Material
//!
//! Custody session credentials, the deterministic request-key vault and the
//! ECIES scheme the custody service uses to return signatures.

pub mod credentials;
pub mod ecies;
pub mod key_vault;

pub use credentials::{Credential, CredentialStore, SessionObserver, SessionToken};
pub use ecies::EciesError;
pub use key_vault::{DerivedKey, DeterministicKeyVault, KeyVaultError, SecretSeed, SEED_SIZE};

//! Deterministic key vault for request-scoped encryption keys.
//!
//! Every message-signing request gets its own secp256k1 key pair. The public
//! half is sent to the custody service at submission time so it can encrypt
//! the signature it produces; the secret half is never stored. It is derived
//! again from the host-provided secret seed and the request id whenever the
//! encrypted signature comes back.

use hmac::{Hmac, Mac};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{PublicKey, SecretKey};
use sha2::Sha256;
use std::fmt;
use thiserror::Error;
use tracing::debug;
use zeroize::Zeroizing;

use crate::ecies::{self, EciesError};

type HmacSha256 = Hmac<Sha256>;

/// Upper bound on derivation rounds. A 32-byte HMAC output is an invalid
/// scalar with probability ~2^-128, so this is never reached in practice.
const MAX_DERIVATION_ROUNDS: u32 = 16;

/// Size of the host-provided secret seed.
pub const SEED_SIZE: usize = 32;

/// Errors raised while deriving request keys.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyVaultError {
    #[error("secret seed must be 32 bytes, got {0}")]
    InvalidSeedLength(usize),

    #[error("derivation salt must not be empty")]
    EmptySalt,

    #[error("no valid secp256k1 scalar after 16 derivation rounds")]
    DerivationExhausted,

    #[error(transparent)]
    Ecies(#[from] EciesError),
}

/// High-entropy secret supplied by the host wallet. Zeroized on drop.
pub struct SecretSeed(Zeroizing<[u8; SEED_SIZE]>);

impl SecretSeed {
    pub fn new(bytes: [u8; SEED_SIZE]) -> Self {
        Self(Zeroizing::new(bytes))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyVaultError> {
        if bytes.len() != SEED_SIZE {
            return Err(KeyVaultError::InvalidSeedLength(bytes.len()));
        }
        let mut seed = Zeroizing::new([0u8; SEED_SIZE]);
        seed.copy_from_slice(bytes);
        Ok(Self(seed))
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl fmt::Debug for SecretSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretSeed(..)")
    }
}

/// A key pair that only lives for the duration of one vault operation.
///
/// Not `Clone`; the secret scalar is zeroized when this value drops.
pub struct DerivedKey {
    secret: SecretKey,
}

impl DerivedKey {
    pub fn public_key(&self) -> PublicKey {
        self.secret.public_key()
    }

    /// Uncompressed SEC1 public key, hex-encoded with a `0x` prefix.
    pub fn public_key_hex(&self) -> String {
        format!(
            "0x{}",
            hex::encode(self.public_key().to_encoded_point(false).as_bytes())
        )
    }

    pub fn decrypt(&self, payload: &[u8]) -> Result<Vec<u8>, EciesError> {
        ecies::decrypt(&self.secret, payload)
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKey")
            .field("public_key", &self.public_key_hex())
            .finish()
    }
}

/// Regenerates request keys from `(seed, salt)` on demand.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeterministicKeyVault;

impl DeterministicKeyVault {
    pub fn new() -> Self {
        Self
    }

    /// Derive the key for `salt`, hand it to `op`, then drop it.
    ///
    /// The seed is consumed so it is zeroized when this call returns.
    pub fn with_key<R>(
        &self,
        seed: SecretSeed,
        salt: &str,
        op: impl FnOnce(&DerivedKey) -> R,
    ) -> Result<R, KeyVaultError> {
        let key = derive(&seed, salt)?;
        Ok(op(&key))
    }

    /// Encryption public key to hand to the custody service for `salt`.
    pub fn public_key_hex(&self, seed: SecretSeed, salt: &str) -> Result<String, KeyVaultError> {
        self.with_key(seed, salt, DerivedKey::public_key_hex)
    }

    /// Decrypt a payload sealed to the key for `salt`.
    pub fn decrypt(
        &self,
        seed: SecretSeed,
        salt: &str,
        payload: &[u8],
    ) -> Result<Vec<u8>, KeyVaultError> {
        Ok(self.with_key(seed, salt, |key| key.decrypt(payload))??)
    }
}

/// HMAC-SHA256(seed, salt || round) until the output is a valid scalar.
fn derive(seed: &SecretSeed, salt: &str) -> Result<DerivedKey, KeyVaultError> {
    if salt.is_empty() {
        return Err(KeyVaultError::EmptySalt);
    }

    for round in 0..MAX_DERIVATION_ROUNDS {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(seed.as_bytes())
            .map_err(|_| KeyVaultError::InvalidSeedLength(seed.as_bytes().len()))?;
        mac.update(salt.as_bytes());
        mac.update(&round.to_be_bytes());

        let mut candidate = Zeroizing::new([0u8; 32]);
        candidate.copy_from_slice(&mac.finalize().into_bytes());

        match SecretKey::from_slice(candidate.as_slice()) {
            Ok(secret) => return Ok(DerivedKey { secret }),
            Err(_) => debug!(round, "Derived bytes are not a valid scalar, retrying"),
        }
    }

    Err(KeyVaultError::DerivationExhausted)
}

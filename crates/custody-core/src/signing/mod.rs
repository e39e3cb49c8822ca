//! Signature codec for message signing requests.
//!
//! The custody service returns message signatures as an ECIES-encrypted
//! 64-byte `r || s` blob. The keyring decrypts it with a derived vault key,
//! then rebuilds the 65-byte wallet signature here:
//!
//! ```text
//! SigningRequest ── digest() ──► B256
//!                                  │
//! raw r || s ─► normalize_s ─► try v = 27, 28 ─► recover == signer?
//!                                                     │
//!                                                     ▼
//!                                      0x || r || s || v (132 chars)
//! ```

pub mod digest;
pub mod signature;

pub use digest::{personal_sign_digest, typed_data_digest};
pub use signature::{
    decode_raw_signature, normalize_s, reconstruct_signature, recover_address, SECP256K1_ORDER,
};

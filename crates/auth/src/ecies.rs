//! Elliptic Curve Integrated Encryption Scheme (ECIES) over secp256k1.
//!
//! Layout of a sealed payload:
//!
//! ```text
//! ephemeral public key (65, uncompressed) || nonce (16) || tag (16) || ciphertext
//! ```
//!
//! The symmetric key is HKDF-SHA256 (zero salt, empty info) over
//! `ephemeral_pk || shared_point`, both SEC1-encoded in the same form as the
//! ephemeral key. AES-256-GCM uses a 16-byte nonce.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::aes::Aes256;
use aes_gcm::{AeadCore, AesGcm, Nonce};
use hmac::{Hmac, Mac};
use k256::elliptic_curve::group::Curve;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{PublicKey, SecretKey};
use sha2::Sha256;
use thiserror::Error;

/// AES-256-GCM with a 16-byte nonce.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

type HmacSha256 = Hmac<Sha256>;

const NONCE_SIZE: usize = 16;
const TAG_SIZE: usize = 16;
const UNCOMPRESSED_KEY_SIZE: usize = 65;
const COMPRESSED_KEY_SIZE: usize = 33;

/// Errors returned by ECIES operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EciesError {
    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("decryption failed (wrong key or tampered ciphertext)")]
    DecryptionFailed,
}

/// HKDF-SHA256 extract-then-expand to 32 bytes with zero salt and empty info.
fn hkdf_sha256(ikm: &[u8]) -> Result<[u8; 32], EciesError> {
    let mut extract = <HmacSha256 as Mac>::new_from_slice(&[0u8; 32])
        .map_err(|_| EciesError::EncryptionFailed)?;
    extract.update(ikm);
    let prk = extract.finalize().into_bytes();

    let mut expand =
        <HmacSha256 as Mac>::new_from_slice(&prk).map_err(|_| EciesError::EncryptionFailed)?;
    expand.update(&[1u8]);

    let mut okm = [0u8; 32];
    okm.copy_from_slice(&expand.finalize().into_bytes());
    Ok(okm)
}

/// ECDH shared point `secret * public`, SEC1-encoded.
fn shared_point(public: &PublicKey, secret: &SecretKey, compressed: bool) -> Vec<u8> {
    let point = (public.to_projective() * *secret.to_nonzero_scalar()).to_affine();
    point.to_encoded_point(compressed).as_bytes().to_vec()
}

fn derive_shared_key(
    ephemeral_pk: &[u8],
    shared: &[u8],
) -> Result<[u8; 32], EciesError> {
    let mut ikm = Vec::with_capacity(ephemeral_pk.len() + shared.len());
    ikm.extend_from_slice(ephemeral_pk);
    ikm.extend_from_slice(shared);
    hkdf_sha256(&ikm)
}

/// Encrypt `plaintext` to a SEC1-encoded secp256k1 public key.
pub fn encrypt(receiver_public_key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, EciesError> {
    let receiver =
        PublicKey::from_sec1_bytes(receiver_public_key).map_err(|_| EciesError::InvalidPublicKey)?;

    let ephemeral = SecretKey::random(&mut OsRng);
    let ephemeral_pk = ephemeral.public_key().to_encoded_point(false);
    let shared = shared_point(&receiver, &ephemeral, false);
    let key = derive_shared_key(ephemeral_pk.as_bytes(), &shared)?;

    let cipher = <Aes256Gcm16 as KeyInit>::new_from_slice(&key)
        .map_err(|_| EciesError::EncryptionFailed)?;
    let nonce = Aes256Gcm16::generate_nonce(&mut OsRng);

    // aes-gcm appends the tag to the ciphertext
    let sealed = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| EciesError::EncryptionFailed)?;
    let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_SIZE);

    let mut out =
        Vec::with_capacity(UNCOMPRESSED_KEY_SIZE + NONCE_SIZE + TAG_SIZE + ciphertext.len());
    out.extend_from_slice(ephemeral_pk.as_bytes());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(tag);
    out.extend_from_slice(ciphertext);
    Ok(out)
}

/// Decrypt a sealed payload with the receiver's secret key.
///
/// Accepts either an uncompressed or a compressed ephemeral key; the key form
/// also selects the encoding of the shared point fed into HKDF.
pub(crate) fn decrypt(receiver: &SecretKey, payload: &[u8]) -> Result<Vec<u8>, EciesError> {
    let key_size = match payload.first() {
        Some(0x04) => UNCOMPRESSED_KEY_SIZE,
        Some(0x02) | Some(0x03) => COMPRESSED_KEY_SIZE,
        Some(_) => return Err(EciesError::InvalidMessage("unknown ephemeral key prefix")),
        None => return Err(EciesError::InvalidMessage("empty payload")),
    };
    if payload.len() < key_size + NONCE_SIZE + TAG_SIZE {
        return Err(EciesError::InvalidMessage("payload too short"));
    }

    let (ephemeral_bytes, rest) = payload.split_at(key_size);
    let (nonce_bytes, rest) = rest.split_at(NONCE_SIZE);
    let (tag, ciphertext) = rest.split_at(TAG_SIZE);

    let ephemeral =
        PublicKey::from_sec1_bytes(ephemeral_bytes).map_err(|_| EciesError::InvalidPublicKey)?;
    let shared = shared_point(&ephemeral, receiver, key_size == COMPRESSED_KEY_SIZE);
    let key = derive_shared_key(ephemeral_bytes, &shared)?;

    let cipher = <Aes256Gcm16 as KeyInit>::new_from_slice(&key)
        .map_err(|_| EciesError::DecryptionFailed)?;

    let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_SIZE);
    sealed.extend_from_slice(ciphertext);
    sealed.extend_from_slice(tag);

    cipher
        .decrypt(Nonce::<U16>::from_slice(nonce_bytes), sealed.as_slice())
        .map_err(|_| EciesError::DecryptionFailed)
}

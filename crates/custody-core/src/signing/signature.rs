//! Low-s normalization and recovery-id reconstruction.

use alloy_primitives::{keccak256, uint, Address, B256, U256};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

use crate::{Error, Result};

/// Order of the secp256k1 group.
pub const SECP256K1_ORDER: U256 =
    uint!(0xFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEBAAEDCE6AF48A03BBFD25E8CD0364141_U256);

const RAW_SIGNATURE_LEN: usize = 64;

/// Map `s` into the lower half of the group order.
pub fn normalize_s(s: U256) -> U256 {
    if s > SECP256K1_ORDER >> 1usize {
        SECP256K1_ORDER - s
    } else {
        s
    }
}

/// Recover the signer address of a prehashed digest.
pub fn recover_address(digest: &B256, r: &[u8; 32], s: &[u8; 32], v: u8) -> Result<Address> {
    let recovery_id_val = match v {
        0 | 27 => 0,
        1 | 28 => 1,
        _ => {
            return Err(Error::Validation(format!("invalid recovery id: {}", v)));
        }
    };
    let recovery_id = RecoveryId::try_from(recovery_id_val)
        .map_err(|e| Error::Validation(format!("invalid recovery id: {}", e)))?;

    let mut sig_bytes = [0u8; RAW_SIGNATURE_LEN];
    sig_bytes[..32].copy_from_slice(r);
    sig_bytes[32..].copy_from_slice(s);
    let signature = Signature::from_slice(&sig_bytes)
        .map_err(|e| Error::Validation(format!("invalid signature: {}", e)))?;

    let verifying_key = VerifyingKey::recover_from_prehash(digest.as_slice(), &signature, recovery_id)
        .map_err(|e| Error::Validation(format!("failed to recover key: {}", e)))?;

    // keccak256 of the uncompressed point without its 0x04 tag; last 20 bytes.
    let public_key = verifying_key.to_encoded_point(false);
    let hash = keccak256(&public_key.as_bytes()[1..]);
    Ok(Address::from_slice(&hash[12..]))
}

/// Turn the decrypted custody payload into raw `r || s` bytes.
///
/// The payload is either the 64 raw bytes or their hex text.
pub fn decode_raw_signature(plaintext: &[u8]) -> Result<Vec<u8>> {
    if plaintext.len() == RAW_SIGNATURE_LEN {
        return Ok(plaintext.to_vec());
    }
    let decoded = std::str::from_utf8(plaintext)
        .ok()
        .map(str::trim)
        .map(|text| text.strip_prefix("0x").unwrap_or(text))
        .and_then(|body| hex::decode(body).ok());
    match decoded {
        Some(bytes) if bytes.len() == RAW_SIGNATURE_LEN => Ok(bytes),
        Some(bytes) => Err(Error::InvalidSignatureLength(bytes.len())),
        None => Err(Error::InvalidSignatureLength(plaintext.len())),
    }
}

/// Rebuild the 65-byte wallet signature for `signer` from raw `r || s`.
///
/// `s` is normalized to the low half, then `v` is found by trying 27 and 28
/// until the recovered address matches the signer. Returns the signature as
/// `0x`-prefixed lowercase hex.
pub fn reconstruct_signature(digest: &B256, raw: &[u8], signer: &Address) -> Result<String> {
    if raw.len() != RAW_SIGNATURE_LEN {
        return Err(Error::InvalidSignatureLength(raw.len()));
    }

    let mut r = [0u8; 32];
    r.copy_from_slice(&raw[..32]);
    let s: [u8; 32] = normalize_s(U256::from_be_slice(&raw[32..])).to_be_bytes();

    for v in [27u8, 28] {
        match recover_address(digest, &r, &s, v) {
            Ok(recovered) if recovered == *signer => {
                return Ok(format!("0x{}{}{:02x}", hex::encode(r), hex::encode(s), v));
            }
            Ok(recovered) => {
                tracing::trace!(v, %recovered, "recovery id does not match signer");
            }
            Err(e) => {
                tracing::trace!(v, error = %e, "recovery failed");
            }
        }
    }

    Err(Error::SignatureAddressMismatch {
        address: signer.to_checksum(None),
    })
}

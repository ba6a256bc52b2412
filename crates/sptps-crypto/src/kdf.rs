//! Key expansion of the ECDH shared secret into session key material.
//!
//! SPTPS uses the TLS 1.2 `P_hash` construction with HMAC-SHA512 (SHA-512
//! being the hash bound to the Ed25519 key family): chained HMAC blocks
//! over a seed of `"key expansion" ‖ initiator nonce ‖ responder nonce ‖
//! label`. Both sides order the nonces identically, initiator first,
//! regardless of role.

use hmac::{Hmac, Mac};
use sha2::Sha512;
use zeroize::Zeroizing;

use crate::aead::KEY_MATERIAL_LEN;
use crate::{Error, Result};

type HmacSha512 = Hmac<Sha512>;

/// Length of the handshake nonce carried in each KEX record.
pub const NONCE_LEN: usize = 32;

const KEY_EXPANSION: &[u8] = b"key expansion";

fn hmac(secret: &[u8], parts: &[&[u8]]) -> Result<Zeroizing<[u8; 64]>> {
    let mut mac = HmacSha512::new_from_slice(secret)
        .map_err(|_| Error::KeyDerivation("invalid HMAC key".into()))?;
    for part in parts {
        mac.update(part);
    }
    let mut out = Zeroizing::new([0u8; 64]);
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// TLS 1.2 style PRF: expand `secret` under `seed` to `out_len` bytes.
///
/// `A(1) = HMAC(secret, seed)`, `A(i+1) = HMAC(secret, A(i))`, and the
/// output is the concatenation of `HMAC(secret, A(i) ‖ seed)`.
pub fn prf(secret: &[u8], seed: &[u8], out_len: usize) -> Result<Zeroizing<Vec<u8>>> {
    let mut out = Zeroizing::new(Vec::with_capacity(out_len + 63));
    let mut chain = hmac(secret, &[seed])?;

    while out.len() < out_len {
        let block = hmac(secret, &[&*chain, seed])?;
        out.extend_from_slice(&*block);
        chain = hmac(secret, &[&*chain])?;
    }

    out.truncate(out_len);
    Ok(out)
}

/// Expand the shared secret into the session's 128 bytes of key material.
pub fn expand_key_material(
    shared: &[u8],
    initiator_nonce: &[u8; NONCE_LEN],
    responder_nonce: &[u8; NONCE_LEN],
    label: &[u8],
) -> Result<Zeroizing<[u8; KEY_MATERIAL_LEN]>> {
    let mut seed = Vec::with_capacity(KEY_EXPANSION.len() + 2 * NONCE_LEN + label.len());
    seed.extend_from_slice(KEY_EXPANSION);
    seed.extend_from_slice(initiator_nonce);
    seed.extend_from_slice(responder_nonce);
    seed.extend_from_slice(label);

    let expanded = prf(shared, &seed, KEY_MATERIAL_LEN)?;

    let mut key = Zeroizing::new([0u8; KEY_MATERIAL_LEN]);
    key.copy_from_slice(&expanded);
    Ok(key)
}

//! AEAD record ciphers.
//!
//! One [`RecordCipher`] protects one direction of a session. It is keyed
//! from a 64-byte half of the 128-byte derived key material (only the
//! first 32 bytes of the half feed the AEAD; the remainder is reserved)
//! and encrypts each record under a nonce built from the record's 32-bit
//! sequence number. Sequence numbers are monotonic per direction, so a
//! nonce never repeats under the same key.

use aes_gcm::Aes256Gcm;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use zeroize::Zeroizing;

use crate::suite::CipherSuite;
use crate::{Error, Result};

/// Length of the AEAD authentication tag appended to each record.
pub const TAG_LEN: usize = 16;
/// Bytes of key material consumed by one direction.
pub const KEY_HALF_LEN: usize = 64;
/// Total derived key material per session: one half per direction.
pub const KEY_MATERIAL_LEN: usize = 2 * KEY_HALF_LEN;

/// Bytes of each half that actually key the AEAD.
const AEAD_KEY_LEN: usize = 32;

/// Build the 12-byte record nonce: the little-endian sequence number,
/// zero-padded.
///
/// # Example
/// ```
/// let nonce = sptps_crypto::aead::record_nonce(0x04030201);
/// assert_eq!(&nonce[..4], &[0x01, 0x02, 0x03, 0x04]);
/// assert_eq!(&nonce[4..], &[0; 8]);
/// ```
pub fn record_nonce(seqno: u32) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[..4].copy_from_slice(&seqno.to_le_bytes());
    nonce
}

/// A directional record cipher, dispatched on the negotiated suite.
pub enum RecordCipher {
    /// ChaCha20-Poly1305 backend.
    ChaCha20Poly1305(ChaCha20Poly1305),
    /// AES-256-GCM backend.
    Aes256Gcm(Aes256Gcm),
}

impl RecordCipher {
    /// Key a cipher from one half of the derived key material.
    ///
    /// `upper_half` selects bytes `[64..128)`; otherwise bytes `[0..64)`
    /// are used. Which half belongs to which direction depends on the
    /// session role and is decided by the caller.
    pub fn new(
        suite: CipherSuite,
        key_material: &[u8; KEY_MATERIAL_LEN],
        upper_half: bool,
    ) -> Result<Self> {
        let offset = if upper_half { KEY_HALF_LEN } else { 0 };
        let key = &key_material[offset..offset + AEAD_KEY_LEN];

        match suite {
            CipherSuite::ChaCha20Poly1305 => ChaCha20Poly1305::new_from_slice(key)
                .map(Self::ChaCha20Poly1305)
                .map_err(|_| Error::Encryption),
            CipherSuite::Aes256Gcm => Aes256Gcm::new_from_slice(key)
                .map(Self::Aes256Gcm)
                .map_err(|_| Error::Encryption),
        }
    }

    /// The suite this cipher was keyed for.
    pub fn suite(&self) -> CipherSuite {
        match self {
            Self::ChaCha20Poly1305(_) => CipherSuite::ChaCha20Poly1305,
            Self::Aes256Gcm(_) => CipherSuite::Aes256Gcm,
        }
    }

    /// Encrypt a record body, returning `ciphertext ‖ tag`.
    pub fn encrypt(&self, seqno: u32, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = record_nonce(seqno);
        let nonce = Nonce::from_slice(&nonce);

        match self {
            Self::ChaCha20Poly1305(cipher) => cipher.encrypt(nonce, plaintext),
            Self::Aes256Gcm(cipher) => cipher.encrypt(nonce, plaintext),
        }
        .map_err(|_| Error::Encryption)
    }

    /// Decrypt and verify `ciphertext ‖ tag`.
    ///
    /// A failed tag check is surfaced as [`Error::Decryption`] and never
    /// retried.
    pub fn decrypt(&self, seqno: u32, ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        if ciphertext.len() < TAG_LEN {
            return Err(Error::Decryption);
        }

        let nonce = record_nonce(seqno);
        let nonce = Nonce::from_slice(&nonce);

        match self {
            Self::ChaCha20Poly1305(cipher) => cipher.decrypt(nonce, ciphertext),
            Self::Aes256Gcm(cipher) => cipher.decrypt(nonce, ciphertext),
        }
        .map(Zeroizing::new)
        .map_err(|_| Error::Decryption)
    }
}

//! Handshake record formats.
//!
//! Two message bodies travel inside HANDSHAKE records during a key
//! exchange (the third, ACK, is empty):
//!
//! ```text
//! KEX: [version:u8][preferred:u8][suite mask:u16][nonce:32][ephemeral:32]
//! SIG: [signature:64] over [flag:u8][signer KEX][verifier KEX][label]
//! ```
//!
//! The flag is 1 when the signer initiated the session; each side builds
//! the verification transcript from its own perspective, so both KEX
//! copies must be retained until the signature exchange completes.

use rand::rngs::OsRng;
use rand::RngCore;

use sptps_crypto::kdf::NONCE_LEN;
use sptps_crypto::kex::ECDH_PUBLIC_LEN;

use crate::{Error, Result};

/// Wire version this implementation speaks.
pub const VERSION: u8 = 0;

/// KEX body length: version, preferred suite, suite mask, nonce,
/// ephemeral public key.
pub const KEX_LEN: usize = 4 + NONCE_LEN + ECDH_PUBLIC_LEN;

const NONCE_OFFSET: usize = 4;
const PUBLIC_OFFSET: usize = NONCE_OFFSET + NONCE_LEN;

/// One side's KEX record, kept verbatim for the signature exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KexRecord([u8; KEX_LEN]);

impl KexRecord {
    /// Build a fresh KEX record: a random nonce plus the session's suite
    /// negotiation data and ephemeral public key.
    pub fn build(
        preferred_suite: u8,
        suite_mask: u16,
        ephemeral_public: &[u8; ECDH_PUBLIC_LEN],
    ) -> Self {
        let mut body = [0u8; KEX_LEN];
        body[0] = VERSION;
        body[1] = preferred_suite;
        body[2..4].copy_from_slice(&suite_mask.to_le_bytes());
        OsRng.fill_bytes(&mut body[NONCE_OFFSET..PUBLIC_OFFSET]);
        body[PUBLIC_OFFSET..].copy_from_slice(ephemeral_public);
        Self(body)
    }

    /// Parse and validate a peer's KEX record body.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let body: [u8; KEX_LEN] = data
            .try_into()
            .map_err(|_| Error::Protocol(format!("invalid KEX record length {}", data.len())))?;

        if body[0] != VERSION {
            return Err(Error::Protocol(format!(
                "incompatible version {}",
                body[0]
            )));
        }

        Ok(Self(body))
    }

    /// The raw body, as signed and as sent on the wire.
    pub fn as_bytes(&self) -> &[u8; KEX_LEN] {
        &self.0
    }

    /// Suite id the sender prefers. Only the low nibble is meaningful for
    /// a peer's record.
    pub fn preferred_suite(&self) -> u8 {
        self.0[1]
    }

    /// Suites the sender enabled.
    pub fn suite_mask(&self) -> u16 {
        u16::from_le_bytes([self.0[2], self.0[3]])
    }

    /// The handshake nonce, fed into key expansion.
    pub fn nonce(&self) -> [u8; NONCE_LEN] {
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&self.0[NONCE_OFFSET..PUBLIC_OFFSET]);
        nonce
    }

    /// The sender's ephemeral public key.
    pub fn ephemeral_public(&self) -> [u8; ECDH_PUBLIC_LEN] {
        let mut public = [0u8; ECDH_PUBLIC_LEN];
        public.copy_from_slice(&self.0[PUBLIC_OFFSET..]);
        public
    }
}

/// Assemble the byte string a SIG record signs: the signer's originator
/// flag, the signer's own KEX record, the verifier's KEX record, and the
/// session label.
pub fn sig_transcript(
    signer_is_initiator: bool,
    signer_kex: &KexRecord,
    verifier_kex: &KexRecord,
    label: &[u8],
) -> Vec<u8> {
    let mut transcript = Vec::with_capacity(1 + 2 * KEX_LEN + label.len());
    transcript.push(signer_is_initiator as u8);
    transcript.extend_from_slice(signer_kex.as_bytes());
    transcript.extend_from_slice(verifier_kex.as_bytes());
    transcript.extend_from_slice(label);
    transcript
}

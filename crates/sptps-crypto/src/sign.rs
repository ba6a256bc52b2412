//! Long-term Ed25519 identities.
//!
//! Each party holds an Ed25519 signing key and knows the peer's verifying
//! key out-of-band; the handshake authenticates the ephemeral key exchange
//! by signing the concatenated KEX transcripts with these keys.

use ed25519_dalek::{Signature, Signer, Verifier};

pub use ed25519_dalek::{SigningKey, VerifyingKey};

use crate::{Error, Result};

/// Length of an Ed25519 signature on the wire.
pub const SIGNATURE_LEN: usize = ed25519_dalek::SIGNATURE_LENGTH;

/// Sign a handshake transcript with the local long-term key.
pub fn sign(key: &SigningKey, message: &[u8]) -> [u8; SIGNATURE_LEN] {
    key.sign(message).to_bytes()
}

/// Verify a peer's signature over a handshake transcript.
///
/// Any mismatch (wrong length, wrong key, tampered message) is surfaced
/// uniformly as [`Error::SignatureVerification`].
pub fn verify(key: &VerifyingKey, message: &[u8], signature: &[u8]) -> Result<()> {
    let signature: &[u8; SIGNATURE_LEN] = signature
        .try_into()
        .map_err(|_| Error::SignatureVerification)?;
    let signature = Signature::from_bytes(signature);

    key.verify(message, &signature)
        .map_err(|_| Error::SignatureVerification)
}

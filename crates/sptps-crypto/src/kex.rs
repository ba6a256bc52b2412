//! Ephemeral X25519 key agreement (RFC 7748).
//!
//! Every handshake generates a fresh ephemeral keypair. Computing the
//! shared secret consumes the keypair, so the ephemeral private key cannot
//! outlive the key exchange; both the private key and the shared secret
//! are cleared from memory when dropped.

use rand::rngs::OsRng;
use x25519_dalek::{EphemeralSecret, PublicKey};
use zeroize::Zeroizing;

use crate::{Error, Result};

/// Length of an X25519 public key on the wire.
pub const ECDH_PUBLIC_LEN: usize = 32;
/// Length of the computed shared secret.
pub const ECDH_SHARED_LEN: usize = 32;

/// An ephemeral X25519 keypair, alive only for the duration of one key
/// exchange.
pub struct EphemeralKeyPair {
    secret: EphemeralSecret,
    public: PublicKey,
}

impl EphemeralKeyPair {
    /// Generate a fresh keypair from the system RNG.
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self { secret, public }
    }

    /// The public half, as sent in a KEX record.
    pub fn public_key(&self) -> &[u8; ECDH_PUBLIC_LEN] {
        self.public.as_bytes()
    }

    /// Compute the shared secret with the peer's ephemeral public key.
    ///
    /// Consumes the keypair: once the shared secret exists, the ephemeral
    /// private key is gone.
    ///
    /// # Errors
    /// Returns [`Error::KeyExchange`] if the peer's public key is a
    /// low-order point (the shared secret would be all zeros).
    pub fn agree(self, peer_public: &[u8; ECDH_PUBLIC_LEN]) -> Result<Zeroizing<[u8; ECDH_SHARED_LEN]>> {
        let peer = PublicKey::from(*peer_public);
        let shared = self.secret.diffie_hellman(&peer);

        if shared.as_bytes() == &[0u8; ECDH_SHARED_LEN] {
            return Err(Error::KeyExchange("low-order peer public key".into()));
        }

        Ok(Zeroizing::new(*shared.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agree_matches_both_ways() {
        let alice = EphemeralKeyPair::generate();
        let bob = EphemeralKeyPair::generate();

        let alice_public = *alice.public_key();
        let bob_public = *bob.public_key();

        let shared_a = alice.agree(&bob_public).unwrap();
        let shared_b = bob.agree(&alice_public).unwrap();

        assert_eq!(&*shared_a, &*shared_b);
        assert_ne!(&*shared_a, &[0u8; ECDH_SHARED_LEN]);
    }

    #[test]
    fn test_agree_rejects_low_order_point() {
        let alice = EphemeralKeyPair::generate();
        assert!(alice.agree(&[0u8; ECDH_PUBLIC_LEN]).is_err());
    }

    #[test]
    fn test_fresh_keypairs_differ() {
        let a = EphemeralKeyPair::generate();
        let b = EphemeralKeyPair::generate();
        assert_ne!(a.public_key(), b.public_key());
    }
}

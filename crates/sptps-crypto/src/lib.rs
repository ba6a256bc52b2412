//! Cryptographic primitives for the SPTPS transport protocol.
//!
//! This crate implements the cryptographic foundations required by SPTPS:
//! - AEAD record encryption (ChaCha20-Poly1305, AES-256-GCM)
//! - Ephemeral key exchange (X25519)
//! - Long-term identities and handshake signatures (Ed25519)
//! - Key expansion of the shared secret into per-direction key material
//! - Cipher suite identifiers and the symmetric negotiation rule
//!
//! None of the types here know about records, sessions or wire framing;
//! that lives in `sptps-core`. All secrets use `Zeroizing` wrappers and
//! no key material is ever logged.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aead;
pub mod error;
pub mod kdf;
pub mod kex;
pub mod sign;
pub mod suite;

pub use error::{Error, Result};
pub use suite::CipherSuite;

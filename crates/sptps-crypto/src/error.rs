//! Error types for cryptographic operations.

use thiserror::Error;

/// Result type alias for cryptographic operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Cryptographic operation errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Key exchange failed.
    #[error("key exchange failed: {0}")]
    KeyExchange(String),

    /// AEAD encryption failed.
    #[error("AEAD encryption failed")]
    Encryption,

    /// AEAD tag verification failed.
    #[error("AEAD decryption failed")]
    Decryption,

    /// Handshake signature did not verify.
    #[error("signature verification failed")]
    SignatureVerification,

    /// Key derivation failed.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Cipher suite identifier outside the supported set.
    #[error("unknown cipher suite {0}")]
    UnknownCipherSuite(u8),

    /// Suite negotiation found no overlap between the two enable masks.
    #[error("no matching cipher suites")]
    NoCommonSuite,
}

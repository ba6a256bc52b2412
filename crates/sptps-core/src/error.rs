//! Error types for protocol operations.

use thiserror::Error;

/// Result type alias for protocol operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Protocol operation errors.
///
/// All errors are local to the triggering call and never retried
/// internally. A failed handshake leaves the session dead; a failed
/// record decryption is unrecoverable in stream mode, while datagram mode
/// recovers naturally with the next packet.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or unexpected data on the wire: wrong record length,
    /// record in the wrong handshake state, unknown version, unknown
    /// record type.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A cryptographic operation failed: AEAD or signature verification,
    /// shared-secret computation, key derivation.
    #[error("crypto failure: {0}")]
    Crypto(#[from] sptps_crypto::Error),

    /// Sequence number outside the replay window or already observed.
    #[error("late or replayed packet, seqno {seqno}, expected {expected}")]
    ReplayDrop {
        /// Sequence number carried by the dropped packet.
        seqno: u32,
        /// Next sequence number the window expected.
        expected: u32,
    },

    /// The API was used outside its contract: sending before the
    /// handshake finished, an invalid application record type, forcing a
    /// key exchange from the wrong state.
    #[error("{0}")]
    Misuse(&'static str),

    /// A caller-supplied callback reported failure.
    #[error("{0} callback failed")]
    Callback(&'static str),
}

//! SPTPS session engine.
//!
//! This crate implements the Simple Peer-to-Peer Security transport
//! protocol: an authenticated, forward-secret, record-framed channel
//! between two parties that each hold a long-term Ed25519 keypair and
//! know the peer's public key.
//!
//! - Record framing for stream and datagram transports ([`record`])
//! - Sliding-window replay protection ([`replay`])
//! - Handshake record formats ([`handshake`])
//! - The session façade and state machine ([`session`])
//!
//! The transport is abstracted: a [`session::Session`] never touches
//! sockets. Callers deliver inbound bytes and provide callbacks for
//! outbound bytes and decrypted records. Cryptographic primitives live in
//! `sptps-crypto`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod handshake;
pub mod record;
pub mod replay;
pub mod session;

pub use error::{Error, Result};
pub use record::RECORD_HANDSHAKE;
pub use replay::DEFAULT_REPLAY_WINDOW;
pub use session::{Session, SessionHandler, SessionParams};
